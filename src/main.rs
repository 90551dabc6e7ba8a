//! LMSR Engine — Entry Point
//!
//! Wiring sequence:
//! 1. Load config (path from argv, default `config.toml`) + validate
//! 2. Init tracing (JSON structured logging)
//! 3. Build the in-memory ledger and the orchestrator
//! 4. Attach sinks: Prometheus metrics + trade journal
//! 5. Recover markets and custody from the last snapshot, or create the
//!    configured markets
//! 6. Spawn journal writer and periodic snapshot tasks
//! 7. Serve the HTTP API (trades, markets, /metrics, /live, /ready)
//! 8. Wait for SIGINT → graceful shutdown (drain journal → final snapshot)

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::{Mutex, broadcast};
use tracing::{error, info, warn};

use lmsr_engine::adapters::api::routes::{self, ApiState, SharedEngine};
use lmsr_engine::adapters::clock::SystemClock;
use lmsr_engine::adapters::ledger::InMemoryLedger;
use lmsr_engine::adapters::metrics::{HealthState, MetricsRegistry};
use lmsr_engine::adapters::persistence::{JournalSink, RepositoryImpl, run_journal};
use lmsr_engine::config::{self, AppConfig};
use lmsr_engine::ports::repository::Repository;
use lmsr_engine::usecases::TradeOrchestrator;

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1. Load configuration ───────────────────────────────
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());
    let config = config::loader::load_config(&config_path)
        .with_context(|| format!("Failed to load configuration from {config_path}"))?;

    // ── 2. Initialize structured JSON logging ───────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(&config.service.log_level)
            }),
        )
        .json()
        .init();

    info!(
        name = %config.service.name,
        version = env!("CARGO_PKG_VERSION"),
        fee_bps = config.engine.fee_bps,
        markets = config.markets.len(),
        "Starting LMSR engine"
    );

    // ── 3. Ledger + orchestrator ────────────────────────────
    let scale = config.engine.quote_scale();
    let settings = config
        .engine
        .settings()
        .context("Invalid engine settings")?;

    let mut ledger = InMemoryLedger::new();
    for market in &config.markets {
        for position in market.all_positions() {
            ledger.register_position(market.id, position);
        }
    }
    let mut engine = TradeOrchestrator::new(ledger, SystemClock, settings);

    // ── 4. Sinks ────────────────────────────────────────────
    let metrics = Arc::new(MetricsRegistry::new(scale).context("Failed to register metrics")?);
    let (journal_sink, journal_rx) = JournalSink::channel();
    engine.add_sink(metrics.clone());
    engine.add_sink(Arc::new(journal_sink));

    // ── 5. Restore or create markets ────────────────────────
    let repository: Arc<dyn Repository> = Arc::new(
        RepositoryImpl::from_data_dir(&config.persistence.data_dir)
            .await
            .context("Failed to open data directory")?,
    );
    match repository.load_snapshot().await? {
        Some(snapshot) => {
            engine
                .recover(snapshot)
                .context("Failed to recover engine snapshot")?;
            // Positions added to the config since the snapshot become listable.
            for market in &config.markets {
                for position in market.all_positions() {
                    engine.ledger_mut().register_position(market.id, position);
                }
            }
        }
        None => create_markets(&mut engine, &config)?,
    }

    let engine: SharedEngine<SystemClock> = Arc::new(Mutex::new(engine));
    let health = Arc::new(HealthState::new());
    health.set_storage_healthy(repository.is_healthy().await);
    health.set_engine_ready(true);

    // ── 6. Background tasks ─────────────────────────────────
    let (shutdown_tx, _shutdown_rx) = broadcast::channel::<()>(1);

    let journal_handle = tokio::spawn(run_journal(
        Arc::clone(&repository),
        journal_rx,
        shutdown_tx.subscribe(),
    ));

    let snapshot_handle = tokio::spawn(run_snapshots(
        Arc::clone(&engine),
        Arc::clone(&repository),
        Arc::clone(&health),
        Duration::from_secs(config.persistence.snapshot_interval_seconds),
        shutdown_tx.subscribe(),
    ));

    // ── 7. HTTP API ─────────────────────────────────────────
    let state = ApiState::new(
        Arc::clone(&engine),
        metrics,
        scale,
        config.server.max_trades_per_second,
    )?;
    let app = routes::router(state, Arc::clone(&health));
    let server_shutdown = shutdown_tx.subscribe();
    let bind_address = config.server.bind_address.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = routes::serve(app, bind_address, server_shutdown).await {
            error!(error = %e, "API server failed");
        }
    });

    info!("All tasks spawned — engine is running");

    // ── 8. Wait for SIGINT ──────────────────────────────────
    signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("SIGINT received, initiating graceful shutdown");

    // Readiness probe → 503 before anything stops.
    health.set_engine_ready(false);
    let _ = shutdown_tx.send(());

    let _ = tokio::time::timeout(Duration::from_secs(10), server_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(10), journal_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), snapshot_handle).await;

    // Final snapshot once no request can touch the engine.
    let checkpoint = engine.lock().await.checkpoint();
    match checkpoint {
        Ok(snapshot) => match repository.save_snapshot(&snapshot).await {
            Ok(()) => info!(markets = snapshot.markets.len(), "Final snapshot saved"),
            Err(e) => warn!(error = %e, "Failed to save final snapshot"),
        },
        Err(e) => warn!(error = %e, "Failed to capture final snapshot"),
    }

    info!("Shutdown complete");
    Ok(())
}

/// Creates every configured market on a fresh start.
fn create_markets(
    engine: &mut TradeOrchestrator<InMemoryLedger, SystemClock>,
    config: &AppConfig,
) -> Result<()> {
    let scale = config.engine.quote_scale();
    for market in &config.markets {
        let params = market
            .params(scale)
            .with_context(|| format!("Market {} has unrepresentable parameters", market.id))?;
        engine
            .create_market(&params)
            .with_context(|| format!("Failed to create market {}", market.id))?;
    }
    if config.markets.is_empty() {
        warn!("No markets configured — engine idle until restored");
    }
    Ok(())
}

/// Saves a snapshot, custody included, every `interval` until shutdown.
async fn run_snapshots(
    engine: SharedEngine<SystemClock>,
    repository: Arc<dyn Repository>,
    health: Arc<HealthState>,
    interval: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick completes immediately.
    ticker.tick().await;
    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => break,
            _ = ticker.tick() => {
                let checkpoint = engine.lock().await.checkpoint();
                match checkpoint {
                    Ok(snapshot) => {
                        if let Err(e) = repository.save_snapshot(&snapshot).await {
                            error!(error = %e, "Periodic snapshot failed");
                        }
                    }
                    Err(e) => error!(error = %e, "Failed to capture snapshot"),
                }
                health.set_storage_healthy(repository.is_healthy().await);
            }
        }
    }
}
