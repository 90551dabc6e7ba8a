//! LMSR Engine Benchmarks — Hot-Path Performance Validation
//!
//! Quotes and state updates must cost the same whatever the outcome
//! count. Each benchmark runs over markets of 2, 16 and 256 outcomes.
//!
//! Run with: cargo bench --bench lmsr_bench

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use lmsr_engine::adapters::clock::ManualClock;
use lmsr_engine::adapters::ledger::InMemoryLedger;
use lmsr_engine::domain::fees::FeeSchedule;
use lmsr_engine::domain::fixed_point::Wad;
use lmsr_engine::domain::initializer::{self, MarketParams, OutcomeLimits};
use lmsr_engine::domain::market::MarketState;
use lmsr_engine::domain::quote;
use lmsr_engine::domain::state_update;
use lmsr_engine::domain::trade::{Amount, Side, TradeSide};
use lmsr_engine::domain::twap::TwapState;
use lmsr_engine::usecases::{EngineSettings, TradeOrchestrator};

const TOKEN: Amount = 1_000_000;
const OUTCOME_COUNTS: [usize; 3] = [2, 16, 256];

fn params(outcomes: usize) -> MarketParams {
    MarketParams {
        market_id: 1,
        liability: 10_000 * TOKEN,
        target_outcomes: outcomes,
        expanding: false,
        reserve: Wad::ZERO,
        outcomes: (0..outcomes as u64).map(|p| (p, Wad::ONE)).collect(),
    }
}

fn market(outcomes: usize) -> MarketState {
    initializer::initialize(
        &params(outcomes),
        &OutcomeLimits::default(),
        Wad::from_raw(1_000_000),
        |_| true,
    )
    .unwrap()
}

/// Exact-token buy quote (ln + exp on the hot path).
fn bench_quote_buy(c: &mut Criterion) {
    let fees = FeeSchedule::new(100).unwrap();
    let mut group = c.benchmark_group("quote_buy_exact_tokens");
    for n in OUTCOME_COUNTS {
        let m = market(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &m, |b, m| {
            b.iter(|| {
                let _quote =
                    quote::quote_buy_exact_tokens(m, black_box(1), Side::Direct, black_box(10 * TOKEN), &fees);
            });
        });
    }
    group.finish();
}

/// Spend-to-tokens inverse quote.
fn bench_quote_spend(c: &mut Criterion) {
    let fees = FeeSchedule::new(100).unwrap();
    let mut group = c.benchmark_group("quote_buy_exact_spend");
    for n in OUTCOME_COUNTS {
        let m = market(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &m, |b, m| {
            b.iter(|| {
                let _quote =
                    quote::quote_buy_exact_spend(m, black_box(1), Side::Lay, black_box(10 * TOKEN), &fees);
            });
        });
    }
    group.finish();
}

/// Planning the O(1) state correction.
fn bench_state_plan(c: &mut Criterion) {
    let mut group = c.benchmark_group("state_update_plan");
    for n in OUTCOME_COUNTS {
        let m = market(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &m, |b, m| {
            b.iter(|| {
                let _plan = state_update::plan(m, black_box(1), Side::Direct, TradeSide::Buy, black_box(TOKEN));
            });
        });
    }
    group.finish();
}

/// TWAP checkpoint of an arbitrary slot.
fn bench_twap_observe(c: &mut Criterion) {
    let m = market(256);
    let twap = TwapState::started_at(0);
    c.bench_function("twap_observe_256", |b| {
        b.iter(|| {
            let _obs = twap.observe(&m, black_box(200), black_box(3_600));
        });
    });
}

/// Full buy/sell cycle through the orchestrator, ledger included.
fn bench_orchestrated_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("orchestrator_round_trip");
    for n in OUTCOME_COUNTS {
        let mut ledger = InMemoryLedger::new();
        for position in 0..n as u64 {
            ledger.register_position(1, position);
        }
        ledger.deposit("bench", Amount::MAX / 2).unwrap();
        let settings = EngineSettings {
            fees: FeeSchedule::new(100).unwrap(),
            ..EngineSettings::default()
        };
        let mut engine = TradeOrchestrator::new(ledger, ManualClock::new(0), settings);
        engine.create_market(&params(n)).unwrap();

        group.bench_function(BenchmarkId::from_parameter(n), |b| {
            b.iter(|| {
                engine
                    .buy("bench", 1, 1, Side::Direct, black_box(TOKEN), Amount::MAX)
                    .unwrap();
                engine
                    .sell("bench", 1, 1, Side::Direct, black_box(TOKEN), 0)
                    .unwrap();
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_quote_buy,
    bench_quote_spend,
    bench_state_plan,
    bench_twap_observe,
    bench_orchestrated_round_trip,
);
criterion_main!(benches);
