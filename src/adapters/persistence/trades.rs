//! Trade Logger - Append-only JSONL Trade Journal
//!
//! One file per UTC day of the engine clock, `trades/YYYY-MM-DD.jsonl`.
//! Each line is a complete `TradeRecord`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::DateTime;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

use crate::ports::repository::TradeRecord;

pub struct TradeLogger {
    trades_dir: PathBuf,
}

impl TradeLogger {
    /// Opens the journal under `data_dir/trades`.
    pub async fn new(data_dir: impl AsRef<Path>) -> Result<Self> {
        let trades_dir = data_dir.as_ref().join("trades");
        fs::create_dir_all(&trades_dir)
            .await
            .context("Failed to create trades directory")?;
        Ok(Self { trades_dir })
    }

    /// Journal file for an engine timestamp.
    fn file_for(&self, timestamp: u64) -> PathBuf {
        let date = i64::try_from(timestamp)
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .map_or_else(|| "undated".to_string(), |dt| dt.format("%Y-%m-%d").to_string());
        self.trades_dir.join(format!("{date}.jsonl"))
    }

    /// Append a record to the file of its trading day.
    #[instrument(skip(self, record), fields(trade_id = %record.id, market = record.market_id))]
    pub async fn append_trade(&self, record: &TradeRecord) -> Result<()> {
        let path = self.file_for(record.timestamp);

        let mut line = serde_json::to_vec(record).context("Failed to serialize trade record")?;
        line.push(b'\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("Failed to open {}", path.display()))?;
        file.write_all(&line)
            .await
            .context("Failed to write trade record")?;
        file.flush().await.context("Failed to flush trade journal")?;

        debug!(path = %path.display(), "Trade journaled");
        Ok(())
    }

    /// Load every record, ordered by engine timestamp.
    ///
    /// Malformed lines (e.g. a torn final write) are skipped with a warning.
    #[instrument(skip(self))]
    pub async fn load_all_trades(&self) -> Result<Vec<TradeRecord>> {
        let mut files = Vec::new();
        let mut entries = fs::read_dir(&self.trades_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "jsonl") {
                files.push(path);
            }
        }
        files.sort();

        let mut trades = Vec::new();
        for path in files {
            let content = fs::read_to_string(&path).await?;
            for line in content.lines().filter(|l| !l.trim().is_empty()) {
                match serde_json::from_str::<TradeRecord>(line) {
                    Ok(record) => trades.push(record),
                    Err(e) => warn!(
                        file = %path.display(),
                        error = %e,
                        "Skipping malformed trade record"
                    ),
                }
            }
        }

        // Stable: same-second trades keep journal order.
        trades.sort_by_key(|t| t.timestamp);
        info!(count = trades.len(), "Loaded trade records");
        Ok(trades)
    }

    /// Check if the trades directory is writable.
    pub async fn is_healthy(&self) -> bool {
        let probe = self.trades_dir.join(".health_check");
        let result = fs::write(&probe, b"ok").await;
        let _ = fs::remove_file(&probe).await;
        result.is_ok()
    }
}
