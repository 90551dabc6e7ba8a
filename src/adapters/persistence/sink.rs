//! Journal Sink - Hands Committed Trades to the Async Writer
//!
//! The engine commits synchronously and sinks must not fail, so trades are
//! pushed onto an unbounded channel and written by `run_journal`.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};

use crate::domain::trade::{PriceUpdate, TradeEvent};
use crate::ports::events::EventSink;
use crate::ports::repository::{Repository, TradeRecord};

pub struct JournalSink {
    tx: mpsc::UnboundedSender<TradeRecord>,
}

impl JournalSink {
    /// Sink plus the receiving end for `run_journal`.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<TradeRecord>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for JournalSink {
    fn on_trade(&self, event: &TradeEvent) {
        if self.tx.send(TradeRecord::from(event)).is_err() {
            warn!(trade_id = %event.id, "Journal writer stopped, trade not journaled");
        }
    }

    fn on_price(&self, _update: &PriceUpdate) {}
}

/// Writes journaled trades until shutdown, then drains what is queued.
pub async fn run_journal(
    repository: Arc<dyn Repository>,
    mut rx: mpsc::UnboundedReceiver<TradeRecord>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut written: u64 = 0;
    loop {
        tokio::select! {
            record = rx.recv() => match record {
                Some(record) => {
                    if let Err(e) = repository.save_trade(&record).await {
                        error!(trade_id = %record.id, error = %e, "Failed to journal trade");
                    } else {
                        written += 1;
                    }
                }
                None => break,
            },
            _ = shutdown_rx.recv() => {
                rx.close();
                while let Some(record) = rx.recv().await {
                    if let Err(e) = repository.save_trade(&record).await {
                        error!(trade_id = %record.id, error = %e, "Failed to journal trade");
                    } else {
                        written += 1;
                    }
                }
                break;
            }
        }
    }
    info!(written, "Journal writer stopped");
}
