//! Repository Implementation - Concrete Adapter for the Repository Port
//!
//! Wraps `StateStore` (atomic snapshot) and `TradeLogger` (JSONL journal)
//! behind the `Repository` trait. Callers only see the trait.

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;

use super::state::StateStore;
use super::trades::TradeLogger;
use crate::ports::repository::{EngineSnapshot, Repository, TradeRecord};

pub struct RepositoryImpl {
    state_store: StateStore,
    trade_logger: TradeLogger,
}

impl RepositoryImpl {
    pub const fn new(state_store: StateStore, trade_logger: TradeLogger) -> Self {
        Self {
            state_store,
            trade_logger,
        }
    }

    /// Opens both stores under `data_dir`, creating directories as needed.
    pub async fn from_data_dir(data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        let state_store = StateStore::new(data_dir).await?;
        let trade_logger = TradeLogger::new(data_dir).await?;
        Ok(Self::new(state_store, trade_logger))
    }
}

#[async_trait]
impl Repository for RepositoryImpl {
    async fn save_trade(&self, record: &TradeRecord) -> Result<()> {
        self.trade_logger.append_trade(record).await
    }

    async fn load_trades(&self) -> Result<Vec<TradeRecord>> {
        self.trade_logger.load_all_trades().await
    }

    async fn save_snapshot(&self, snapshot: &EngineSnapshot) -> Result<()> {
        self.state_store.save(snapshot).await
    }

    async fn load_snapshot(&self) -> Result<Option<EngineSnapshot>> {
        self.state_store.load().await
    }

    async fn is_healthy(&self) -> bool {
        self.state_store.is_healthy().await && self.trade_logger.is_healthy().await
    }
}
