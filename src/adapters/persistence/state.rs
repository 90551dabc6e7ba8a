//! State Store - Atomic Engine Snapshot
//!
//! Writes `state.json` via a temporary file and a rename, so the file on
//! disk is always a complete snapshot (old or new, never torn).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs;
use tracing::{info, instrument};

use crate::ports::repository::EngineSnapshot;

pub struct StateStore {
    state_path: PathBuf,
    tmp_path: PathBuf,
}

impl StateStore {
    /// Opens a store in `data_dir`, creating the directory if needed.
    pub async fn new(data_dir: impl AsRef<Path>) -> Result<Self> {
        let dir = data_dir.as_ref();
        fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create data directory {}", dir.display()))?;

        Ok(Self {
            state_path: dir.join("state.json"),
            tmp_path: dir.join("state.json.tmp"),
        })
    }

    pub fn path(&self) -> &Path {
        &self.state_path
    }

    /// Save a snapshot atomically (tmp, then rename).
    #[instrument(skip(self, snapshot), fields(markets = snapshot.markets.len()))]
    pub async fn save(&self, snapshot: &EngineSnapshot) -> Result<()> {
        let json = serde_json::to_vec_pretty(snapshot).context("Failed to serialize snapshot")?;

        fs::write(&self.tmp_path, &json)
            .await
            .context("Failed to write tmp snapshot")?;
        fs::rename(&self.tmp_path, &self.state_path)
            .await
            .context("Failed to rename snapshot")?;

        info!(
            path = %self.state_path.display(),
            timestamp = snapshot.timestamp,
            "Engine snapshot saved"
        );
        Ok(())
    }

    /// Load the snapshot, or `None` on first startup.
    #[instrument(skip(self))]
    pub async fn load(&self) -> Result<Option<EngineSnapshot>> {
        if !fs::try_exists(&self.state_path).await.unwrap_or(false) {
            info!("No snapshot found, starting fresh");
            return Ok(None);
        }

        let json = fs::read(&self.state_path)
            .await
            .context("Failed to read snapshot")?;
        let snapshot: EngineSnapshot =
            serde_json::from_slice(&json).context("Failed to parse snapshot JSON")?;

        info!(
            version = %snapshot.version,
            markets = snapshot.markets.len(),
            "Engine snapshot loaded"
        );
        Ok(Some(snapshot))
    }

    /// A missing snapshot is healthy; an unreadable one is not.
    pub async fn is_healthy(&self) -> bool {
        match fs::try_exists(&self.state_path).await {
            Ok(false) => true,
            Ok(true) => fs::metadata(&self.state_path).await.is_ok(),
            Err(_) => false,
        }
    }
}
