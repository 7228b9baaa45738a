// crates/mnemo/src/stats/mod.rs
// Aggregated counters and the status snapshot writer, using the same
// write-temp-then-rename durability convention as reflection/mod.rs but
// over a stateless read-then-write snapshot instead of a mutated document.

use crate::archive::Archive;
use crate::error::Result;
use crate::store::{HotStore, Scope};
use crate::utils::now_ms;
use mnemo_types::StatsSnapshot;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;

/// Computes [`StatsSnapshot`]s and durably persists them to
/// `mem0-status.json`.
pub struct Stats {
    path: PathBuf,
    store: Arc<HotStore>,
    archive: Arc<Archive>,
    user_id: String,
}

impl Stats {
    pub fn new(path: &Path, store: Arc<HotStore>, archive: Arc<Archive>, user_id: String) -> Self {
        Self {
            path: path.to_path_buf(),
            store,
            archive,
            user_id,
        }
    }

    /// `total_memories` is the configured user's hot record count plus the
    /// archive's line count; hot and archive byte sizes and write-queue
    /// counters are read straight through from their owners.
    pub async fn snapshot(&self) -> Result<StatsSnapshot> {
        let hot_count = self
            .store
            .count(Scope {
                user_id: self.user_id.clone(),
                run_id: None,
            })
            .await?;
        let archive_count = self.archive.line_count().await?;
        Ok(StatsSnapshot {
            total_memories: hot_count + archive_count,
            hot_size_bytes: self.store.size_bytes(),
            archive_size_bytes: self.archive.size_bytes().await?,
            write_queue: self.store.queue_stats(),
            last_updated: now_ms(),
        })
    }

    /// Computes a fresh snapshot and atomically writes it to disk
    /// (write-temp-then-rename), returning the snapshot written.
    pub async fn write_snapshot(&self) -> Result<StatsSnapshot> {
        let snapshot = self.snapshot().await?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(&snapshot)?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, json).await?;
        fs::rename(&tmp_path, &self.path).await?;
        Ok(snapshot)
    }
}
