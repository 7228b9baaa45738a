// crates/mnemo/src/cli/stats.rs
// `mnemo stats` -- a single formatted Stats snapshot.

use crate::archive::Archive;
use crate::config::{ApiKeys, Config};
use crate::embedder;
use crate::error::Result;
use crate::stats::Stats;
use crate::store::HotStore;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub async fn snapshot(data_dir: &Path) -> Result<mnemo_types::StatsSnapshot> {
    let config = Config::load();
    let dimension = embedder::resolve_dimension(&ApiKeys::from_env());
    let store = Arc::new(
        HotStore::open(
            &data_dir.join("vector_store.db"),
            dimension,
            Duration::from_millis(0),
        )
        .await?,
    );
    let archive = Arc::new(Archive::open(&data_dir.join("mem0-archive.jsonl"))?);
    let stats = Stats::new(
        &data_dir.join("mem0-status.json"),
        store,
        archive,
        config.user_id,
    );
    stats.snapshot().await
}

pub fn format(snapshot: &mnemo_types::StatsSnapshot) -> String {
    format!(
        "total_memories:    {}\nhot_size_bytes:    {}\narchive_size_bytes:{}\nwrite_queue:       total={} max={} current={}\nlast_updated:      {}",
        snapshot.total_memories,
        snapshot.hot_size_bytes,
        snapshot.archive_size_bytes,
        snapshot.write_queue.total_writes,
        snapshot.write_queue.queue_max,
        snapshot.write_queue.current_queue,
        snapshot.last_updated,
    )
}

pub async fn run(data_dir: &Path) -> Result<()> {
    let snapshot = snapshot(data_dir).await?;
    println!("{}", format(&snapshot));
    Ok(())
}
