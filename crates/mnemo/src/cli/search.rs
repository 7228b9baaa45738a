// crates/mnemo/src/cli/search.rs
// `mnemo search <query>` -- runs Recall directly against the configured
// user's long-term memories, without spinning up CaptureBatcher/Reflection.

use crate::archive::Archive;
use crate::config::{ApiKeys, Config};
use crate::embedder;
use crate::error::Result;
use crate::recall::{Recall, RecallQuery, SearchScope};
use crate::store::HotStore;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub async fn run(data_dir: &Path, query: String, limit: Option<usize>) -> Result<()> {
    let config = Config::load();
    let api_keys = ApiKeys::from_env();
    let dimension = embedder::resolve_dimension(&api_keys);

    let store = Arc::new(
        HotStore::open(
            &data_dir.join("vector_store.db"),
            dimension,
            Duration::from_millis(0),
        )
        .await?,
    );
    let archive = Arc::new(Archive::open(&data_dir.join("mem0-archive.jsonl"))?);
    let embedder = embedder::from_api_keys(&api_keys);
    let recall = Recall::new(
        store,
        archive,
        embedder,
        config.search_cache_max_entries,
        config.search_cache_ttl_ms,
    );
    let results = recall
        .search(
            RecallQuery {
                query,
                user_id: config.user_id.clone(),
                session_id: None,
                scope: SearchScope::All,
                limit: limit.unwrap_or(config.top_k),
                deep: true,
            },
            config.search_threshold,
        )
        .await?;

    if results.is_empty() {
        println!("No memories found.");
        return Ok(());
    }
    for memory in results {
        let score = memory.score.map(|s| format!("{s:.2}")).unwrap_or_else(|| "-".to_string());
        println!("[{}] (score: {}) {}", memory.id, score, memory.text);
    }
    Ok(())
}
