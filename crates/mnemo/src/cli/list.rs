// crates/mnemo/src/cli/list.rs
// `mnemo list` -- direct HotStore query, no MCP server spin-up. Grounded on
// cli/statusline.rs's style of talking straight to storage for a quick CLI
// round-trip instead of paying full lifecycle startup cost.

use crate::config::{ApiKeys, Config};
use crate::embedder;
use crate::error::Result;
use crate::store::{HotStore, Scope};
use std::path::Path;
use std::time::Duration;

pub async fn run(data_dir: &Path, limit: Option<usize>) -> Result<()> {
    let config = Config::load();
    let dimension = embedder::resolve_dimension(&ApiKeys::from_env());
    let store = HotStore::open(
        &data_dir.join("vector_store.db"),
        dimension,
        Duration::from_millis(0),
    )
    .await?;

    let memories = store
        .list(
            Scope {
                user_id: config.user_id.clone(),
                run_id: None,
            },
            limit.unwrap_or(50),
        )
        .await?;

    if memories.is_empty() {
        println!("No memories found.");
        return Ok(());
    }
    for memory in memories {
        println!("[{}] {}", memory.id, memory.text);
    }
    Ok(())
}
