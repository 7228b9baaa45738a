// crates/mnemo/src/cli/import_legacy.rs
// `mnemo import-legacy <path>` -- one non-trivial line per memory, each run
// through the full extraction/dedup pipeline via Lifecycle::ingest_now.

use crate::config::{ApiKeys, Config};
use crate::error::Result;
use crate::lifecycle::Lifecycle;
use std::path::{Path, PathBuf};

pub async fn run(data_dir: &Path, path: PathBuf) -> Result<()> {
    let contents = tokio::fs::read_to_string(&path).await?;
    let lines: Vec<&str> = contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    if lines.is_empty() {
        println!("No non-trivial lines found in {}", path.display());
        return Ok(());
    }

    let config = Config::load();
    let api_keys = ApiKeys::from_env();
    let lifecycle = Lifecycle::start(config, data_dir, &api_keys).await?;

    let mut imported = 0usize;
    let mut failed = 0usize;
    for line in lines {
        match lifecycle.ingest_now(line, None).await {
            Ok(outcome) => {
                imported += outcome.results.len();
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to import legacy line");
                failed += 1;
            }
        }
    }

    lifecycle.stop().await;
    println!("Imported {imported} memories ({failed} lines failed) from {}", path.display());
    Ok(())
}
