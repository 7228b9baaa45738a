// crates/mnemo/src/cli/dashboard.rs
// `mnemo dashboard` -- live-refreshing terminal view, built on the same
// direct-snapshot path as `cli::stats`.

use crate::cli::stats;
use crate::error::Result;
use std::path::Path;
use std::time::Duration;

pub async fn run(data_dir: &Path, interval_ms: u64) -> Result<()> {
    let interval = Duration::from_millis(interval_ms.max(200));
    loop {
        let snapshot = stats::snapshot(data_dir).await?;
        print!("\x1B[2J\x1B[H");
        println!("mnemo dashboard  (ctrl-c to exit, refresh every {interval_ms}ms)\n");
        println!("{}", stats::format(&snapshot));
        tokio::time::sleep(interval).await;
    }
}
