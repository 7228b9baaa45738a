// crates/mnemo/src/cli/mod.rs
// CLI surface: a clap derive Commands enum dispatching into direct-query,
// no-framework formatting for each subcommand.

pub mod dashboard;
pub mod import_legacy;
pub mod list;
pub mod search;
pub mod serve;
pub mod stats;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mnemo")]
#[command(about = "Long-term memory subsystem for conversational AI hosts")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run as an MCP server over stdio (default).
    Serve,

    /// List stored memories for the configured user.
    List {
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Semantic search over stored memories.
    Search {
        query: String,
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Print a formatted stats snapshot.
    Stats,

    /// Live-refreshing terminal view of stats.
    Dashboard {
        #[arg(long, default_value_t = 2000)]
        interval_ms: u64,
    },

    /// Import a plain-text file, one non-trivial line per memory.
    ImportLegacy {
        path: PathBuf,
    },
}

/// `~/.mnemo/data`, mirroring [`crate::config::file::MnemoConfig`]'s
/// `~/.mnemo/config.toml` convention.
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".mnemo")
        .join("data")
}
