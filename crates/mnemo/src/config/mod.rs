// crates/mnemo/src/config/mod.rs
// Configuration and shared defaults.

pub mod env;
pub mod file;

pub use env::{ApiKeys, EnvConfig};
pub use file::MnemoConfig;

/// Recognized runtime configuration, with the defaults fixed by the data model.
///
/// Precedence when assembling a live `Config`: explicit host-injected value >
/// environment variable > config file > the defaults here.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub user_id: String,
    pub auto_recall: bool,
    pub auto_capture: bool,
    pub top_k: usize,
    pub search_threshold: f32,
    pub max_memory_count: usize,
    pub capture_batch_window_ms: u64,
    pub capture_batch_max_messages: usize,
    pub search_cache_ttl_ms: u64,
    pub search_cache_max_entries: usize,
    pub memory_token_budget_ratio: f32,
    pub memory_token_budget_min: u64,
    pub memory_token_budget_max: u64,
    pub action_ttl_ms: i64,
    pub max_pending_actions: usize,
    pub reflection_tick_ms: u64,
    pub write_queue_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            user_id: "default".to_string(),
            auto_recall: true,
            auto_capture: true,
            top_k: 5,
            search_threshold: 0.5,
            max_memory_count: 2000,
            capture_batch_window_ms: 1200,
            capture_batch_max_messages: 30,
            search_cache_ttl_ms: 45_000,
            search_cache_max_entries: 128,
            memory_token_budget_ratio: 0.15,
            memory_token_budget_min: 200,
            memory_token_budget_max: 4000,
            action_ttl_ms: 7 * 24 * 3600 * 1000,
            max_pending_actions: 20,
            reflection_tick_ms: 60_000,
            write_queue_delay_ms: 0,
        }
    }
}

impl Config {
    /// Build a `Config` by layering environment overrides and an optional file
    /// on top of the built-in defaults. Either loader may be skipped by a host
    /// that wants to inject its own fully-populated `Config` directly.
    pub fn load() -> Self {
        let mut config = Self::default();
        file::MnemoConfig::load().apply_to(&mut config);
        env::EnvConfig::load().apply_to(&mut config);
        config
    }
}
