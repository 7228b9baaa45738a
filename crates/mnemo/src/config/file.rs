// crates/mnemo/src/config/file.rs
// File-based configuration from ~/.mnemo/config.toml

use super::Config;
use serde::Deserialize;
use std::path::PathBuf;
use tracing::{debug, warn};

/// TOML mirror of the recognized [`Config`] tunables. Every field is
/// optional; an absent field leaves the corresponding `Config` field at
/// whatever the environment loader (or the built-in default) already set.
#[derive(Debug, Deserialize, Default)]
pub struct MnemoConfig {
    #[serde(default)]
    pub memory: MemorySection,
}

#[derive(Debug, Deserialize, Default)]
pub struct MemorySection {
    pub user_id: Option<String>,
    pub auto_recall: Option<bool>,
    pub auto_capture: Option<bool>,
    pub top_k: Option<usize>,
    pub search_threshold: Option<f32>,
    pub max_memory_count: Option<usize>,
    pub capture_batch_window_ms: Option<u64>,
    pub capture_batch_max_messages: Option<usize>,
    pub search_cache_ttl_ms: Option<u64>,
    pub search_cache_max_entries: Option<usize>,
    pub memory_token_budget_ratio: Option<f32>,
    pub memory_token_budget_min: Option<u64>,
    pub memory_token_budget_max: Option<u64>,
    pub action_ttl_ms: Option<i64>,
    pub max_pending_actions: Option<usize>,
    pub reflection_tick_ms: Option<u64>,
    pub write_queue_delay_ms: Option<u64>,
}

impl MnemoConfig {
    /// Load config from `~/.mnemo/config.toml`. A missing or unparsable file
    /// falls back to an empty config (all fields absent) rather than aborting.
    pub fn load() -> Self {
        let path = Self::config_path();

        match std::fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    debug!(path = %path.display(), "loaded config from file");
                    config
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to parse config file, using defaults");
                    Self::default()
                }
            },
            Err(_) => {
                debug!(path = %path.display(), "config file not found, using defaults");
                Self::default()
            }
        }
    }

    /// Apply every field present in the file onto a `Config`.
    pub fn apply_to(&self, config: &mut Config) {
        let m = &self.memory;
        if let Some(ref v) = m.user_id {
            config.user_id = v.clone();
        }
        if let Some(v) = m.auto_recall {
            config.auto_recall = v;
        }
        if let Some(v) = m.auto_capture {
            config.auto_capture = v;
        }
        if let Some(v) = m.top_k {
            config.top_k = v;
        }
        if let Some(v) = m.search_threshold {
            config.search_threshold = v;
        }
        if let Some(v) = m.max_memory_count {
            config.max_memory_count = v;
        }
        if let Some(v) = m.capture_batch_window_ms {
            config.capture_batch_window_ms = v;
        }
        if let Some(v) = m.capture_batch_max_messages {
            config.capture_batch_max_messages = v;
        }
        if let Some(v) = m.search_cache_ttl_ms {
            config.search_cache_ttl_ms = v;
        }
        if let Some(v) = m.search_cache_max_entries {
            config.search_cache_max_entries = v;
        }
        if let Some(v) = m.memory_token_budget_ratio {
            config.memory_token_budget_ratio = v;
        }
        if let Some(v) = m.memory_token_budget_min {
            config.memory_token_budget_min = v;
        }
        if let Some(v) = m.memory_token_budget_max {
            config.memory_token_budget_max = v;
        }
        if let Some(v) = m.action_ttl_ms {
            config.action_ttl_ms = v;
        }
        if let Some(v) = m.max_pending_actions {
            config.max_pending_actions = v;
        }
        if let Some(v) = m.reflection_tick_ms {
            config.reflection_tick_ms = v;
        }
        if let Some(v) = m.write_queue_delay_ms {
            config.write_queue_delay_ms = v;
        }
    }

    /// The config file path (public for CLI config commands).
    pub fn config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| {
                warn!("HOME directory not set; using current directory for mnemo config");
                PathBuf::from(".")
            })
            .join(".mnemo")
            .join("config.toml")
    }
}
