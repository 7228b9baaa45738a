// crates/mnemo/src/config/env.rs
// Environment-based configuration -- single source of truth for all env vars.

use super::Config;
use tracing::{debug, warn};

/// API keys and endpoints for the language-model / embedding providers,
/// resolved once at startup. Never logged at value granularity.
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    pub openai: Option<String>,
    pub ollama_host: Option<String>,
    pub anthropic: Option<String>,
    pub gemini: Option<String>,
    pub minimax: Option<String>,
}

impl ApiKeys {
    /// Load provider credentials from environment variables.
    pub fn from_env() -> Self {
        let keys = Self {
            openai: Self::read_key("OPENAI_API_KEY"),
            ollama_host: Self::read_key("OLLAMA_HOST"),
            anthropic: Self::read_key("ANTHROPIC_API_KEY"),
            gemini: Self::read_key("GEMINI_API_KEY").or_else(|| Self::read_key("GOOGLE_API_KEY")),
            minimax: Self::read_key("MINIMAX_API_KEY"),
        };
        keys.log_status();
        keys
    }

    fn read_key(name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|k| !k.trim().is_empty())
    }

    pub fn has_any(&self) -> bool {
        self.openai.is_some()
            || self.ollama_host.is_some()
            || self.anthropic.is_some()
            || self.gemini.is_some()
            || self.minimax.is_some()
    }

    fn log_status(&self) {
        let mut available = Vec::new();
        if self.openai.is_some() {
            available.push("OpenAI");
        }
        if self.ollama_host.is_some() {
            available.push("Ollama");
        }
        if self.anthropic.is_some() {
            available.push("Anthropic");
        }
        if self.gemini.is_some() {
            available.push("Gemini");
        }
        if self.minimax.is_some() {
            available.push("MiniMax");
        }
        if available.is_empty() {
            warn!("no provider credentials configured; language model and embedder are unavailable");
        } else {
            debug!(providers = ?available, "provider credentials loaded");
        }
    }

    /// A summary of configured providers, safe to log at startup.
    pub fn summary(&self) -> String {
        let mut providers = Vec::new();
        if self.openai.is_some() {
            providers.push("OpenAI");
        }
        if self.ollama_host.is_some() {
            providers.push("Ollama");
        }
        if self.anthropic.is_some() {
            providers.push("Anthropic");
        }
        if self.gemini.is_some() {
            providers.push("Gemini");
        }
        if self.minimax.is_some() {
            providers.push("MiniMax");
        }
        if providers.is_empty() {
            "none".to_string()
        } else {
            providers.join(", ")
        }
    }
}

/// Environment-variable overrides for the recognized [`Config`] tunables,
/// and the resolved provider credentials.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub api_keys: ApiKeys,
    pub user_id: Option<String>,
    pub top_k: Option<usize>,
    pub search_threshold: Option<f32>,
    pub max_memory_count: Option<usize>,
    pub capture_batch_window_ms: Option<u64>,
    pub capture_batch_max_messages: Option<usize>,
    pub search_cache_ttl_ms: Option<u64>,
    pub search_cache_max_entries: Option<usize>,
    pub write_queue_delay_ms: Option<u64>,
}

impl EnvConfig {
    /// Load all environment configuration (call once at startup).
    pub fn load() -> Self {
        Self {
            api_keys: ApiKeys::from_env(),
            user_id: read_var("MNEMO_USER_ID"),
            top_k: read_parsed("MNEMO_TOP_K"),
            search_threshold: read_parsed("MNEMO_SEARCH_THRESHOLD"),
            max_memory_count: read_parsed("MNEMO_MAX_MEMORY_COUNT"),
            capture_batch_window_ms: read_parsed("MNEMO_CAPTURE_BATCH_WINDOW_MS"),
            capture_batch_max_messages: read_parsed("MNEMO_CAPTURE_BATCH_MAX_MESSAGES"),
            search_cache_ttl_ms: read_parsed("MNEMO_SEARCH_CACHE_TTL_MS"),
            search_cache_max_entries: read_parsed("MNEMO_SEARCH_CACHE_MAX_ENTRIES"),
            write_queue_delay_ms: read_parsed("MNEMO_WRITE_QUEUE_DELAY_MS"),
        }
    }

    /// Apply the loaded overrides onto a `Config`, logging every field that
    /// deviated from its built-in default.
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(ref v) = self.user_id {
            debug!(field = "user_id", value = %v, "environment override");
            config.user_id = v.clone();
        }
        if let Some(v) = self.top_k {
            debug!(field = "top_k", value = v, "environment override");
            config.top_k = v;
        }
        if let Some(v) = self.search_threshold {
            debug!(field = "search_threshold", value = v, "environment override");
            config.search_threshold = v;
        }
        if let Some(v) = self.max_memory_count {
            debug!(field = "max_memory_count", value = v, "environment override");
            config.max_memory_count = v;
        }
        if let Some(v) = self.capture_batch_window_ms {
            config.capture_batch_window_ms = v;
        }
        if let Some(v) = self.capture_batch_max_messages {
            config.capture_batch_max_messages = v;
        }
        if let Some(v) = self.search_cache_ttl_ms {
            config.search_cache_ttl_ms = v;
        }
        if let Some(v) = self.search_cache_max_entries {
            config.search_cache_max_entries = v;
        }
        if let Some(v) = self.write_queue_delay_ms {
            debug!(field = "write_queue_delay_ms", value = v, "environment override");
            config.write_queue_delay_ms = v;
        }
    }
}

fn read_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn read_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

/// Parse a loosely-typed boolean environment variable.
pub fn parse_bool_env(name: &str) -> Option<bool> {
    let value = std::env::var(name).ok()?.to_lowercase();
    match value.as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
