// crates/mnemo-types/src/lib.rs

//! Shared data contracts between the mnemo memory subsystem and its clients.
//!
//! These types cross every boundary in the system — hot store, archive,
//! MCP tool responses, CLI output — so they carry no native-only
//! dependencies and stay serde-only.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which tier a [`Memory`] was retrieved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTier {
    Hot,
    Archive,
}

/// A single durable fact distilled from conversation.
///
/// `text` is a self-contained, third-person statement. Identity is `id`;
/// equality elsewhere is by `id`. `run_id` absent means the memory is
/// user-long-term rather than scoped to one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    pub id: String,
    pub text: String,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    /// Populated only on search results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// Unix milliseconds.
    pub created_at: i64,
    /// Unix milliseconds. Invariant: `updated_at >= created_at`.
    pub updated_at: i64,
    pub source_tier: SourceTier,
}

impl Memory {
    /// True if `updated_at` is not older than `created_at`.
    pub fn timestamps_valid(&self) -> bool {
        self.updated_at >= self.created_at
    }
}

/// Event assigned to each ingestion candidate fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExtractionEvent {
    Add,
    Update,
    Noop,
}

/// One entry of `Ingestor::extract`'s `results` list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub id: String,
    pub text: String,
    pub event: ExtractionEvent,
}

/// A scheduled proactive action, persisted by the reflection engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingAction {
    pub id: String,
    pub message: String,
    /// Unix milliseconds.
    pub created_at: i64,
    /// Unix milliseconds. Invariant: `trigger_at >= created_at`.
    pub trigger_at: i64,
    pub fired: bool,
    pub delivery_attempts: u32,
}

/// Write-queue counters, as surfaced by `stats()`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WriteQueueStats {
    pub total_writes: u64,
    pub queue_max: usize,
    pub current_queue: usize,
}

/// Aggregated counters written to `mem0-status.json` on every tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub total_memories: u64,
    pub hot_size_bytes: u64,
    pub archive_size_bytes: u64,
    pub write_queue: WriteQueueStats,
    /// Unix milliseconds.
    pub last_updated: i64,
}

/// Result of `ContextBuilder::build`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ContextBuildResult {
    pub text: String,
    pub injected_count: usize,
    pub total: usize,
    pub estimated_tokens: u64,
    pub truncated: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_roundtrips_through_json() {
        let m = Memory {
            id: "m1".into(),
            text: "User uses Rust daily.".into(),
            user_id: "u1".into(),
            run_id: None,
            score: Some(0.81),
            categories: vec!["preference".into()],
            metadata: BTreeMap::new(),
            created_at: 1000,
            updated_at: 1000,
            source_tier: SourceTier::Hot,
        };
        let json = serde_json::to_string(&m).unwrap();
        let back: Memory = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, "m1");
        assert_eq!(back.source_tier, SourceTier::Hot);
        assert!(back.timestamps_valid());
    }

    #[test]
    fn memory_defaults_missing_run_id_field_to_none() {
        let json = r#"{"id":"a","text":"t","user_id":"u","created_at":1,"updated_at":1,"source_tier":"archive"}"#;
        let m: Memory = serde_json::from_str(json).unwrap();
        assert!(m.run_id.is_none());
        assert_eq!(m.source_tier, SourceTier::Archive);
    }

    #[test]
    fn extraction_event_serializes_uppercase() {
        assert_eq!(
            serde_json::to_string(&ExtractionEvent::Update).unwrap(),
            "\"UPDATE\""
        );
    }
}
