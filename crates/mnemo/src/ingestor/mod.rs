// crates/mnemo/src/ingestor/mod.rs
// Fact-extraction orchestrator: ask the model for candidate facts, embed
// each, dedupe against the nearest hot-store neighbour, and commit.

use crate::archive::Archive;
use crate::embedder::Embedder;
use crate::llm::{GenerateOptions, LanguageModel, Message};
use crate::error::Result;
use crate::store::{HotStore, Scope};
use crate::utils::json::parse_json_hardened;
use crate::utils::now_ms;
use async_trait::async_trait;
use mnemo_types::{ExtractionEvent, ExtractionResult, Memory, SourceTier};
use std::collections::BTreeMap;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

const NEIGHBOUR_LIMIT: usize = 10;
const NEIGHBOUR_THRESHOLD: f32 = 0.5;
const UPDATE_COSINE_THRESHOLD: f32 = 0.9;
const NOOP_COSINE_THRESHOLD: f32 = 0.92;
const UPDATE_TOKEN_OVERLAP_RATIO: f32 = 0.7;

const EXTRACTION_INSTRUCTIONS: &str = "You distill durable facts from a \
conversation transcript. Return strict JSON of the shape \
{\"facts\": [\"...\"]}. Each fact must be a third-person, self-contained \
statement (e.g. \"User prefers dark mode.\") with no credentials, secrets, \
or ephemeral small talk. If nothing durable was said, return {\"facts\": []}.";

/// One observed conversation turn, the Ingestor's unit of input.
#[derive(Debug, Clone)]
pub struct TurnMessage {
    pub role: String,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub user_id: String,
    pub run_id: Option<String>,
}

/// Narrow interface [`crate::capture::CaptureBatcher`] depends on instead of
/// the concrete [`Ingestor`], so the lifecycle coordinator can interpose the
/// post-extraction cache-invalidate + `Reflection.observe` steps (see
/// [`crate::lifecycle`]) without CaptureBatcher holding a reference back to
/// the coordinator that owns it.
#[async_trait]
pub trait IngestSink: Send + Sync {
    async fn ingest(&self, batch: &[TurnMessage], opts: &IngestOptions) -> Result<ExtractionOutcome>;
}

#[async_trait]
impl IngestSink for Ingestor {
    async fn ingest(&self, batch: &[TurnMessage], opts: &IngestOptions) -> Result<ExtractionOutcome> {
        self.extract(batch, opts).await
    }
}

#[derive(Debug, Clone, serde::Deserialize, Default)]
struct FactsResponse {
    #[serde(default)]
    facts: Vec<String>,
}

/// Result of [`Ingestor::extract`].
#[derive(Debug, Clone, Default)]
pub struct ExtractionOutcome {
    pub results: Vec<ExtractionResult>,
}

/// Distills candidate facts from a message batch and reconciles them
/// against the hot store under a dedup/merge policy.
pub struct Ingestor {
    llm: Option<Arc<dyn LanguageModel>>,
    embedder: Option<Arc<dyn Embedder>>,
    store: Arc<HotStore>,
    archive: Arc<Archive>,
}

fn significant_tokens(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|s| s.chars().count() >= 3)
        .map(|s| s.to_lowercase())
        .collect()
}

/// Fraction of `candidate`'s significant tokens also present in `existing`.
fn token_overlap_ratio(candidate: &str, existing: &str) -> f32 {
    let candidate_tokens = significant_tokens(candidate);
    if candidate_tokens.is_empty() {
        return 0.0;
    }
    let existing_tokens = significant_tokens(existing);
    let shared = candidate_tokens.intersection(&existing_tokens).count();
    shared as f32 / candidate_tokens.len() as f32
}

impl Ingestor {
    pub fn new(
        llm: Option<Arc<dyn LanguageModel>>,
        embedder: Option<Arc<dyn Embedder>>,
        store: Arc<HotStore>,
        archive: Arc<Archive>,
    ) -> Self {
        Self {
            llm,
            embedder,
            store,
            archive,
        }
    }

    /// Extracts candidate facts from `batch` and reconciles them into the
    /// hot store. Returns `Ok(empty)` when no provider is configured or the
    /// model surfaces nothing durable; propagates the model's error when the
    /// extraction call itself fails, aborting the whole batch rather than
    /// reconciling a partial fact list.
    pub async fn extract(
        &self,
        batch: &[TurnMessage],
        opts: &IngestOptions,
    ) -> Result<ExtractionOutcome> {
        let (Some(llm), Some(embedder)) = (self.llm.as_ref(), self.embedder.as_ref()) else {
            debug!("ingestor has no language model or embedder configured, skipping extraction");
            return Ok(ExtractionOutcome::default());
        };
        if batch.is_empty() {
            return Ok(ExtractionOutcome::default());
        }

        let transcript = batch
            .iter()
            .map(|m| format!("{}: {}", m.role, m.text))
            .collect::<Vec<_>>()
            .join("\n");

        let messages = vec![
            Message::system(EXTRACTION_INSTRUCTIONS),
            Message::user(transcript),
        ];
        let raw = llm
            .generate(messages, GenerateOptions::json())
            .await?;

        let parsed: FactsResponse = parse_json_hardened(&raw).unwrap_or_default();
        let mut results = Vec::new();

        for fact in parsed.facts {
            let text = fact.trim();
            if text.is_empty() {
                continue;
            }
            match self.reconcile_one(text, embedder.as_ref(), opts).await {
                Ok(result) => results.push(result),
                Err(e) => {
                    warn!(error = %e, "failed to embed/reconcile extracted fact, skipping");
                }
            }
        }

        Ok(ExtractionOutcome { results })
    }

    async fn reconcile_one(
        &self,
        text: &str,
        embedder: &dyn Embedder,
        opts: &IngestOptions,
    ) -> Result<ExtractionResult> {
        let vector = embedder.embed(text).await?;
        let scope = Scope {
            user_id: opts.user_id.clone(),
            run_id: opts.run_id.clone(),
        };
        let neighbours = self
            .store
            .search(scope, vector.clone(), NEIGHBOUR_LIMIT, NEIGHBOUR_THRESHOLD)
            .await?;
        let top = neighbours.into_iter().next();

        if let Some(top) = top {
            let score = top.score.unwrap_or(0.0);
            if score >= UPDATE_COSINE_THRESHOLD
                && text.len() > top.text.len()
                && token_overlap_ratio(text, &top.text) >= UPDATE_TOKEN_OVERLAP_RATIO
            {
                let now = now_ms();
                let updated = Memory {
                    id: top.id.clone(),
                    text: text.to_string(),
                    user_id: opts.user_id.clone(),
                    run_id: opts.run_id.clone(),
                    score: None,
                    categories: top.categories.clone(),
                    metadata: top.metadata.clone(),
                    created_at: top.created_at,
                    updated_at: now,
                    source_tier: SourceTier::Hot,
                };
                self.store.upsert(updated, vector).await?;
                return Ok(ExtractionResult {
                    id: top.id,
                    text: text.to_string(),
                    event: ExtractionEvent::Update,
                });
            }
            if score >= NOOP_COSINE_THRESHOLD {
                return Ok(ExtractionResult {
                    id: top.id,
                    text: top.text,
                    event: ExtractionEvent::Noop,
                });
            }
        }

        let now = now_ms();
        let id = Uuid::new_v4().to_string();
        let memory = Memory {
            id: id.clone(),
            text: text.to_string(),
            user_id: opts.user_id.clone(),
            run_id: opts.run_id.clone(),
            score: None,
            categories: Vec::new(),
            metadata: BTreeMap::new(),
            created_at: now,
            updated_at: now,
            source_tier: SourceTier::Hot,
        };
        self.store.upsert(memory, vector).await?;
        Ok(ExtractionResult {
            id,
            text: text.to_string(),
            event: ExtractionEvent::Add,
        })
    }

    /// Prune the hot store for `user_id` down to `max_memory_count`: the
    /// oldest overflow slice is archived first, and only deleted from the
    /// hot store once the archive append succeeds.
    pub async fn prune(&self, user_id: &str, max_memory_count: usize) -> Result<PruneReport> {
        let scope = Scope {
            user_id: user_id.to_string(),
            run_id: None,
        };
        let mut all = self.store.list(scope, usize::MAX).await?;
        if all.len() <= max_memory_count {
            return Ok(PruneReport::default());
        }
        all.sort_by_key(|m| m.created_at);
        let overflow = all.len() - max_memory_count;
        let to_prune = &all[..overflow];

        let mut report = PruneReport::default();
        for memory in to_prune {
            if let Err(e) = self.archive.append(memory.clone()).await {
                warn!(error = %e, memory_id = %memory.id, "archive append failed during prune, skipping delete");
                report.archive_failures += 1;
                continue;
            }
            match self.store.delete(&memory.id).await {
                Ok(_) => report.archived += 1,
                Err(e) => {
                    warn!(error = %e, memory_id = %memory.id, "hot-store delete failed during prune");
                    report.delete_failures += 1;
                }
            }
        }
        Ok(report)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PruneReport {
    pub archived: usize,
    pub archive_failures: usize,
    pub delete_failures: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Message as LlmMessage;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FixedEmbedder {
        dim: usize,
        next: Mutex<Vec<f32>>,
    }

    #[async_trait]
    impl Embedder for FixedEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(self.next.lock().unwrap().clone())
        }
        fn dimension(&self) -> usize {
            self.dim
        }
    }

    struct ScriptedLlm {
        response: String,
    }

    #[async_trait]
    impl LanguageModel for ScriptedLlm {
        async fn generate(
            &self,
            _messages: Vec<LlmMessage>,
            _opts: GenerateOptions,
        ) -> Result<String> {
            Ok(self.response.clone())
        }
    }

    fn unit(x: f32, y: f32, z: f32) -> Vec<f32> {
        let norm = (x * x + y * y + z * z).sqrt();
        if norm == 0.0 {
            return vec![0.0, 0.0, 0.0];
        }
        vec![x / norm, y / norm, z / norm]
    }

    async fn new_ingestor(label: &str, response: &str, vector: Vec<f32>) -> (Ingestor, Arc<HotStore>) {
        let store = Arc::new(HotStore::open_in_memory(3, label).await.unwrap());
        let archive_dir = tempfile::tempdir().unwrap();
        let archive = Arc::new(Archive::open(&archive_dir.path().join("archive.jsonl")).unwrap());
        std::mem::forget(archive_dir);
        let llm: Arc<dyn LanguageModel> = Arc::new(ScriptedLlm {
            response: response.to_string(),
        });
        let embedder: Arc<dyn Embedder> = Arc::new(FixedEmbedder {
            dim: 3,
            next: Mutex::new(vector),
        });
        let ingestor = Ingestor::new(Some(llm), Some(embedder), store.clone(), archive);
        (ingestor, store)
    }

    #[tokio::test]
    async fn new_fact_is_added() {
        let (ingestor, store) = new_ingestor(
            "add",
            r#"{"facts": ["User uses Rust daily for systems work."]}"#,
            unit(1.0, 0.0, 0.0),
        )
        .await;
        let opts = IngestOptions {
            user_id: "u1".to_string(),
            run_id: None,
        };
        let outcome = ingestor
            .extract(
                &[TurnMessage {
                    role: "user".to_string(),
                    text: "I use Rust daily for systems work.".to_string(),
                }],
                &opts,
            )
            .await
            .unwrap();
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].event, ExtractionEvent::Add);
        assert_eq!(store.total_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn empty_facts_yields_no_results() {
        let (ingestor, _store) = new_ingestor("empty", r#"{"facts": []}"#, unit(1.0, 0.0, 0.0)).await;
        let opts = IngestOptions {
            user_id: "u1".to_string(),
            run_id: None,
        };
        let outcome = ingestor
            .extract(
                &[TurnMessage {
                    role: "user".to_string(),
                    text: "hello".to_string(),
                }],
                &opts,
            )
            .await
            .unwrap();
        assert!(outcome.results.is_empty());
    }

    #[tokio::test]
    async fn near_duplicate_is_update_not_add() {
        let store = Arc::new(HotStore::open_in_memory(3, "dedup_update").await.unwrap());
        let archive_dir = tempfile::tempdir().unwrap();
        let archive = Arc::new(Archive::open(&archive_dir.path().join("archive.jsonl")).unwrap());
        std::mem::forget(archive_dir);

        let existing = Memory {
            id: "tea-1".to_string(),
            text: "User likes tea.".to_string(),
            user_id: "u1".to_string(),
            run_id: None,
            score: None,
            categories: vec![],
            metadata: BTreeMap::new(),
            created_at: 1_000,
            updated_at: 1_000,
            source_tier: SourceTier::Hot,
        };
        store.upsert(existing, unit(1.0, 0.05, 0.0)).await.unwrap();

        let llm: Arc<dyn LanguageModel> = Arc::new(ScriptedLlm {
            response: r#"{"facts": ["User likes green tea specifically."]}"#.to_string(),
        });
        let embedder: Arc<dyn Embedder> = Arc::new(FixedEmbedder {
            dim: 3,
            next: Mutex::new(unit(1.0, 0.051, 0.0)),
        });
        let ingestor = Ingestor::new(Some(llm), Some(embedder), store.clone(), archive);

        let opts = IngestOptions {
            user_id: "u1".to_string(),
            run_id: None,
        };
        let outcome = ingestor
            .extract(
                &[TurnMessage {
                    role: "user".to_string(),
                    text: "Actually I like green tea specifically.".to_string(),
                }],
                &opts,
            )
            .await
            .unwrap();

        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].event, ExtractionEvent::Update);
        assert_eq!(outcome.results[0].id, "tea-1");
        assert_eq!(store.total_count().await.unwrap(), 1);
        let updated = store.get("tea-1").await.unwrap().unwrap();
        assert_eq!(updated.text, "User likes green tea specifically.");
        assert_eq!(updated.created_at, 1_000);
        assert!(updated.updated_at >= 1_000);
    }

    #[tokio::test]
    async fn prune_leaves_hotstore_untouched_when_archive_append_fails() {
        let store = Arc::new(HotStore::open_in_memory(3, "prune_fail").await.unwrap());
        // Build an Archive, then replace its backing file with a directory
        // of the same name so every append's `open()` call fails.
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("archive.jsonl");
        let archive = Archive::open(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();
        let archive = Arc::new(archive);

        for i in 0..3u32 {
            let m = Memory {
                id: format!("m{i}"),
                text: format!("fact {i}"),
                user_id: "u1".to_string(),
                run_id: None,
                score: None,
                categories: vec![],
                metadata: BTreeMap::new(),
                created_at: i as i64,
                updated_at: i as i64,
                source_tier: SourceTier::Hot,
            };
            store.upsert(m, unit(1.0, i as f32 * 0.01, 0.0)).await.unwrap();
        }

        let llm: Arc<dyn LanguageModel> = Arc::new(ScriptedLlm {
            response: "{}".to_string(),
        });
        let embedder: Arc<dyn Embedder> = Arc::new(FixedEmbedder {
            dim: 3,
            next: Mutex::new(unit(1.0, 0.0, 0.0)),
        });
        let ingestor = Ingestor::new(Some(llm), Some(embedder), store.clone(), archive);

        let report = ingestor.prune("u1", 1).await.unwrap();
        assert_eq!(report.archived, 0);
        assert!(report.archive_failures >= 1);
        assert_eq!(store.total_count().await.unwrap(), 3);
    }
}
