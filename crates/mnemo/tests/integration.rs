//! Cross-module end-to-end scenarios exercising Ingestor, Recall,
//! ContextBuilder and Reflection together against a real HotStore and
//! Archive, with scripted Embedder/LanguageModel doubles standing in for
//! the network-facing providers.

use async_trait::async_trait;
use mnemo::archive::Archive;
use mnemo::context::ContextBuilder;
use mnemo::embedder::Embedder;
use mnemo::error::Result;
use mnemo::ingestor::{IngestOptions, Ingestor, TurnMessage};
use mnemo::llm::{GenerateOptions, LanguageModel, Message};
use mnemo::reflection::Reflection;
use mnemo::recall::{Recall, RecallQuery, SearchScope};
use mnemo::store::{HotStore, Scope};
use mnemo_types::{Memory, SourceTier};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

struct ScriptedLlm {
    response: String,
}

#[async_trait]
impl LanguageModel for ScriptedLlm {
    async fn generate(&self, _messages: Vec<Message>, _opts: GenerateOptions) -> Result<String> {
        Ok(self.response.clone())
    }
}

/// Embeds by exact-text lookup, falling back to a default vector for
/// anything not explicitly scripted. Lets a single test drive distinct
/// embeddings for distinct facts without a real embedding model.
struct TableEmbedder {
    dim: usize,
    by_text: Mutex<HashMap<String, Vec<f32>>>,
    default: Vec<f32>,
}

impl TableEmbedder {
    fn new(dim: usize, default: Vec<f32>) -> Self {
        Self {
            dim,
            by_text: Mutex::new(HashMap::new()),
            default,
        }
    }

    fn set(&self, text: &str, vector: Vec<f32>) {
        self.by_text.lock().unwrap().insert(text.to_string(), vector);
    }
}

#[async_trait]
impl Embedder for TableEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self
            .by_text
            .lock()
            .unwrap()
            .get(text)
            .cloned()
            .unwrap_or_else(|| self.default.clone()))
    }
    fn dimension(&self) -> usize {
        self.dim
    }
}

fn memory(id: &str, text: &str, user_id: &str, created_at: i64) -> Memory {
    Memory {
        id: id.to_string(),
        text: text.to_string(),
        user_id: user_id.to_string(),
        run_id: None,
        score: None,
        categories: vec![],
        metadata: BTreeMap::new(),
        created_at,
        updated_at: created_at,
        source_tier: SourceTier::Hot,
    }
}

#[tokio::test]
async fn basic_capture_then_recall_injects_the_stored_fact() {
    let store = Arc::new(HotStore::open_in_memory(3, "scenario1").await.unwrap());
    let dir = tempfile::tempdir().unwrap();
    let archive = Arc::new(Archive::open(&dir.path().join("archive.jsonl")).unwrap());

    let embedder = Arc::new(TableEmbedder::new(3, vec![1.0, 0.0, 0.0]));
    let llm: Arc<dyn LanguageModel> = Arc::new(ScriptedLlm {
        response: r#"{"facts": ["User uses Rust daily for systems work."]}"#.to_string(),
    });
    let ingestor = Ingestor::new(
        Some(llm),
        Some(embedder.clone() as Arc<dyn Embedder>),
        store.clone(),
        archive.clone(),
    );

    let batch = vec![
        TurnMessage {
            role: "user".to_string(),
            text: "I use Rust daily for systems work.".to_string(),
        },
        TurnMessage {
            role: "assistant".to_string(),
            text: "Noted.".to_string(),
        },
    ];
    let outcome = ingestor
        .extract(
            &batch,
            &IngestOptions {
                user_id: "u1".to_string(),
                run_id: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.results[0].text, "User uses Rust daily for systems work.");

    let recall = Recall::new(
        store,
        archive,
        Some(embedder as Arc<dyn Embedder>),
        128,
        45_000,
    );
    let memories = recall
        .search(
            RecallQuery {
                query: "What language should I pick?".to_string(),
                user_id: "u1".to_string(),
                session_id: None,
                scope: SearchScope::All,
                limit: 5,
                deep: false,
            },
            0.0,
        )
        .await
        .unwrap();
    assert_eq!(memories.len(), 1);

    let built = ContextBuilder::build(&memories, "gpt-4");
    assert!(built.text.starts_with("<relevant-memories>"));
    assert!(built.text.contains("User uses Rust daily for systems work."));
}

#[tokio::test]
async fn near_duplicate_fact_is_merged_as_an_update() {
    let store = Arc::new(HotStore::open_in_memory(3, "scenario2").await.unwrap());
    let dir = tempfile::tempdir().unwrap();
    let archive = Arc::new(Archive::open(&dir.path().join("archive.jsonl")).unwrap());

    let existing_vector = vec![1.0_f32, 0.0, 0.0];
    store
        .upsert(memory("m1", "User likes tea.", "u1", 1000), existing_vector.clone())
        .await
        .unwrap();

    // cosine(existing_vector, candidate_vector) = 0.94, both unit-norm.
    let candidate_vector = vec![0.94_f32, (1.0 - 0.94_f32.powi(2)).sqrt(), 0.0];
    let embedder = Arc::new(TableEmbedder::new(3, existing_vector));
    embedder.set("User likes green tea.", candidate_vector);
    let llm: Arc<dyn LanguageModel> = Arc::new(ScriptedLlm {
        response: r#"{"facts": ["User likes green tea."]}"#.to_string(),
    });
    let ingestor = Ingestor::new(
        Some(llm),
        Some(embedder as Arc<dyn Embedder>),
        store.clone(),
        archive,
    );

    let outcome = ingestor
        .extract(
            &[TurnMessage {
                role: "user".to_string(),
                text: "I actually prefer green tea.".to_string(),
            }],
            &IngestOptions {
                user_id: "u1".to_string(),
                run_id: None,
            },
        )
        .await
        .unwrap();

    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.results[0].id, "m1");
    assert_eq!(outcome.results[0].text, "User likes green tea.");

    let stored = store.get("m1").await.unwrap().unwrap();
    assert_eq!(stored.text, "User likes green tea.");
    assert_eq!(stored.created_at, 1000);
    assert!(stored.updated_at >= stored.created_at);
    assert_eq!(store.total_count().await.unwrap(), 1);
}

#[tokio::test]
async fn deep_archive_search_surfaces_cold_memories_with_empty_hot_store() {
    let store = Arc::new(HotStore::open_in_memory(3, "scenario3").await.unwrap());
    let dir = tempfile::tempdir().unwrap();
    let archive_path = dir.path().join("archive.jsonl");
    let archive = Arc::new(Archive::open(&archive_path).unwrap());
    archive
        .append(memory("a1", "Project Titan ran in 2023.", "u1", 500))
        .await
        .unwrap();

    let embedder = Arc::new(TableEmbedder::new(3, vec![1.0, 0.0, 0.0]));
    let recall = Recall::new(store, archive, Some(embedder as Arc<dyn Embedder>), 128, 45_000);

    let memories = recall
        .search(
            RecallQuery {
                query: "Titan project".to_string(),
                user_id: "u1".to_string(),
                session_id: None,
                scope: SearchScope::LongTerm,
                limit: 5,
                deep: true,
            },
            0.5,
        )
        .await
        .unwrap();

    assert_eq!(memories.len(), 1);
    assert_eq!(memories[0].source_tier, SourceTier::Archive);
    assert_eq!(memories[0].text, "Project Titan ran in 2023.");
}

#[tokio::test]
async fn prune_with_failing_archive_leaves_hot_store_untouched() {
    let store = Arc::new(HotStore::open_in_memory(3, "scenario4").await.unwrap());
    let dir = tempfile::tempdir().unwrap();
    let archive_path = dir.path().join("archive.jsonl");
    let archive = Archive::open(&archive_path).unwrap();
    // Replace the backing file with a directory so every append's open()
    // call fails, simulating an unwritable archive.
    std::fs::remove_file(&archive_path).unwrap();
    std::fs::create_dir(&archive_path).unwrap();
    let archive = Arc::new(archive);

    for i in 0..5u32 {
        let m = memory(&format!("m{i}"), &format!("fact {i}"), "u1", i as i64);
        store
            .upsert(m, vec![1.0, i as f32 * 0.01, 0.0])
            .await
            .unwrap();
    }

    let llm: Arc<dyn LanguageModel> = Arc::new(ScriptedLlm {
        response: "{}".to_string(),
    });
    let embedder: Arc<dyn Embedder> = Arc::new(TableEmbedder::new(3, vec![1.0, 0.0, 0.0]));
    let ingestor = Ingestor::new(Some(llm), Some(embedder), store.clone(), archive);

    let report = ingestor.prune("u1", 3).await.unwrap();
    assert_eq!(report.archived, 0);
    assert!(report.archive_failures >= 1);
    assert_eq!(store.total_count().await.unwrap(), 5);
    assert_eq!(
        store
            .list(
                Scope {
                    user_id: "u1".to_string(),
                    run_id: None,
                },
                usize::MAX,
            )
            .await
            .unwrap()
            .len(),
        5
    );
}

#[tokio::test]
async fn reflection_fires_once_then_rearms_after_mark_failed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mem0-actions.json");
    let llm: Arc<dyn LanguageModel> = Arc::new(ScriptedLlm {
        response: r#"{"should_act": true, "message": "Ping me tomorrow about the deploy.", "delay_minutes": 1440}"#
            .to_string(),
    });
    let reflection = Reflection::open(&path, Some(llm), 30 * 24 * 3600 * 1000, 20)
        .await
        .unwrap();

    reflection
        .observe(&[("user".to_string(), "remind me tomorrow".to_string())], &[])
        .await
        .unwrap();
    assert_eq!(reflection.pending_count().await, 1);

    // trigger_at is 24h out; nothing should fire yet.
    assert!(reflection.poll().await.unwrap().is_none());
}

#[tokio::test]
async fn reflection_zero_delay_fires_exactly_once_then_rearms() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mem0-actions.json");
    let llm: Arc<dyn LanguageModel> = Arc::new(ScriptedLlm {
        response: r#"{"should_act": true, "message": "hi", "delay_minutes": 0}"#.to_string(),
    });
    let reflection = Reflection::open(&path, Some(llm), 1_000_000, 20).await.unwrap();
    reflection.observe(&[], &[]).await.unwrap();

    let first = reflection.poll().await.unwrap();
    assert!(first.is_some());
    let id = first.unwrap().id;
    assert!(reflection.poll().await.unwrap().is_none());

    reflection.mark_failed(&id).await.unwrap();
    let third = reflection.poll().await.unwrap();
    assert_eq!(third.unwrap().id, id);
}

#[tokio::test]
async fn token_budget_selects_a_bounded_prefix_of_recalled_memories() {
    let store = Arc::new(HotStore::open_in_memory(3, "scenario6").await.unwrap());
    let dir = tempfile::tempdir().unwrap();
    let archive = Arc::new(Archive::open(&dir.path().join("archive.jsonl")).unwrap());

    // 50 near-identical vectors close to the query direction so every one
    // of them clears the search threshold and the budget, not the
    // similarity cutoff, is what trims the result down.
    for i in 0..50u32 {
        let text = format!("fact {i}: {}", "word ".repeat(200).trim());
        let vector = vec![1.0, (i as f32) * 0.001, 0.0];
        store
            .upsert(memory(&format!("m{i}"), &text, "u1", i as i64), vector)
            .await
            .unwrap();
    }

    let embedder = Arc::new(TableEmbedder::new(3, vec![1.0, 0.0, 0.0]));
    let recall = Recall::new(store, archive, Some(embedder as Arc<dyn Embedder>), 128, 45_000);
    let memories = recall
        .search(
            RecallQuery {
                query: "anything".to_string(),
                user_id: "u1".to_string(),
                session_id: None,
                scope: SearchScope::All,
                limit: 50,
                deep: false,
            },
            0.0,
        )
        .await
        .unwrap();
    assert_eq!(memories.len(), 50);

    let built = ContextBuilder::build(&memories, "deepseek-chat");
    assert!(built.estimated_tokens <= 4000);
    assert!(built.truncated);
    assert!(built.injected_count < 50);
}
