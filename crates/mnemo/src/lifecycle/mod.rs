// crates/mnemo/src/lifecycle/mod.rs
// Owns every subsystem instance and drives the host event lifecycle: a
// spawned tick loop with an idempotent abort handle, and the single struct
// the host talks to for before_turn/after_turn/tick.

use crate::archive::Archive;
use crate::capture::CaptureBatcher;
use crate::config::{ApiKeys, Config};
use crate::context::{BudgetConfig, ContextBuilder};
use crate::embedder;
use crate::error::Result;
use crate::ingestor::{ExtractionOutcome, IngestOptions, IngestSink, Ingestor, TurnMessage};
use crate::llm;
use crate::recall::{Recall, RecallQuery, SearchScope};
use crate::reflection::Reflection;
use crate::stats::Stats;
use crate::store::HotStore;
use async_trait::async_trait;
use mnemo_types::StatsSnapshot;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// The glue between [`Ingestor`] and the rest of the coordinator's
/// subsystems: every successful, non-empty extraction must invalidate
/// Recall's cache and feed [`Reflection::observe`], whether it arrived via
/// the debounced [`CaptureBatcher`] path or the immediate [`Lifecycle::ingest_now`]
/// path. Holding `Arc<Ingestor>`/`Arc<Recall>`/`Arc<Reflection>` directly
/// (rather than `Arc<Lifecycle>`) keeps this acyclic: `Lifecycle` owns this
/// sink, this sink does not own `Lifecycle`.
struct CaptureIngestSink {
    ingestor: Arc<Ingestor>,
    recall: Arc<Recall>,
    reflection: Arc<Reflection>,
    top_k: usize,
    search_threshold: f32,
}

impl CaptureIngestSink {
    async fn run(&self, batch: &[TurnMessage], opts: &IngestOptions) -> Result<ExtractionOutcome> {
        let outcome = self.ingestor.extract(batch, opts).await?;
        if outcome.results.is_empty() {
            return Ok(outcome);
        }

        self.recall.cache().invalidate_all().await;

        let query_text = batch
            .iter()
            .map(|m| m.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let recent = self
            .recall
            .search(
                RecallQuery {
                    query: query_text,
                    user_id: opts.user_id.clone(),
                    session_id: opts.run_id.clone(),
                    scope: SearchScope::All,
                    limit: self.top_k,
                    deep: false,
                },
                self.search_threshold,
            )
            .await
            .unwrap_or_default();

        let transcript: Vec<(String, String)> = batch
            .iter()
            .map(|m| (m.role.clone(), m.text.clone()))
            .collect();
        if let Err(e) = self.reflection.observe(&transcript, &recent).await {
            warn!(error = %e, "reflection observe failed after ingest");
        }

        Ok(outcome)
    }
}

#[async_trait]
impl IngestSink for CaptureIngestSink {
    async fn ingest(&self, batch: &[TurnMessage], opts: &IngestOptions) -> Result<ExtractionOutcome> {
        self.run(batch, opts).await
    }
}

/// Per-turn host context. `model_id` drives [`ContextBuilder`]'s token
/// budget; `session_id` scopes Recall's session sub-search and
/// CaptureBatcher's buffer key.
#[derive(Debug, Clone, Default)]
pub struct TurnContext {
    pub session_id: Option<String>,
    pub model_id: String,
}

/// One observed chat message as the host reports it: `content` is either a
/// plain string or a list of `{type, text}` blocks.
#[derive(Debug, Clone)]
pub struct HostMessage {
    pub role: String,
    pub content: serde_json::Value,
}

fn extract_text(content: &serde_json::Value) -> String {
    match content {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Array(blocks) => blocks
            .iter()
            .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
            .collect::<Vec<_>>()
            .join(""),
        _ => String::new(),
    }
}

const MAX_CAPTURED_MESSAGES: usize = 10;
const MIN_PROMPT_LEN_FOR_RECALL: usize = 5;

fn data_file(data_dir: &Path, name: &str) -> PathBuf {
    data_dir.join(name)
}

/// Owns HotStore, Archive, Ingestor, Recall, CaptureBatcher, Reflection and
/// Stats, and is the sole caller of every mutating path — including the
/// synchronous `recall.cache().invalidate_all()` every one of them must
/// trigger afterward so a stale cache entry never outlives its write.
pub struct Lifecycle {
    config: Config,
    store: Arc<HotStore>,
    archive: Arc<Archive>,
    ingestor: Arc<Ingestor>,
    recall: Arc<Recall>,
    capture: Arc<CaptureBatcher>,
    capture_sink: Arc<CaptureIngestSink>,
    reflection: Arc<Reflection>,
    stats: Stats,
    current_session_id: Mutex<Option<String>>,
    tick_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Lifecycle {
    /// Ensures `data_dir` exists, constructs every subsystem, runs one
    /// prune pass, writes the initial status snapshot, and arms the tick
    /// timer. Idempotent only in the sense that calling it twice yields two
    /// independent instances — the host is expected to call this once.
    pub async fn start(config: Config, data_dir: &Path, api_keys: &ApiKeys) -> Result<Arc<Self>> {
        tokio::fs::create_dir_all(data_dir).await?;

        let embedder = embedder::from_api_keys(api_keys);
        let language_model = llm::from_api_keys(api_keys);
        let dimension = crate::embedder::resolve_dimension(api_keys);

        let store = Arc::new(
            HotStore::open(
                &data_file(data_dir, "vector_store.db"),
                dimension,
                Duration::from_millis(config.write_queue_delay_ms),
            )
            .await?,
        );
        let archive = Arc::new(Archive::open(&data_file(data_dir, "mem0-archive.jsonl"))?);
        let ingestor = Arc::new(Ingestor::new(
            language_model.clone(),
            embedder.clone(),
            store.clone(),
            archive.clone(),
        ));
        let recall = Arc::new(Recall::new(
            store.clone(),
            archive.clone(),
            embedder.clone(),
            config.search_cache_max_entries,
            config.search_cache_ttl_ms,
        ));
        let reflection = Arc::new(
            Reflection::open(
                &data_file(data_dir, "mem0-actions.json"),
                language_model.clone(),
                config.action_ttl_ms,
                config.max_pending_actions,
            )
            .await?,
        );
        let capture_sink = Arc::new(CaptureIngestSink {
            ingestor: ingestor.clone(),
            recall: recall.clone(),
            reflection: reflection.clone(),
            top_k: config.top_k,
            search_threshold: config.search_threshold,
        });
        let capture = CaptureBatcher::new(
            capture_sink.clone() as Arc<dyn IngestSink>,
            config.user_id.clone(),
            config.capture_batch_window_ms,
            config.capture_batch_max_messages,
        );
        let stats = Stats::new(
            &data_file(data_dir, "mem0-status.json"),
            store.clone(),
            archive.clone(),
            config.user_id.clone(),
        );

        let this = Arc::new(Self {
            config,
            store,
            archive,
            ingestor,
            recall,
            capture,
            capture_sink,
            reflection,
            stats,
            current_session_id: Mutex::new(None),
            tick_handle: Mutex::new(None),
        });

        match this
            .ingestor
            .prune(&this.config.user_id, this.config.max_memory_count)
            .await
        {
            Ok(report) => {
                if report.archived > 0 {
                    info!(archived = report.archived, "startup prune pass completed");
                    this.recall.cache().invalidate_all().await;
                }
            }
            Err(e) => warn!(error = %e, "startup prune pass failed"),
        }

        if let Err(e) = this.stats.write_snapshot().await {
            warn!(error = %e, "failed to write initial status snapshot");
        }

        this.clone().arm_tick();
        Ok(this)
    }

    fn arm_tick(self: Arc<Self>) {
        let interval = Duration::from_millis(self.config.reflection_tick_ms);
        let worker = self.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                worker.tick().await;
            }
        });
        // start() is only ever called once per instance, but guard anyway
        // so a duplicate arm never leaks the previous task.
        if let Ok(mut slot) = self.tick_handle.try_lock() {
            if let Some(old) = slot.replace(handle) {
                old.abort();
            }
        }
    }

    async fn tick(&self) {
        match self.reflection.poll().await {
            Ok(Some(action)) => {
                // Outbound delivery is outside this crate's scope; we only
                // have a logging sink. Treat the log as the delivery
                // attempt and re-arm on failure.
                info!(action_id = %action.id, message = %action.message, "delivering proactive action");
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "reflection poll failed"),
        }
        if let Err(e) = self.stats.write_snapshot().await {
            warn!(error = %e, "tick status snapshot failed");
        }
    }

    /// Recall → ContextBuilder → Reflection.poll, yielding the system
    /// context string to inject. Returns `None` when `auto_recall` is off,
    /// the prompt is too short, or nothing was found and no action fired.
    pub async fn before_turn(&self, prompt: &str, ctx: &TurnContext) -> Option<String> {
        if !self.config.auto_recall || prompt.len() < MIN_PROMPT_LEN_FOR_RECALL {
            return None;
        }
        *self.current_session_id.lock().await = ctx.session_id.clone();

        let memories = match self
            .recall
            .search(
                RecallQuery {
                    query: prompt.to_string(),
                    user_id: self.config.user_id.clone(),
                    session_id: ctx.session_id.clone(),
                    scope: SearchScope::All,
                    limit: self.config.top_k,
                    deep: false,
                },
                self.config.search_threshold,
            )
            .await
        {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "recall failed during before_turn, proceeding without injection");
                Vec::new()
            }
        };

        let budget_cfg = BudgetConfig {
            ratio: self.config.memory_token_budget_ratio as f64,
            min: self.config.memory_token_budget_min,
            max: self.config.memory_token_budget_max,
        };
        let built = ContextBuilder::build_with_budget(&memories, &ctx.model_id, &budget_cfg);

        let fired = match self.reflection.poll().await {
            Ok(action) => action,
            Err(e) => {
                warn!(error = %e, "reflection poll failed during before_turn");
                None
            }
        };

        let mut text = built.text;
        if let Some(action) = fired {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(&format!(
                "<proactive-insight>\n系统提示: {}\n</proactive-insight>",
                action.message
            ));
        }

        if text.is_empty() { None } else { Some(text) }
    }

    /// Filters `messages` to user/assistant roles with non-empty text and
    /// schedules the last [`MAX_CAPTURED_MESSAGES`] through CaptureBatcher.
    /// A no-op unless `auto_capture` is on, `success` is true, and there is
    /// anything to capture.
    pub async fn after_turn(&self, messages: &[HostMessage], success: bool, ctx: &TurnContext) {
        if !self.config.auto_capture || !success || messages.is_empty() {
            return;
        }
        let mut turns: Vec<TurnMessage> = messages
            .iter()
            .filter(|m| m.role == "user" || m.role == "assistant")
            .map(|m| TurnMessage {
                role: m.role.clone(),
                text: extract_text(&m.content),
            })
            .filter(|m| !m.text.trim().is_empty())
            .collect();
        if turns.is_empty() {
            return;
        }
        if turns.len() > MAX_CAPTURED_MESSAGES {
            let excess = turns.len() - MAX_CAPTURED_MESSAGES;
            turns.drain(0..excess);
        }
        self.capture.schedule(ctx.session_id.clone(), turns).await;
    }

    /// Runs extraction + reconciliation for an already-batched turn set
    /// outside the debounced capture path (used by the CLI's
    /// `import-legacy` and MCP's `memory_store`), through the same
    /// [`CaptureIngestSink`] the debounced path uses — so both routes
    /// invalidate Recall's cache and observe Reflection identically on a
    /// successful, non-empty extraction.
    pub async fn ingest_now(
        &self,
        text: &str,
        run_id: Option<String>,
    ) -> Result<crate::ingestor::ExtractionOutcome> {
        let batch = vec![TurnMessage {
            role: "user".to_string(),
            text: text.to_string(),
        }];
        let opts = IngestOptions {
            user_id: self.config.user_id.clone(),
            run_id,
        };
        self.capture_sink.run(&batch, &opts).await
    }

    /// Deletes `id` from the hot store and synchronously invalidates
    /// Recall's cache, matching the ordering guarantee every other
    /// mutating path observes.
    pub async fn forget(&self, id: &str) -> Result<bool> {
        let deleted = self.store.delete(id).await?;
        self.recall.cache().invalidate_all().await;
        Ok(deleted)
    }

    pub async fn stats_snapshot(&self) -> Result<StatsSnapshot> {
        self.stats.snapshot().await
    }

    pub fn store(&self) -> &Arc<HotStore> {
        &self.store
    }

    pub fn archive(&self) -> &Arc<Archive> {
        &self.archive
    }

    pub fn recall(&self) -> &Arc<Recall> {
        &self.recall
    }

    pub fn ingestor(&self) -> &Arc<Ingestor> {
        &self.ingestor
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Clears the tick timer, flushes every pending capture buffer, waits
    /// for the write queue to settle, and writes a final status snapshot.
    /// Safe to call more than once.
    pub async fn stop(&self) {
        if let Some(handle) = self.tick_handle.lock().await.take() {
            handle.abort();
        }
        self.capture.flush_all().await;
        while self.store.queue_stats().current_queue > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        if let Err(e) = self.stats.write_snapshot().await {
            warn!(error = %e, "failed to write final status snapshot");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            reflection_tick_ms: 60_000,
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn start_creates_data_files_and_stop_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let lifecycle = Lifecycle::start(test_config(), dir.path(), &ApiKeys::default())
            .await
            .unwrap();
        assert!(dir.path().join("mem0-status.json").exists());
        assert!(dir.path().join("mem0-archive.jsonl").exists());

        lifecycle.stop().await;
        lifecycle.stop().await;
    }

    #[tokio::test]
    async fn before_turn_with_short_prompt_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let lifecycle = Lifecycle::start(test_config(), dir.path(), &ApiKeys::default())
            .await
            .unwrap();
        let ctx = TurnContext {
            session_id: None,
            model_id: "gpt-4".to_string(),
        };
        assert!(lifecycle.before_turn("hi", &ctx).await.is_none());
        lifecycle.stop().await;
    }

    #[tokio::test]
    async fn before_turn_with_no_embedder_returns_none_without_error() {
        let dir = tempfile::tempdir().unwrap();
        let lifecycle = Lifecycle::start(test_config(), dir.path(), &ApiKeys::default())
            .await
            .unwrap();
        let ctx = TurnContext {
            session_id: None,
            model_id: "gpt-4".to_string(),
        };
        assert!(
            lifecycle
                .before_turn("a long enough prompt to pass the length gate", &ctx)
                .await
                .is_none()
        );
        lifecycle.stop().await;
    }

    #[tokio::test]
    async fn after_turn_with_auto_capture_off_does_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            auto_capture: false,
            ..test_config()
        };
        let lifecycle = Lifecycle::start(config, dir.path(), &ApiKeys::default())
            .await
            .unwrap();
        let ctx = TurnContext::default();
        lifecycle
            .after_turn(
                &[HostMessage {
                    role: "user".to_string(),
                    content: serde_json::json!("hello"),
                }],
                true,
                &ctx,
            )
            .await;
        lifecycle.stop().await;
    }

    #[test]
    fn extract_text_concatenates_blocks() {
        let content = serde_json::json!([
            {"type": "text", "text": "hello "},
            {"type": "text", "text": "world"},
        ]);
        assert_eq!(extract_text(&content), "hello world");
    }

    #[test]
    fn extract_text_from_plain_string() {
        assert_eq!(extract_text(&serde_json::json!("just text")), "just text");
    }

    struct SequencedLlm {
        responses: Mutex<std::collections::VecDeque<String>>,
    }

    #[async_trait]
    impl crate::llm::LanguageModel for SequencedLlm {
        async fn generate(
            &self,
            _messages: Vec<crate::llm::Message>,
            _opts: crate::llm::GenerateOptions,
        ) -> Result<String> {
            Ok(self
                .responses
                .lock()
                .await
                .pop_front()
                .unwrap_or_else(|| "{}".to_string()))
        }
    }

    struct FixedEmbedder;
    #[async_trait]
    impl crate::embedder::Embedder for FixedEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0, 0.0, 0.0])
        }
        fn dimension(&self) -> usize {
            3
        }
    }

    /// The whole point of `CaptureIngestSink`: a successful, non-empty
    /// extraction through it must invalidate Recall's cache and feed
    /// Reflection.observe, whether it was reached from the debounced
    /// CaptureBatcher path or `ingest_now`'s immediate path.
    #[tokio::test]
    async fn capture_ingest_sink_invalidates_cache_and_observes_reflection() {
        use crate::archive::Archive;
        use crate::ingestor::Ingestor;
        use mnemo_types::Memory;

        let store = Arc::new(HotStore::open_in_memory(3, "capture_sink_fix").await.unwrap());
        let archive_dir = tempfile::tempdir().unwrap();
        let archive = Arc::new(Archive::open(&archive_dir.path().join("a.jsonl")).unwrap());

        let llm: Arc<dyn crate::llm::LanguageModel> = Arc::new(SequencedLlm {
            responses: Mutex::new(
                vec![
                    r#"{"facts": ["User likes dark mode."]}"#.to_string(),
                    r#"{"should_act": true, "message": "Check in about dark mode.", "delay_minutes": 0}"#
                        .to_string(),
                ]
                .into(),
            ),
        });
        let embedder: Arc<dyn crate::embedder::Embedder> = Arc::new(FixedEmbedder);

        let ingestor = Arc::new(Ingestor::new(
            Some(llm.clone()),
            Some(embedder.clone()),
            store.clone(),
            archive.clone(),
        ));
        let recall = Arc::new(Recall::new(
            store.clone(),
            archive.clone(),
            Some(embedder),
            128,
            45_000,
        ));
        let reflection_dir = tempfile::tempdir().unwrap();
        let reflection = Arc::new(
            Reflection::open(
                &reflection_dir.path().join("actions.json"),
                Some(llm),
                Config::default().action_ttl_ms,
                20,
            )
            .await
            .unwrap(),
        );

        let sink = CaptureIngestSink {
            ingestor,
            recall: recall.clone(),
            reflection: reflection.clone(),
            top_k: 5,
            search_threshold: 0.0,
        };

        // Plant a stale memory, cache a search that returns it, then delete
        // it from the store directly (bypassing Recall) so the only way
        // the post-ingest search can see fresh data is if the sink actually
        // invalidated the cache.
        let stale = store
            .upsert(
                Memory {
                    id: "stale".to_string(),
                    text: "OLD STALE FACT".to_string(),
                    user_id: "u1".to_string(),
                    run_id: None,
                    score: None,
                    categories: vec![],
                    metadata: Default::default(),
                    created_at: 1,
                    updated_at: 1,
                    source_tier: mnemo_types::SourceTier::Hot,
                },
                vec![1.0, 0.0, 0.0],
            )
            .await
            .unwrap();
        let query = RecallQuery {
            query: "preferences".to_string(),
            user_id: "u1".to_string(),
            session_id: None,
            scope: SearchScope::All,
            limit: 5,
            deep: false,
        };
        let before = recall.search(query.clone(), 0.0).await.unwrap();
        assert_eq!(before.len(), 1);
        assert_eq!(before[0].id, stale.id);
        store.delete(&stale.id).await.unwrap();

        let batch = vec![TurnMessage {
            role: "user".to_string(),
            text: "I like dark mode.".to_string(),
        }];
        let opts = IngestOptions {
            user_id: "u1".to_string(),
            run_id: None,
        };
        let outcome = sink.run(&batch, &opts).await.unwrap();
        assert_eq!(outcome.results.len(), 1);

        // If the sink hadn't invalidated the cache this would still return
        // the now-deleted stale memory.
        let after = recall.search(query, 0.0).await.unwrap();
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].text, "User likes dark mode.");

        // Reflection must have observed the batch + recalled memories and
        // scheduled the action the scripted decision asked for.
        assert_eq!(reflection.pending_count().await, 1);
        let fired = reflection.poll().await.unwrap().unwrap();
        assert_eq!(fired.message, "Check in about dark mode.");
    }
}
