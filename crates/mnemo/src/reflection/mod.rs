// crates/mnemo/src/reflection/mod.rs
// Durable scheduler of time-delayed proactive actions, backed by a single
// write-through JSON document rather than a SQL table, and simplified to
// a one-shot "observe after successful ingest" instead of a two-tier
// mining/enhance pipeline.

use crate::error::Result;
use crate::llm::{GenerateOptions, LanguageModel, Message};
use crate::utils::json::parse_json_hardened;
use crate::utils::now_ms;
use mnemo_types::{Memory, PendingAction};
use rand::Rng;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};

const REFLECTION_SYSTEM_INSTRUCTION: &str = "You watch a conversation for \
latent intent the user did not act on yet — a reminder, a follow-up, a \
thing to check back on. Return strict JSON of the shape \
{\"should_act\": bool, \"message\"?: string, \"delay_minutes\"?: number}. \
Set should_act=false unless there is a concrete, worth-surfacing action; \
message must be a short first-person notification to send the user later; \
delay_minutes is how long from now to wait before sending it (0 is \
immediate).";

#[derive(Debug, Clone, serde::Deserialize, Default)]
struct ReflectionDecision {
    #[serde(default)]
    should_act: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    delay_minutes: Option<f64>,
}

fn random_suffix() -> String {
    const CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::rng();
    (0..6)
        .map(|_| CHARS[rng.random_range(0..CHARS.len())] as char)
        .collect()
}

async fn load_or_empty(path: &Path) -> Vec<PendingAction> {
    match fs::read_to_string(path).await {
        Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
            warn!(error = %e, path = %path.display(), "corrupt reflection state file, starting empty");
            Vec::new()
        }),
        Err(_) => Vec::new(),
    }
}

/// Durable, write-through queue of [`PendingAction`]s.
///
/// Every mutating operation (`observe`, `poll`, `mark_failed`) rewrites the
/// whole backing file atomically (write-temp-then-rename), matching the
/// snapshot-write convention [`crate::stats`] uses for its status file.
pub struct Reflection {
    path: PathBuf,
    state: Mutex<Vec<PendingAction>>,
    llm: Option<Arc<dyn LanguageModel>>,
    action_ttl_ms: i64,
    max_pending_actions: usize,
}

impl Reflection {
    pub async fn open(
        path: &Path,
        llm: Option<Arc<dyn LanguageModel>>,
        action_ttl_ms: i64,
        max_pending_actions: usize,
    ) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let actions = load_or_empty(path).await;
        Ok(Self {
            path: path.to_path_buf(),
            state: Mutex::new(actions),
            llm,
            action_ttl_ms,
            max_pending_actions,
        })
    }

    async fn persist(&self, actions: &[PendingAction]) -> Result<()> {
        let json = serde_json::to_string_pretty(actions)?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, json).await?;
        fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }

    /// Inspects a freshly ingested batch and its recalled memories for
    /// latent intent, scheduling a [`PendingAction`] when the model reports
    /// one. Silently returns when no `LanguageModel` is configured or when
    /// `max_pending_actions` unfired entries are already queued.
    pub async fn observe(
        &self,
        messages: &[(String, String)],
        recent_memories: &[Memory],
    ) -> Result<()> {
        let Some(llm) = self.llm.as_ref() else {
            debug!("reflection has no language model configured, skipping observe");
            return Ok(());
        };

        {
            let actions = self.state.lock().await;
            let unfired = actions.iter().filter(|a| !a.fired).count();
            if unfired >= self.max_pending_actions {
                debug!(unfired, "max_pending_actions reached, skipping observe");
                return Ok(());
            }
        }

        let transcript = messages
            .iter()
            .map(|(role, text)| format!("{role}: {text}"))
            .collect::<Vec<_>>()
            .join("\n");
        let memories_text = recent_memories
            .iter()
            .map(|m| format!("- {}", m.text))
            .collect::<Vec<_>>()
            .join("\n");
        let user_content = format!("Conversation:\n{transcript}\n\nKnown memories:\n{memories_text}");

        let raw = llm
            .generate(
                vec![
                    Message::system(REFLECTION_SYSTEM_INSTRUCTION),
                    Message::user(user_content),
                ],
                GenerateOptions {
                    json_mode: true,
                    temperature: Some(0.3),
                    max_tokens: Some(200),
                },
            )
            .await?;

        let decision: ReflectionDecision = parse_json_hardened(&raw).unwrap_or_default();
        let Some(message) = decision
            .message
            .filter(|m| decision.should_act && !m.trim().is_empty())
        else {
            return Ok(());
        };

        let now = now_ms();
        let delay_minutes = decision.delay_minutes.unwrap_or(0.0).max(0.0);
        let action = PendingAction {
            id: format!("action_{now}_{}", random_suffix()),
            message,
            created_at: now,
            trigger_at: now + (delay_minutes * 60_000.0) as i64,
            fired: false,
            delivery_attempts: 0,
        };

        let mut actions = self.state.lock().await;
        let unfired = actions.iter().filter(|a| !a.fired).count();
        if unfired >= self.max_pending_actions {
            debug!(unfired, "max_pending_actions reached, dropping new action");
            return Ok(());
        }
        actions.push(action);
        let snapshot = actions.clone();
        drop(actions);
        self.persist(&snapshot).await
    }

    /// Prunes expired entries (regardless of `fired`), then returns and
    /// fires the first still-queued entry whose `trigger_at` has arrived.
    /// `fired` is the at-most-once bit: only `mark_failed` can clear it, so
    /// a fired-but-unexpired entry must survive pruning until then.
    pub async fn poll(&self) -> Result<Option<PendingAction>> {
        let now = now_ms();
        let mut actions = self.state.lock().await;
        let before = actions.len();
        let ttl = self.action_ttl_ms;
        actions.retain(|a| now - a.created_at < ttl);
        let pruned = actions.len() != before;

        let mut fired = None;
        for action in actions.iter_mut() {
            if !action.fired && action.trigger_at <= now {
                action.fired = true;
                fired = Some(action.clone());
                break;
            }
        }

        if pruned || fired.is_some() {
            let snapshot = actions.clone();
            drop(actions);
            self.persist(&snapshot).await?;
        }
        Ok(fired)
    }

    /// Re-arms `id` for delivery: clears `fired`, increments
    /// `delivery_attempts`. A no-op if `id` is unknown (already delivered
    /// and pruned, or never existed).
    pub async fn mark_failed(&self, id: &str) -> Result<()> {
        let mut actions = self.state.lock().await;
        let mut changed = false;
        for action in actions.iter_mut() {
            if action.id == id {
                action.fired = false;
                action.delivery_attempts += 1;
                changed = true;
            }
        }
        if changed {
            let snapshot = actions.clone();
            drop(actions);
            self.persist(&snapshot).await?;
        }
        Ok(())
    }

    pub async fn pending_count(&self) -> usize {
        self.state.lock().await.len()
    }
}
