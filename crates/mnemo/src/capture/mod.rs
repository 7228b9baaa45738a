// crates/mnemo/src/capture/mod.rs
// Debounced per-session batching of observed conversation turns: one
// debounce timer per session buffer, using a generation-style staleness
// guard so a later `schedule` call cancels an earlier timer without
// needing an abort handle.

use crate::ingestor::{IngestOptions, IngestSink, TurnMessage};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::warn;

const GLOBAL_KEY: &str = "__global__";

#[derive(Default)]
struct Buffer {
    messages: Vec<TurnMessage>,
    /// Bumped on every `schedule`; a debounce timer only flushes if the
    /// generation it captured is still current, which is how a later
    /// `schedule` call "cancels" an earlier timer without a handle.
    generation: u64,
}

/// Drops empty-text entries, collapses adjacent (role, text) duplicates,
/// then truncates to the last `max` messages.
fn compact(messages: Vec<TurnMessage>, max: usize) -> Vec<TurnMessage> {
    let mut out: Vec<TurnMessage> = Vec::with_capacity(messages.len());
    for m in messages {
        if m.text.trim().is_empty() {
            continue;
        }
        if let Some(last) = out.last() {
            if last.role == m.role && last.text == m.text {
                continue;
            }
        }
        out.push(m);
    }
    if out.len() > max {
        let excess = out.len() - max;
        out.drain(0..excess);
    }
    out
}

fn key_for(session_id: &Option<String>) -> String {
    session_id.clone().unwrap_or_else(|| GLOBAL_KEY.to_string())
}

fn session_id_for(key: &str) -> Option<String> {
    if key == GLOBAL_KEY {
        None
    } else {
        Some(key.to_string())
    }
}

/// Per-session buffer with a debounce timer, handing compacted batches to
/// an [`IngestSink`] once the window elapses without new activity.
pub struct CaptureBatcher {
    buffers: Mutex<HashMap<String, Buffer>>,
    timer_handles: Mutex<Vec<JoinHandle<()>>>,
    sink: Arc<dyn IngestSink>,
    user_id: String,
    window: Duration,
    max_messages: usize,
}

impl CaptureBatcher {
    pub fn new(
        sink: Arc<dyn IngestSink>,
        user_id: String,
        window_ms: u64,
        max_messages: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            buffers: Mutex::new(HashMap::new()),
            timer_handles: Mutex::new(Vec::new()),
            sink,
            user_id,
            window: Duration::from_millis(window_ms),
            max_messages,
        })
    }

    /// Append `messages` to `session_id`'s buffer (ordering within one
    /// buffer is preserved; there is no cross-buffer ordering guarantee),
    /// retaining only the last `capture_batch_max_messages` on overflow,
    /// then (re)arm that buffer's debounce timer.
    pub async fn schedule(self: &Arc<Self>, session_id: Option<String>, messages: Vec<TurnMessage>) {
        if messages.is_empty() {
            return;
        }
        let key = key_for(&session_id);
        let generation = {
            let mut buffers = self.buffers.lock().await;
            let buffer = buffers.entry(key.clone()).or_default();
            buffer.messages.extend(messages);
            if buffer.messages.len() > self.max_messages {
                let excess = buffer.messages.len() - self.max_messages;
                buffer.messages.drain(0..excess);
            }
            buffer.generation += 1;
            buffer.generation
        };

        let this = self.clone();
        let window = self.window;
        let timer_key = key.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            this.fire_if_current(&timer_key, generation).await;
        });
        self.timer_handles.lock().await.push(handle);
    }

    async fn fire_if_current(&self, key: &str, generation: u64) {
        let current = self.buffers.lock().await.get(key).map(|b| b.generation);
        if current == Some(generation) {
            self.flush(&key_for(&session_id_for(key))).await;
        }
    }

    /// Atomically detach `key`'s buffer and hand the compacted batch to the
    /// configured sink under its original `session_id`. Sink failures are
    /// logged and the batch discarded — raw turns are never re-queued.
    pub async fn flush(&self, key: &str) {
        let messages = {
            let mut buffers = self.buffers.lock().await;
            buffers.remove(key).map(|b| b.messages).unwrap_or_default()
        };
        let compacted = compact(messages, self.max_messages);
        if compacted.is_empty() {
            return;
        }
        let opts = IngestOptions {
            user_id: self.user_id.clone(),
            run_id: session_id_for(key),
        };
        if let Err(e) = self.sink.ingest(&compacted, &opts).await {
            warn!(error = %e, key, "capture batch ingest failed, discarding batch");
        }
    }

    /// Drains every buffer and awaits every in-flight debounce timer.
    /// Idempotent: a second call finds nothing left to drain.
    pub async fn flush_all(&self) {
        let keys: Vec<String> = self.buffers.lock().await.keys().cloned().collect();
        for key in keys {
            self.flush(&key).await;
        }
        let handles: Vec<JoinHandle<()>> = self.timer_handles.lock().await.drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
    }
}
