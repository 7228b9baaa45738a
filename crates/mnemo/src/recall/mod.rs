// crates/mnemo/src/recall/mod.rs
// Multi-scope semantic search with a TTL'd result cache: an `lru`-backed
// cache of TTL'd Vec<Memory> entries in front of a concurrent fan-out
// across session/long-term/archive sub-searches.

use crate::archive::Archive;
use crate::embedder::Embedder;
use crate::error::Result;
use crate::store::{HotStore, Scope};
use crate::utils::now_ms;
use lru::LruCache;
use mnemo_types::Memory;
use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Which subset of memories a recall call draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    Session,
    LongTerm,
    All,
}

/// One `Recall::search` request. `session_id` is required for session-scoped
/// sub-searches; its absence silently skips that sub-search rather than
/// erroring (there is simply nothing to scope to).
#[derive(Debug, Clone)]
pub struct RecallQuery {
    pub query: String,
    pub user_id: String,
    pub session_id: Option<String>,
    pub scope: SearchScope,
    pub limit: usize,
    pub deep: bool,
}

fn fingerprint(q: &RecallQuery) -> String {
    let normalized = q.query.trim().to_lowercase();
    format!(
        "{}\u{1}{}\u{1}{}\u{1}{:?}\u{1}{}\u{1}{}",
        normalized,
        q.limit,
        q.user_id,
        q.scope,
        q.deep,
        q.session_id.as_deref().unwrap_or("-")
    )
}

struct CacheEntry {
    expires_at: i64,
    results: Vec<Memory>,
}

/// Bounded, TTL'd cache of merged search results keyed by request
/// fingerprint. Reads use `peek` rather than `get` so a cache hit does not
/// itself count as the "insertion" the eviction policy tracks: eviction
/// removes the least-recently-*inserted* key, not the least-recently-read
/// one.
pub struct SearchCache {
    entries: Mutex<LruCache<String, CacheEntry>>,
    ttl_ms: i64,
}

impl SearchCache {
    pub fn new(max_entries: usize, ttl_ms: u64) -> Self {
        let cap = NonZeroUsize::new(max_entries.max(1)).expect("max(1) is never zero");
        Self {
            entries: Mutex::new(LruCache::new(cap)),
            ttl_ms: ttl_ms as i64,
        }
    }

    async fn get(&self, key: &str) -> Option<Vec<Memory>> {
        let mut cache = self.entries.lock().await;
        if let Some(entry) = cache.peek(key) {
            if entry.expires_at > now_ms() {
                return Some(entry.results.clone());
            }
        }
        cache.pop(key);
        None
    }

    async fn put(&self, key: String, results: Vec<Memory>) {
        if results.is_empty() {
            return;
        }
        let mut cache = self.entries.lock().await;
        cache.put(
            key,
            CacheEntry {
                expires_at: now_ms() + self.ttl_ms,
                results,
            },
        );
    }

    /// Drop every cached entry. Invoked synchronously by whatever caller
    /// just completed a WriteQueue-acknowledged hot-store mutation, so a
    /// search never returns a result a just-committed write should have
    /// invalidated. `HotStore` itself has no reference back to `Recall` —
    /// the lifecycle coordinator is the sole owner of every mutating path
    /// (Ingestor's reconcile/prune, and direct deletes for `memory_forget`)
    /// and calls this right after each one completes.
    pub async fn invalidate_all(&self) {
        self.entries.lock().await.clear();
    }
}

/// Multi-scope search over the hot store, with an optional archive deep
/// search fan-in, backed by a [`SearchCache`].
pub struct Recall {
    store: Arc<HotStore>,
    archive: Arc<Archive>,
    embedder: Option<Arc<dyn Embedder>>,
    cache: SearchCache,
}

impl Recall {
    pub fn new(
        store: Arc<HotStore>,
        archive: Arc<Archive>,
        embedder: Option<Arc<dyn Embedder>>,
        cache_max_entries: usize,
        cache_ttl_ms: u64,
    ) -> Self {
        Self {
            store,
            archive,
            embedder,
            cache: SearchCache::new(cache_max_entries, cache_ttl_ms),
        }
    }

    pub fn cache(&self) -> &SearchCache {
        &self.cache
    }

    /// Runs `query` against the configured sources, merging and
    /// deduplicating by id with first-occurrence-wins, and caches a
    /// non-empty merged result. A missing embedder or an embedding failure
    /// degrades to an empty result set rather than an error — recall and
    /// ingest are both best-effort, not load-bearing for correctness.
    pub async fn search(&self, query: RecallQuery, threshold: f32) -> Result<Vec<Memory>> {
        let key = fingerprint(&query);
        if let Some(cached) = self.cache.get(&key).await {
            debug!(scope = ?query.scope, "recall cache hit");
            return Ok(cached);
        }

        let Some(embedder) = self.embedder.as_ref() else {
            warn!("recall invoked with no embedder configured, returning empty result");
            return Ok(Vec::new());
        };
        let vector = match embedder.embed(&query.query).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "embedder unavailable, recall returning empty result");
                return Ok(Vec::new());
            }
        };

        let want_long_term = matches!(query.scope, SearchScope::LongTerm | SearchScope::All);
        let want_session =
            matches!(query.scope, SearchScope::Session | SearchScope::All) && query.session_id.is_some();
        let want_archive =
            query.deep && matches!(query.scope, SearchScope::LongTerm | SearchScope::All);

        let long_term_fut = {
            let store = self.store.clone();
            let vector = vector.clone();
            let user_id = query.user_id.clone();
            let limit = query.limit;
            async move {
                if !want_long_term {
                    return Vec::new();
                }
                let scope = Scope {
                    user_id,
                    run_id: None,
                };
                store
                    .search(scope, vector, limit, threshold)
                    .await
                    .unwrap_or_else(|e| {
                        warn!(error = %e, "long-term sub-search failed");
                        Vec::new()
                    })
            }
        };

        let session_fut = {
            let store = self.store.clone();
            let vector = vector.clone();
            let user_id = query.user_id.clone();
            let session_id = query.session_id.clone();
            let limit = query.limit;
            async move {
                if !want_session {
                    return Vec::new();
                }
                let scope = Scope {
                    user_id,
                    run_id: session_id,
                };
                store
                    .search(scope, vector, limit, threshold)
                    .await
                    .unwrap_or_else(|e| {
                        warn!(error = %e, "session sub-search failed");
                        Vec::new()
                    })
            }
        };

        let archive_fut = {
            let archive = self.archive.clone();
            let user_id = query.user_id.clone();
            let text = query.query.clone();
            let limit = query.limit;
            async move {
                if !want_archive {
                    return Vec::new();
                }
                archive
                    .search(&user_id, &text, limit)
                    .await
                    .unwrap_or_else(|e| {
                        warn!(error = %e, "archive deep search failed");
                        Vec::new()
                    })
            }
        };

        let (long_term, session, archive) = tokio::join!(long_term_fut, session_fut, archive_fut);

        // Union order depends on scope.
        let ordered: Vec<Memory> = match query.scope {
            SearchScope::All => long_term.into_iter().chain(session).chain(archive).collect(),
            SearchScope::LongTerm => long_term.into_iter().chain(archive).collect(),
            SearchScope::Session => session,
        };

        let mut seen = HashSet::new();
        let mut merged = Vec::with_capacity(ordered.len());
        for memory in ordered {
            if seen.insert(memory.id.clone()) {
                merged.push(memory);
            }
        }

        self.cache.put(key, merged.clone()).await;
        Ok(merged)
    }
}
