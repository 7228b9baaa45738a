// crates/mnemo/src/store/mod.rs
// The hot vector store and its serializing write path: sqlite-vec backed
// similarity search (vec_distance_cosine) over a flat user_id/run_id scope,
// with every mutation routed through a single-consumer write queue.

mod pool;
mod writequeue;

pub use pool::HotStorePool;
pub use writequeue::WriteQueue;

use crate::error::{MnemoError, Result};
use mnemo_types::{Memory, SourceTier};
use rusqlite::{OptionalExtension, params};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Scope filter shared by search/list operations. `run_id: None` means
/// user-long-term memories (the row's `run_id` column is NULL); `Some(id)`
/// restricts to that session's scoped memories. There is no "all runs"
/// wildcard — every read is scoped.
#[derive(Debug, Clone)]
pub struct Scope {
    pub user_id: String,
    pub run_id: Option<String>,
}

fn row_to_memory(row: &rusqlite::Row) -> rusqlite::Result<Memory> {
    let categories_json: String = row.get("categories")?;
    let metadata_json: String = row.get("metadata")?;
    Ok(Memory {
        id: row.get("id")?,
        text: row.get("text")?,
        user_id: row.get("user_id")?,
        run_id: row.get("run_id")?,
        score: None,
        categories: serde_json::from_str(&categories_json).unwrap_or_default(),
        metadata: serde_json::from_str(&metadata_json).unwrap_or_default(),
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        source_tier: SourceTier::Hot,
    })
}

fn vector_to_blob(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// The hot vector store: a bounded, fully-indexed window of recent
/// memories backed by SQLite + sqlite-vec, mutated only through the
/// [`WriteQueue`].
pub struct HotStore {
    pool: Arc<HotStorePool>,
    queue: Arc<WriteQueue>,
    path: Option<PathBuf>,
    dimension: usize,
}

impl HotStore {
    pub async fn open(
        path: &Path,
        dimension: usize,
        write_delay: Duration,
    ) -> Result<Self> {
        let pool = Arc::new(HotStorePool::open(path, dimension).await?);
        Ok(Self {
            pool,
            queue: Arc::new(WriteQueue::new(write_delay)),
            path: Some(path.to_path_buf()),
            dimension,
        })
    }

    pub async fn open_in_memory(dimension: usize, label: &str) -> Result<Self> {
        let pool = Arc::new(HotStorePool::open_in_memory(dimension, label).await?);
        Ok(Self {
            pool,
            queue: Arc::new(WriteQueue::new(Duration::from_millis(0))),
            path: None,
            dimension,
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn queue_stats(&self) -> mnemo_types::WriteQueueStats {
        self.queue.stats()
    }

    pub fn size_bytes(&self) -> u64 {
        self.pool.size_bytes(self.path.as_ref())
    }

    /// Insert or replace a memory's row and embedding. Always stamps
    /// `updated_at = now`, serialized through the write queue.
    pub async fn upsert(&self, memory: Memory, vector: Vec<f32>) -> Result<Memory> {
        if vector.len() != self.dimension {
            return Err(MnemoError::Store(rusqlite::Error::InvalidParameterCount(
                vector.len(),
                self.dimension,
            )));
        }
        let pool = self.pool.clone();
        let mut memory = memory;
        memory.updated_at = crate::utils::now_ms();
        let memory_for_write = memory.clone();
        self.queue
            .enqueue(move || async move { Self::upsert_blocking(pool, memory_for_write, vector).await })
            .await?;
        Ok(memory)
    }

    async fn upsert_blocking(
        pool: Arc<HotStorePool>,
        memory: Memory,
        vector: Vec<f32>,
    ) -> Result<()> {
        let categories = serde_json::to_string(&memory.categories)?;
        let metadata = serde_json::to_string(&memory.metadata)?;
        let blob = vector_to_blob(&vector);
        pool.interact(move |conn| {
            let existing_seq: Option<i64> = conn
                .query_row(
                    "SELECT seq FROM memories WHERE id = ?1",
                    params![memory.id],
                    |r| r.get(0),
                )
                .optional()?;

            let seq = if let Some(seq) = existing_seq {
                conn.execute(
                    "UPDATE memories SET text = ?1, categories = ?2, metadata = ?3, updated_at = ?4
                     WHERE seq = ?5",
                    params![memory.text, categories, metadata, memory.updated_at, seq],
                )?;
                seq
            } else {
                conn.execute(
                    "INSERT INTO memories (id, text, user_id, run_id, categories, metadata, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        memory.id,
                        memory.text,
                        memory.user_id,
                        memory.run_id,
                        categories,
                        metadata,
                        memory.created_at,
                        memory.updated_at
                    ],
                )?;
                conn.last_insert_rowid()
            };

            conn.execute(
                "INSERT OR REPLACE INTO vec_memories (rowid, embedding) VALUES (?1, ?2)",
                params![seq, blob],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn get(&self, id: &str) -> Result<Option<Memory>> {
        let id = id.to_string();
        self.pool
            .interact(move |conn| {
                conn.query_row(
                    "SELECT id, text, user_id, run_id, categories, metadata, created_at, updated_at
                     FROM memories WHERE id = ?1",
                    params![id],
                    row_to_memory,
                )
                .optional()
            })
            .await
    }

    /// Idempotent: deleting an id that doesn't exist is not an error.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let pool = self.pool.clone();
        let id = id.to_string();
        self.queue
            .enqueue(move || async move {
                pool.interact(move |conn| {
                    let seq: Option<i64> = conn
                        .query_row("SELECT seq FROM memories WHERE id = ?1", params![id], |r| {
                            r.get(0)
                        })
                        .optional()?;
                    let Some(seq) = seq else {
                        return Ok(false);
                    };
                    conn.execute("DELETE FROM vec_memories WHERE rowid = ?1", params![seq])?;
                    conn.execute("DELETE FROM memories WHERE seq = ?1", params![seq])?;
                    Ok(true)
                })
                .await
            })
            .await
    }

    pub async fn list(&self, scope: Scope, limit: usize) -> Result<Vec<Memory>> {
        self.pool
            .interact(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, text, user_id, run_id, categories, metadata, created_at, updated_at
                     FROM memories
                     WHERE user_id = ?1 AND run_id IS ?2
                     ORDER BY updated_at DESC, id ASC
                     LIMIT ?3",
                )?;
                let rows = stmt
                    .query_map(params![scope.user_id, scope.run_id, limit as i64], row_to_memory)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await
    }

    /// Brute-force cosine search within `scope`, returning up to `limit`
    /// memories with `score >= threshold`, ordered by `(score desc,
    /// updated_at desc, id asc)` so repeated ties don't reorder between
    /// calls.
    pub async fn search(
        &self,
        scope: Scope,
        query_vector: Vec<f32>,
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<Memory>> {
        if query_vector.len() != self.dimension {
            return Err(MnemoError::Store(rusqlite::Error::InvalidParameterCount(
                query_vector.len(),
                self.dimension,
            )));
        }
        let blob = vector_to_blob(&query_vector);
        let candidates = self
            .pool
            .interact(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT m.id, m.text, m.user_id, m.run_id, m.categories, m.metadata,
                            m.created_at, m.updated_at,
                            vec_distance_cosine(v.embedding, ?1) as distance
                     FROM vec_memories v
                     JOIN memories m ON v.rowid = m.seq
                     WHERE m.user_id = ?2 AND m.run_id IS ?3",
                )?;
                let rows = stmt
                    .query_map(params![blob, scope.user_id, scope.run_id], |row| {
                        let memory = row_to_memory(row)?;
                        let distance: f64 = row.get("distance")?;
                        Ok((memory, distance))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        let mut out: Vec<Memory> = candidates
            .into_iter()
            .filter_map(|(mut memory, distance)| {
                let score = 1.0 - distance as f32;
                if score < threshold {
                    return None;
                }
                memory.score = Some(score);
                Some(memory)
            })
            .collect();

        // Sort by the full tie-break before truncating -- truncating on a
        // distance-only pre-sort can cut a candidate the final ordering
        // would have kept, when two candidates tie on score but differ in
        // `updated_at`.
        out.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.updated_at.cmp(&a.updated_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        out.truncate(limit);
        Ok(out)
    }

    pub async fn count(&self, scope: Scope) -> Result<u64> {
        self.pool
            .interact(move |conn| {
                conn.query_row(
                    "SELECT COUNT(*) FROM memories WHERE user_id = ?1 AND run_id IS ?2",
                    params![scope.user_id, scope.run_id],
                    |r| r.get(0),
                )
            })
            .await
    }

    pub async fn total_count(&self) -> Result<u64> {
        self.pool
            .interact(|conn| conn.query_row("SELECT COUNT(*) FROM memories", [], |r| r.get(0)))
            .await
    }

    /// All (id, created_at) pairs ordered oldest-first, for eviction
    /// decisions by the lifecycle coordinator.
    pub async fn oldest_ids(&self, limit: usize) -> Result<Vec<(String, i64)>> {
        self.pool
            .interact(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, created_at FROM memories ORDER BY created_at ASC LIMIT ?1",
                )?;
                let rows = stmt
                    .query_map(params![limit as i64], |r| Ok((r.get(0)?, r.get(1)?)))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await
    }
}

/// Deserialize the JSON metadata column back into a `BTreeMap`, used by
/// callers that read raw rows outside of [`row_to_memory`] (kept for
/// symmetry with the archive module's format helpers).
#[allow(dead_code)]
fn decode_metadata(raw: &str) -> BTreeMap<String, String> {
    serde_json::from_str(raw).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vec3(x: f32, y: f32, z: f32) -> Vec<f32> {
        let mut v = vec![x, y, z];
        let norm = (x * x + y * y + z * z).sqrt();
        if norm > 0.0 {
            for c in v.iter_mut() {
                *c /= norm;
            }
        }
        v
    }

    fn memory(id: &str, user: &str, run: Option<&str>) -> Memory {
        let now = crate::utils::now_ms();
        Memory {
            id: id.to_string(),
            text: format!("fact {id}"),
            user_id: user.to_string(),
            run_id: run.map(str::to_string),
            score: None,
            categories: vec![],
            metadata: BTreeMap::new(),
            created_at: now,
            updated_at: now,
            source_tier: SourceTier::Hot,
        }
    }

    #[tokio::test]
    async fn upsert_then_get_round_trips() {
        let store = HotStore::open_in_memory(3, "upsert_roundtrip").await.unwrap();
        let m = memory("m1", "u1", None);
        store.upsert(m.clone(), vec3(1.0, 0.0, 0.0)).await.unwrap();
        let fetched = store.get("m1").await.unwrap().unwrap();
        assert_eq!(fetched.text, "fact m1");
        assert!(fetched.timestamps_valid());
    }

    #[tokio::test]
    async fn repeated_upsert_is_idempotent_on_count() {
        let store = HotStore::open_in_memory(3, "upsert_idempotent").await.unwrap();
        let m = memory("m1", "u1", None);
        store.upsert(m.clone(), vec3(1.0, 0.0, 0.0)).await.unwrap();
        let first_updated = store.get("m1").await.unwrap().unwrap().updated_at;
        tokio::time::sleep(Duration::from_millis(2)).await;
        store.upsert(m.clone(), vec3(1.0, 0.0, 0.0)).await.unwrap();
        let second_updated = store.get("m1").await.unwrap().unwrap().updated_at;
        assert_eq!(store.total_count().await.unwrap(), 1);
        assert!(second_updated >= first_updated);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = HotStore::open_in_memory(3, "delete_idempotent").await.unwrap();
        let m = memory("m1", "u1", None);
        store.upsert(m, vec3(1.0, 0.0, 0.0)).await.unwrap();
        assert!(store.delete("m1").await.unwrap());
        assert!(!store.delete("m1").await.unwrap());
        assert!(store.get("m1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn search_respects_user_scope_and_threshold() {
        let store = HotStore::open_in_memory(3, "search_scope").await.unwrap();
        store
            .upsert(memory("m1", "u1", None), vec3(1.0, 0.0, 0.0))
            .await
            .unwrap();
        store
            .upsert(memory("m2", "u2", None), vec3(1.0, 0.0, 0.0))
            .await
            .unwrap();

        let scope = Scope {
            user_id: "u1".to_string(),
            run_id: None,
        };
        let results = store
            .search(scope, vec3(1.0, 0.0, 0.0), 10, 0.5)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "m1");
        assert!(results[0].score.unwrap() > 0.9);
    }

    #[tokio::test]
    async fn search_excludes_results_below_threshold() {
        let store = HotStore::open_in_memory(3, "search_threshold").await.unwrap();
        store
            .upsert(memory("m1", "u1", None), vec3(1.0, 0.0, 0.0))
            .await
            .unwrap();
        store
            .upsert(memory("m2", "u1", None), vec3(0.0, 1.0, 0.0))
            .await
            .unwrap();

        let scope = Scope {
            user_id: "u1".to_string(),
            run_id: None,
        };
        let results = store
            .search(scope, vec3(1.0, 0.0, 0.0), 10, 0.99)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "m1");
    }

    #[tokio::test]
    async fn run_id_none_and_some_do_not_overlap() {
        let store = HotStore::open_in_memory(3, "run_id_scope").await.unwrap();
        store
            .upsert(memory("m1", "u1", None), vec3(1.0, 0.0, 0.0))
            .await
            .unwrap();
        store
            .upsert(memory("m2", "u1", Some("session-a")), vec3(1.0, 0.0, 0.0))
            .await
            .unwrap();

        let long_term = Scope {
            user_id: "u1".to_string(),
            run_id: None,
        };
        let session = Scope {
            user_id: "u1".to_string(),
            run_id: Some("session-a".to_string()),
        };
        let lt_results = store.list(long_term, 10).await.unwrap();
        let sess_results = store.list(session, 10).await.unwrap();
        assert_eq!(lt_results.len(), 1);
        assert_eq!(lt_results[0].id, "m1");
        assert_eq!(sess_results.len(), 1);
        assert_eq!(sess_results[0].id, "m2");
    }
}
