// crates/mnemo/src/archive/mod.rs
// Append-only JSONL archive with streaming keyword search: a line-oriented
// append log as the durability floor beneath the indexed hot store.

use crate::error::Result;
use crate::utils::now_ms;
use mnemo_types::{Memory, SourceTier};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::task;

/// One durable archive row: a serialized [`Memory`], one per line. No
/// embedding is kept — archive search is deliberately linear keyword
/// matching, never vector search.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct ArchiveRecord {
    id: String,
    text: String,
    user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    run_id: Option<String>,
    #[serde(default)]
    categories: Vec<String>,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
    created_at: i64,
    updated_at: i64,
}

impl ArchiveRecord {
    fn into_memory(self) -> Memory {
        Memory {
            id: self.id,
            text: self.text,
            user_id: self.user_id,
            run_id: self.run_id,
            score: None,
            categories: self.categories,
            metadata: self.metadata,
            created_at: self.created_at,
            updated_at: self.updated_at,
            source_tier: SourceTier::Archive,
        }
    }
}

#[derive(Clone, Copy)]
struct LineCountFingerprint {
    size: u64,
    mtime_ms: i64,
}

struct CachedLineCount {
    fingerprint: LineCountFingerprint,
    count: u64,
}

/// Append-only JSONL store for memories pruned out of the hot window.
/// Every mutation is a single `O_APPEND` write; there is no in-place
/// update or delete — superseding a fact just appends a new row with the
/// same `id` and a later `updated_at`, and readers take the last one seen.
pub struct Archive {
    path: PathBuf,
    line_count_cache: Mutex<Option<CachedLineCount>>,
}

/// Splits on whitespace and punctuation into lowercase tokens of length
/// >= 2; single-character tokens carry too little signal to rank on and
/// are dropped.
fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|s| s.chars().count() >= 2)
        .map(|s| s.to_lowercase())
        .collect()
}

impl Archive {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if !path.exists() {
            File::create(path)?;
        }
        Ok(Self {
            path: path.to_path_buf(),
            line_count_cache: Mutex::new(None),
        })
    }

    /// Append `memory`. Blocking file I/O is pushed to a blocking task so
    /// callers running on the write queue don't stall the async runtime.
    pub async fn append(&self, memory: Memory) -> Result<()> {
        let record = ArchiveRecord {
            id: memory.id,
            text: memory.text,
            user_id: memory.user_id,
            run_id: memory.run_id,
            categories: memory.categories,
            metadata: memory.metadata,
            created_at: memory.created_at,
            updated_at: memory.updated_at,
        };
        let path = self.path.clone();
        task::spawn_blocking(move || -> Result<()> {
            let line = serde_json::to_string(&record)?;
            let mut file = OpenOptions::new().append(true).open(&path)?;
            writeln!(file, "{line}")?;
            Ok(())
        })
        .await??;
        // A new line invalidates any cached count even if size+mtime happen
        // to collide at millisecond resolution on fast filesystems.
        *self.line_count_cache.lock().unwrap() = None;
        Ok(())
    }

    fn fingerprint(&self) -> Result<LineCountFingerprint> {
        let meta = std::fs::metadata(&self.path)?;
        let mtime_ms = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        Ok(LineCountFingerprint {
            size: meta.len(),
            mtime_ms,
        })
    }

    /// Number of records in the archive, cached against a (size, mtime)
    /// fingerprint so repeated calls between writes don't re-scan the file.
    pub async fn line_count(&self) -> Result<u64> {
        let fingerprint = self.fingerprint()?;
        if let Some(cached) = self.line_count_cache.lock().unwrap().as_ref() {
            if cached.fingerprint.size == fingerprint.size
                && cached.fingerprint.mtime_ms == fingerprint.mtime_ms
            {
                return Ok(cached.count);
            }
        }
        let path = self.path.clone();
        let count = task::spawn_blocking(move || -> Result<u64> {
            let file = File::open(&path)?;
            let reader = BufReader::new(file);
            Ok(reader.lines().count() as u64)
        })
        .await??;
        *self.line_count_cache.lock().unwrap() = Some(CachedLineCount { fingerprint, count });
        Ok(count)
    }

    pub async fn size_bytes(&self) -> Result<u64> {
        Ok(std::fs::metadata(&self.path)?.len())
    }

    /// Streaming keyword search, scoped to `user_id`. Archive entries are
    /// always long-term (pruning never carries `run_id` through), so there
    /// is no session scoping here, matching Recall's use of Archive only
    /// for `deep` long-term/all searches.
    ///
    /// Tokenizes `query` into lowercase tokens of length >= 2; a line
    /// matches if its lowercased text contains any query token as a
    /// substring. Ranked by distinct matched-token count descending, then
    /// by insertion order.
    pub async fn search(&self, user_id: &str, query: &str, limit: usize) -> Result<Vec<Memory>> {
        let query_tokens = tokenize(query);
        if query_tokens.is_empty() {
            return Ok(Vec::new());
        }
        let path = self.path.clone();
        let user_id = user_id.to_string();

        let mut ranked = task::spawn_blocking(move || -> Result<Vec<(usize, usize, Memory)>> {
            let file = File::open(&path)?;
            let reader = BufReader::new(file);
            let mut ranked = Vec::new();
            for (idx, line) in reader.lines().enumerate() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                let record: ArchiveRecord = match serde_json::from_str(&line) {
                    Ok(r) => r,
                    Err(_) => continue,
                };
                if record.user_id != user_id {
                    continue;
                }
                let haystack = record.text.to_lowercase();
                let matched = query_tokens
                    .iter()
                    .filter(|token| haystack.contains(token.as_str()))
                    .count();
                if matched == 0 {
                    continue;
                }
                ranked.push((matched, idx, record.into_memory()));
            }
            Ok(ranked)
        })
        .await??;

        // last-write-wins per id: a superseding append later in the file
        // shadows earlier rows with the same id.
        let mut by_id: BTreeMap<String, (usize, usize, Memory)> = BTreeMap::new();
        for (matched, idx, memory) in ranked.drain(..) {
            by_id
                .entry(memory.id.clone())
                .and_modify(|existing| {
                    if idx > existing.1 {
                        *existing = (matched, idx, memory.clone());
                    }
                })
                .or_insert((matched, idx, memory));
        }

        let mut results: Vec<_> = by_id.into_values().collect();
        results.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        Ok(results
            .into_iter()
            .take(limit)
            .map(|(_, _, memory)| memory)
            .collect())
    }

    pub async fn get(&self, id: &str) -> Result<Option<Memory>> {
        let path = self.path.clone();
        let id = id.to_string();
        task::spawn_blocking(move || -> Result<Option<Memory>> {
            let file = File::open(&path)?;
            let reader = BufReader::new(file);
            let mut found: Option<Memory> = None;
            for line in reader.lines() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                let record: ArchiveRecord = match serde_json::from_str(&line) {
                    Ok(r) => r,
                    Err(_) => continue,
                };
                if record.id == id {
                    found = Some(record.into_memory());
                }
            }
            Ok(found)
        })
        .await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn memory(id: &str, text: &str) -> Memory {
        let now = now_ms();
        Memory {
            id: id.to_string(),
            text: text.to_string(),
            user_id: "u1".to_string(),
            run_id: None,
            score: None,
            categories: vec![],
            metadata: BTreeMap::new(),
            created_at: now,
            updated_at: now,
            source_tier: SourceTier::Archive,
        }
    }

    #[tokio::test]
    async fn append_and_line_count_tracks_writes() {
        let dir = tempfile::tempdir().unwrap();
        let archive = Archive::open(&dir.path().join("mem0-archive.jsonl")).unwrap();
        assert_eq!(archive.line_count().await.unwrap(), 0);
        archive.append(memory("m1", "likes rust")).await.unwrap();
        assert_eq!(archive.line_count().await.unwrap(), 1);
        archive.append(memory("m2", "likes go")).await.unwrap();
        assert_eq!(archive.line_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn search_ranks_by_distinct_token_overlap() {
        let dir = tempfile::tempdir().unwrap();
        let archive = Archive::open(&dir.path().join("mem0-archive.jsonl")).unwrap();
        archive
            .append(memory("m1", "user prefers dark mode editors"))
            .await
            .unwrap();
        archive
            .append(memory("m2", "user prefers dark roast coffee"))
            .await
            .unwrap();
        archive
            .append(memory("m3", "weather is sunny today"))
            .await
            .unwrap();

        let results = archive.search("u1", "dark mode coffee", 10).await.unwrap();
        assert_eq!(results.len(), 2);
        // m1 matches {dark, mode} = 2 tokens, m2 matches {dark, coffee} = 2
        // as well; file order (m1 appended first) breaks the tie.
        assert_eq!(results[0].id, "m1");
        assert_eq!(results[1].id, "m2");
    }

    #[tokio::test]
    async fn search_respects_user_and_run_scope() {
        let dir = tempfile::tempdir().unwrap();
        let archive = Archive::open(&dir.path().join("mem0-archive.jsonl")).unwrap();
        let mut other_user = memory("m1", "shared keyword apple");
        other_user.user_id = "u2".to_string();
        archive.append(other_user).await.unwrap();
        archive.append(memory("m2", "shared keyword apple")).await.unwrap();

        let results = archive.search("u1", "apple", 10).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "m2");
    }

    #[tokio::test]
    async fn later_append_shadows_earlier_row_with_same_id() {
        let dir = tempfile::tempdir().unwrap();
        let archive = Archive::open(&dir.path().join("mem0-archive.jsonl")).unwrap();
        archive.append(memory("m1", "old fact about rust")).await.unwrap();
        archive.append(memory("m1", "updated fact about rust")).await.unwrap();

        let found = archive.get("m1").await.unwrap().unwrap();
        assert_eq!(found.text, "updated fact about rust");
    }
}
