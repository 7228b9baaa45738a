// crates/mnemo/src/mcp/tools.rs
// Implementations behind each #[tool] in mcp/mod.rs: plain-text preview
// responses, truncating long memory text to 100 characters for previews.

use super::{
    MemoryForgetRequest, MemoryGetRequest, MemoryListRequest, MemorySearchRequest,
    MemoryStoreRequest, MnemoServer,
};
use crate::recall::{RecallQuery, SearchScope};
use mnemo_types::{Memory, SourceTier};
use serde::Serialize;

const PREVIEW_CHARS: usize = 100;

fn preview(text: &str) -> String {
    let mut chars = text.chars();
    let truncated: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{truncated}...")
    } else {
        truncated
    }
}

fn parse_scope(scope: Option<&str>) -> SearchScope {
    match scope {
        Some("session") => SearchScope::Session,
        Some("long_term") => SearchScope::LongTerm,
        _ => SearchScope::All,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub text: String,
    pub score: Option<f32>,
    pub source_tier: SourceTier,
}

impl From<&Memory> for SearchHit {
    fn from(m: &Memory) -> Self {
        Self {
            id: m.id.clone(),
            text: m.text.clone(),
            score: m.score,
            source_tier: m.source_tier,
        }
    }
}

fn format_hits(hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return "No memories found.".to_string();
    }
    let mut out = format!("{} results:\n", hits.len());
    for hit in hits {
        let score_text = hit
            .score
            .map(|s| format!("{s:.2}"))
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!(
            "  [{}] (score: {}, tier: {:?}) {}\n",
            hit.id,
            score_text,
            hit.source_tier,
            preview(&hit.text)
        ));
    }
    out
}

pub async fn memory_search(server: &MnemoServer, req: MemorySearchRequest) -> Result<String, String> {
    let lifecycle = &server.lifecycle;
    let config = lifecycle.config();
    let limit = req.limit.unwrap_or(config.top_k).clamp(1, 50);

    let memories = lifecycle
        .recall()
        .search(
            RecallQuery {
                query: req.query,
                user_id: req.user_id.unwrap_or_else(|| config.user_id.clone()),
                session_id: None,
                scope: parse_scope(req.scope.as_deref()),
                limit,
                deep: req.deep.unwrap_or(false),
            },
            config.search_threshold,
        )
        .await
        .map_err(|e| e.to_user_string())?;

    let hits: Vec<SearchHit> = memories.iter().map(SearchHit::from).collect();
    Ok(format_hits(&hits))
}

pub async fn memory_store(server: &MnemoServer, req: MemoryStoreRequest) -> Result<String, String> {
    if req.text.trim().is_empty() {
        return Err("text must not be empty".to_string());
    }
    let lifecycle = &server.lifecycle;
    let run_id = if req.long_term {
        None
    } else {
        Some(
            req.user_id
                .clone()
                .unwrap_or_else(|| lifecycle.config().user_id.clone()),
        )
    };
    let outcome = lifecycle
        .ingest_now(&req.text, run_id)
        .await
        .map_err(|e| e.to_user_string())?;

    let mut response = format!("stored_count: {}\n", outcome.results.len());
    for result in &outcome.results {
        response.push_str(&format!("  [{}] {:?}: {}\n", result.id, result.event, preview(&result.text)));
    }
    Ok(response)
}

pub async fn memory_get(server: &MnemoServer, req: MemoryGetRequest) -> Result<String, String> {
    let lifecycle = &server.lifecycle;
    if let Some(memory) = lifecycle
        .store()
        .get(&req.id)
        .await
        .map_err(|e| e.to_user_string())?
    {
        return Ok(format!("[{}] {}", memory.id, memory.text));
    }
    if let Some(memory) = lifecycle
        .archive()
        .get(&req.id)
        .await
        .map_err(|e| e.to_user_string())?
    {
        return Ok(format!("[{}] {} (archived)", memory.id, memory.text));
    }
    Ok(format!("Memory {} not found.", req.id))
}

pub async fn memory_list(server: &MnemoServer, req: MemoryListRequest) -> Result<String, String> {
    let lifecycle = &server.lifecycle;
    let config = lifecycle.config();
    let user_id = req.user_id.unwrap_or_else(|| config.user_id.clone());
    let limit = req.limit.unwrap_or(50).clamp(1, 500);

    // Scope has no "all runs" wildcard; without a session id to scope to,
    // `memory_list` always lists the user's long-term memories.
    let memories = lifecycle
        .store()
        .list(crate::store::Scope { user_id, run_id: None }, limit)
        .await
        .map_err(|e| e.to_user_string())?;

    if memories.is_empty() {
        return Ok("No memories found.".to_string());
    }
    let mut response = format!("{} memories:\n", memories.len());
    for memory in memories {
        response.push_str(&format!("  [{}] {}\n", memory.id, preview(&memory.text)));
    }
    Ok(response)
}

#[derive(Debug, Clone, Serialize)]
pub struct ForgetOutcome {
    pub deleted: Vec<String>,
    pub failed: Vec<String>,
}

pub async fn memory_forget(server: &MnemoServer, req: MemoryForgetRequest) -> Result<String, String> {
    let lifecycle = &server.lifecycle;
    let config = lifecycle.config();

    if let Some(id) = req.id {
        let deleted = lifecycle.forget(&id).await.map_err(|e| e.to_user_string())?;
        return Ok(if deleted {
            format!("Memory {id} deleted.")
        } else {
            format!("Memory {id} not found.")
        });
    }

    let Some(query) = req.query else {
        return Err("either id or query must be provided".to_string());
    };
    let limit = req.limit.unwrap_or(10).clamp(1, 50);
    let user_id = req.user_id.unwrap_or_else(|| config.user_id.clone());

    let results = lifecycle
        .recall()
        .search(
            RecallQuery {
                query: query.clone(),
                user_id,
                session_id: None,
                scope: parse_scope(req.scope.as_deref()),
                limit,
                deep: false,
            },
            config.search_threshold,
        )
        .await
        .map_err(|e| e.to_user_string())?;

    let exact: Vec<&Memory> = results
        .iter()
        .filter(|m| m.text.eq_ignore_ascii_case(&query))
        .collect();
    let candidates: Vec<&Memory> = if exact.is_empty() {
        results.iter().collect()
    } else {
        exact
    };

    if candidates.is_empty() {
        return Ok("No matching memories found.".to_string());
    }

    if req.delete_all {
        let mut outcome = ForgetOutcome {
            deleted: Vec::new(),
            failed: Vec::new(),
        };
        for memory in &candidates {
            match lifecycle.forget(&memory.id).await {
                Ok(true) => outcome.deleted.push(memory.id.clone()),
                _ => outcome.failed.push(memory.id.clone()),
            }
        }
        return Ok(format!(
            "deleted {} of {} candidates ({} failed)",
            outcome.deleted.len(),
            candidates.len(),
            outcome.failed.len()
        ));
    }

    if candidates.len() == 1 {
        let id = candidates[0].id.clone();
        lifecycle.forget(&id).await.map_err(|e| e.to_user_string())?;
        return Ok(format!("Memory {id} deleted."));
    }

    let hits: Vec<SearchHit> = candidates.iter().map(|m| SearchHit::from(*m)).collect();
    Ok(format!(
        "{} matching memories, specify an id to delete one:\n{}",
        candidates.len(),
        format_hits(&hits)
    ))
}

pub async fn memory_stats(server: &MnemoServer) -> Result<String, String> {
    let snapshot = server
        .lifecycle
        .stats_snapshot()
        .await
        .map_err(|e| e.to_user_string())?;
    Ok(format!(
        "total_memories: {}\nhot_size_bytes: {}\narchive_size_bytes: {}\nwrite_queue: {{ total_writes: {}, queue_max: {}, current_queue: {} }}\nlast_updated: {}",
        snapshot.total_memories,
        snapshot.hot_size_bytes,
        snapshot.archive_size_bytes,
        snapshot.write_queue.total_writes,
        snapshot.write_queue.queue_max,
        snapshot.write_queue.current_queue,
        snapshot.last_updated,
    ))
}
