// crates/mnemo/src/embedder/mod.rs
// Embedder contract: text -> unit-norm vector of fixed dimension D.

mod ollama;
mod openai;

pub use ollama::OllamaEmbedder;
pub use openai::OpenAiEmbedder;

use crate::config::ApiKeys;
use crate::error::{MnemoError, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Maps text to a unit-norm vector of fixed dimension `D`.
///
/// Implementations may pool a single extractor and serialize access
/// internally; callers only require that `embed_batch`'s output ordering
/// matches the input ordering. Failures surface as
/// [`MnemoError::EmbedderUnavailable`] — callers must treat recall/ingest
/// as best-effort and skip the turn rather than propagate.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    /// Output vector dimension.
    fn dimension(&self) -> usize;
}

/// L2-normalize a vector in place. A zero vector is left unchanged (embedders
/// should never produce one, but a defensive caller should not divide by zero).
pub fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// `true` if `v`'s L2-norm lies within `eps` of 1.0, the invariant every
/// stored embedding must satisfy.
pub fn is_unit_norm(v: &[f32], eps: f32) -> bool {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    (norm - 1.0).abs() <= eps
}

/// Build an [`Embedder`] from resolved provider credentials.
///
/// OpenAI (hosted, highest quality) is preferred before Ollama (local, no
/// key required). Returns
/// `None` when no provider is configured; callers must treat this the same
/// as an `EmbedderUnavailable` failure and skip embedding-dependent work.
pub fn from_api_keys(api_keys: &ApiKeys) -> Option<Arc<dyn Embedder>> {
    if let Some(key) = api_keys.openai.as_ref() {
        return Some(Arc::new(OpenAiEmbedder::new(key.clone())));
    }
    if let Some(host) = api_keys.ollama_host.as_ref() {
        return Some(Arc::new(OllamaEmbedder::new(host.clone())));
    }
    None
}

/// Fixed column width for `HotStore`'s vector table when no embedding
/// provider is configured. Every CLI subcommand and `Lifecycle::start` that
/// opens `HotStore` directly must agree on this so repeated invocations
/// against the same data directory never hit a dimension mismatch.
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 1536;

/// The dimension `HotStore` should be opened with: the configured
/// provider's, or [`DEFAULT_EMBEDDING_DIMENSION`] when none is configured
/// (nothing will ever be embedded against it, so the exact value is
/// immaterial in that case).
pub fn resolve_dimension(api_keys: &ApiKeys) -> usize {
    from_api_keys(api_keys)
        .map(|e| e.dimension())
        .unwrap_or(DEFAULT_EMBEDDING_DIMENSION)
}

/// Convenience for call sites that need an explicit error rather than `None`.
pub fn require(embedder: Option<Arc<dyn Embedder>>) -> Result<Arc<dyn Embedder>> {
    embedder.ok_or_else(|| {
        MnemoError::EmbedderUnavailable("no embedding provider configured".to_string())
    })
}
