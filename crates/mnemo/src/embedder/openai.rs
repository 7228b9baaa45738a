// crates/mnemo/src/embedder/openai.rs
// OpenAI-compatible embeddings backend (text-embedding-3-small by default).

use super::{Embedder, l2_normalize};
use crate::error::{MnemoError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_MODEL: &str = "text-embedding-3-small";
const DEFAULT_DIMENSION: usize = 1536;
const API_URL: &str = "https://api.openai.com/v1/embeddings";
const TIMEOUT_SECS: u64 = 30;

pub struct OpenAiEmbedder {
    api_key: String,
    model: String,
    dimension: usize,
    http: reqwest::Client,
}

impl OpenAiEmbedder {
    pub fn new(api_key: String) -> Self {
        Self::with_model(api_key, DEFAULT_MODEL.to_string(), DEFAULT_DIMENSION)
    }

    pub fn with_model(api_key: String, model: String, dimension: usize) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            api_key,
            model,
            dimension,
            http,
        }
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
    index: usize,
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut out = self.embed_batch(std::slice::from_ref(&text.to_string())).await?;
        out.pop()
            .ok_or_else(|| MnemoError::EmbedderUnavailable("empty embedding response".into()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let body = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };
        let resp = self
            .http
            .post(API_URL)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| MnemoError::EmbedderUnavailable(format!("request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            let preview: String = body.chars().take(240).collect();
            return Err(MnemoError::EmbedderUnavailable(format!(
                "openai embeddings returned {status}: {preview}"
            )));
        }

        let parsed: EmbeddingResponse = resp
            .json()
            .await
            .map_err(|e| MnemoError::EmbedderUnavailable(format!("malformed response: {e}")))?;

        let mut ordered: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        for datum in parsed.data {
            if let Some(slot) = ordered.get_mut(datum.index) {
                *slot = Some(datum.embedding);
            }
        }

        ordered
            .into_iter()
            .map(|v| {
                let mut v = v.ok_or_else(|| {
                    MnemoError::EmbedderUnavailable("response missing an embedding".into())
                })?;
                l2_normalize(&mut v);
                Ok(v)
            })
            .collect()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
