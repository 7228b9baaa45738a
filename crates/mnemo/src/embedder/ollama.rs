// crates/mnemo/src/embedder/ollama.rs
// Local Ollama embeddings backend.

use super::{Embedder, l2_normalize};
use crate::error::{MnemoError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_MODEL: &str = "nomic-embed-text";
const DEFAULT_DIMENSION: usize = 768;
const TIMEOUT_SECS: u64 = 30;

pub struct OllamaEmbedder {
    host: String,
    model: String,
    dimension: usize,
    http: reqwest::Client,
}

impl OllamaEmbedder {
    pub fn new(host: String) -> Self {
        Self::with_model(host, DEFAULT_MODEL.to_string(), DEFAULT_DIMENSION)
    }

    pub fn with_model(host: String, model: String, dimension: usize) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            host: host.trim_end_matches('/').to_string(),
            model,
            dimension,
            http,
        }
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.host);
        let body = EmbedRequest {
            model: &self.model,
            prompt: text,
        };
        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| MnemoError::EmbedderUnavailable(format!("ollama unreachable: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            let preview: String = body.chars().take(240).collect();
            return Err(MnemoError::EmbedderUnavailable(format!(
                "ollama returned {status}: {preview}"
            )));
        }

        let parsed: EmbedResponse = resp
            .json()
            .await
            .map_err(|e| MnemoError::EmbedderUnavailable(format!("malformed response: {e}")))?;
        let mut v = parsed.embedding;
        l2_normalize(&mut v);
        Ok(v)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
