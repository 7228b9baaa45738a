// crates/mnemo/src/llm/gemini.rs
// Google Gemini generateContent backend.

use super::clean::clean_json_or_empty;
use super::clean::strip_reasoning_noise;
use super::{GenerateOptions, LanguageModel, Message, append_json_instruction};
use crate::error::{MnemoError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const TIMEOUT_SECS: u64 = 60;

pub struct GeminiLanguageModel {
    api_key: String,
    model: String,
    http: reqwest::Client,
}

impl GeminiLanguageModel {
    pub fn new(api_key: String, model: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            api_key,
            model,
            http,
        }
    }
}

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Serialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
}

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

#[async_trait]
impl LanguageModel for GeminiLanguageModel {
    // Native JSON mode exists via response_mime_type, but Gemini still
    // occasionally wraps output in reasoning commentary on `-thinking`
    // model variants, so we still run it through the cleaning pipeline.
    async fn generate(&self, mut messages: Vec<Message>, opts: GenerateOptions) -> Result<String> {
        if opts.json_mode {
            messages = append_json_instruction(messages);
        }

        let contents = messages
            .into_iter()
            .filter(|m| m.role != "system")
            .map(|m| Content {
                role: if m.role == "assistant" {
                    "model".to_string()
                } else {
                    "user".to_string()
                },
                parts: vec![Part { text: m.content }],
            })
            .collect();

        let body = GenerateRequest {
            contents,
            generation_config: GenerationConfig {
                temperature: opts.temperature,
                max_output_tokens: opts.max_tokens,
                response_mime_type: opts.json_mode.then(|| "application/json".to_string()),
            },
        };

        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            self.model, self.api_key
        );

        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| MnemoError::LanguageModel(format!("request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            let preview: String = body.chars().take(240).collect();
            return Err(MnemoError::LanguageModel(format!(
                "status={status} body={preview}"
            )));
        }

        let parsed: GenerateResponse = resp
            .json()
            .await
            .map_err(|e| MnemoError::LanguageModel(format!("malformed response: {e}")))?;

        let raw: String = parsed
            .candidates
            .into_iter()
            .next()
            .map(|c| c.content.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();

        if opts.json_mode {
            Ok(clean_json_or_empty(&raw))
        } else {
            Ok(strip_reasoning_noise(&raw))
        }
    }
}
