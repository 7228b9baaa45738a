// crates/mnemo/src/llm/anthropic.rs
// Anthropic Messages API backend. No native JSON-object mode; relies on the
// shared instruction-append + reasoning-noise-strip pipeline.

use super::clean::clean_json_or_empty;
use super::clean::strip_reasoning_noise;
use super::{GenerateOptions, LanguageModel, Message, append_json_instruction};
use crate::error::{MnemoError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const TIMEOUT_SECS: u64 = 60;
const DEFAULT_MAX_TOKENS: u32 = 1024;

pub struct AnthropicLanguageModel {
    api_key: String,
    model: String,
    http: reqwest::Client,
}

impl AnthropicLanguageModel {
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
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

#[async_trait]
impl LanguageModel for AnthropicLanguageModel {
    async fn generate(&self, mut messages: Vec<Message>, opts: GenerateOptions) -> Result<String> {
        if opts.json_mode {
            messages = append_json_instruction(messages);
        }

        let system = messages
            .iter()
            .find(|m| m.role == "system")
            .map(|m| m.content.as_str());
        let wire_messages = messages
            .iter()
            .filter(|m| m.role != "system")
            .map(|m| WireMessage {
                role: m.role.clone(),
                content: m.content.clone(),
            })
            .collect();

        let body = MessagesRequest {
            model: &self.model,
            max_tokens: opts.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            system,
            messages: wire_messages,
            temperature: opts.temperature,
        };

        let resp = self
            .http
            .post(API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
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

        let parsed: MessagesResponse = resp
            .json()
            .await
            .map_err(|e| MnemoError::LanguageModel(format!("malformed response: {e}")))?;

        let raw: String = parsed.content.into_iter().map(|b| b.text).collect();

        if opts.json_mode {
            Ok(clean_json_or_empty(&raw))
        } else {
            Ok(strip_reasoning_noise(&raw))
        }
    }
}
