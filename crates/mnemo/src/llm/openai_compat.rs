// crates/mnemo/src/llm/openai_compat.rs
// OpenAI-compatible chat-completions backend. Also backs MiniMax and any
// self-hosted gateway that speaks the same wire format.

use super::clean::strip_reasoning_noise;
use super::{GenerateOptions, LanguageModel, Message, append_json_instruction};
use crate::error::{MnemoError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

const TIMEOUT_SECS: u64 = 60;

/// Normalize a user-supplied base URL: strip a trailing `/chat/completions`
/// (callers sometimes paste the full endpoint) and drop a trailing slash.
/// The `/v1` suffix some vendors require is the caller's responsibility —
/// OpenAI-compatible gateways vary on whether it's already part of the host.
pub fn normalize_base_url(base_url: &str) -> String {
    let trimmed = base_url.trim_end_matches('/');
    trimmed
        .strip_suffix("/chat/completions")
        .unwrap_or(trimmed)
        .trim_end_matches('/')
        .to_string()
}

pub struct OpenAiCompatible {
    base_url: String,
    api_key: String,
    model: String,
    headers: HashMap<String, String>,
    json_mode_support: bool,
    http: reqwest::Client,
}

impl OpenAiCompatible {
    pub fn new(
        base_url: String,
        api_key: String,
        model: String,
        headers: HashMap<String, String>,
        json_mode_support: bool,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            base_url: normalize_base_url(&base_url),
            api_key,
            model,
            headers,
            json_mode_support,
            http,
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
}

#[derive(Serialize, Deserialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: WireMessage,
}

#[async_trait]
impl LanguageModel for OpenAiCompatible {
    fn supports_native_json_mode(&self) -> bool {
        self.json_mode_support
    }

    async fn generate(&self, mut messages: Vec<Message>, opts: GenerateOptions) -> Result<String> {
        let mut response_format = None;
        if opts.json_mode {
            if self.json_mode_support {
                response_format = Some(serde_json::json!({"type": "object"}));
            } else {
                messages = append_json_instruction(messages);
            }
        }

        let wire_messages = messages
            .into_iter()
            .map(|m| WireMessage {
                role: m.role,
                content: m.content,
            })
            .collect();

        let body = ChatRequest {
            model: &self.model,
            messages: wire_messages,
            temperature: opts.temperature,
            max_tokens: opts.max_tokens,
            response_format,
        };

        let url = format!("{}/chat/completions", self.base_url);
        let mut req = self.http.post(&url).bearer_auth(&self.api_key).json(&body);
        for (k, v) in &self.headers {
            req = req.header(k, v);
        }

        let resp = req
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

        let parsed: ChatResponse = resp
            .json()
            .await
            .map_err(|e| MnemoError::LanguageModel(format!("malformed response: {e}")))?;

        let raw = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();

        if opts.json_mode && !self.json_mode_support {
            Ok(super::clean::clean_json_or_empty(&raw))
        } else {
            Ok(strip_reasoning_noise(&raw))
        }
    }
}
