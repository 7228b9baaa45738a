// crates/mnemo/src/llm/ollama.rs
// Local Ollama chat-completions backend.

use super::clean::clean_json_or_empty;
use super::clean::strip_reasoning_noise;
use super::{GenerateOptions, LanguageModel, Message, append_json_instruction};
use crate::error::{MnemoError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const TIMEOUT_SECS: u64 = 60;

pub struct OllamaLanguageModel {
    url: String,
    model: String,
    http: reqwest::Client,
}

impl OllamaLanguageModel {
    pub fn new(url: String, model: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            url: url.trim_end_matches('/').to_string(),
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
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<ChatOptions>,
}

#[derive(Serialize)]
struct ChatOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

#[async_trait]
impl LanguageModel for OllamaLanguageModel {
    async fn generate(&self, mut messages: Vec<Message>, opts: GenerateOptions) -> Result<String> {
        if opts.json_mode {
            messages = append_json_instruction(messages);
        }
        let wire_messages = messages
            .into_iter()
            .map(|m| WireMessage {
                role: m.role,
                content: m.content,
            })
            .collect();

        let options = if opts.temperature.is_some() || opts.max_tokens.is_some() {
            Some(ChatOptions {
                temperature: opts.temperature,
                num_predict: opts.max_tokens,
            })
        } else {
            None
        };

        let body = ChatRequest {
            model: &self.model,
            messages: wire_messages,
            stream: false,
            options,
        };

        let url = format!("{}/api/chat", self.url);
        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| MnemoError::LanguageModel(format!("ollama unreachable: {e}")))?;

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

        if opts.json_mode {
            Ok(clean_json_or_empty(&parsed.message.content))
        } else {
            Ok(strip_reasoning_noise(&parsed.message.content))
        }
    }
}
