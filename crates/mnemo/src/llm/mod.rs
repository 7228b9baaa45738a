// crates/mnemo/src/llm/mod.rs
// LanguageModel contract and a tagged-variant provider design: each backend
// normalizes its own wire format behind one shared trait.

mod anthropic;
pub mod clean;
mod factory;
mod gemini;
mod minimax;
mod ollama;
mod openai_compat;

pub use factory::from_api_keys;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One turn of a chat-completion conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Per-call generation options.
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    pub json_mode: bool,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl GenerateOptions {
    pub fn json() -> Self {
        Self {
            json_mode: true,
            ..Default::default()
        }
    }

    pub fn with_temperature(mut self, t: f32) -> Self {
        self.temperature = Some(t);
        self
    }

    pub fn with_max_tokens(mut self, n: u32) -> Self {
        self.max_tokens = Some(n);
        self
    }
}

/// Chat completion with optional JSON-object mode.
///
/// When `opts.json_mode` is set and the backend lacks native structured
/// output, implementations must append an explicit JSON-only instruction to
/// the last user message, strip chain-of-thought noise from the raw
/// completion, and return the literal `"{}"` rather than raising on empty or
/// unparsable output.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, messages: Vec<Message>, opts: GenerateOptions) -> Result<String>;

    /// Whether this provider accepts a native JSON-object response format.
    fn supports_native_json_mode(&self) -> bool {
        false
    }
}

/// Append an explicit "reply with JSON only" instruction to the last user
/// message, or to a new trailing user message if none exists. Used by every
/// provider that lacks native structured output.
pub(crate) fn append_json_instruction(mut messages: Vec<Message>) -> Vec<Message> {
    const INSTRUCTION: &str =
        "\n\nRespond with a single JSON object only. No prose, no markdown code fences.";
    if let Some(last_user) = messages.iter_mut().rev().find(|m| m.role == "user") {
        last_user.content.push_str(INSTRUCTION);
    } else {
        messages.push(Message::user(INSTRUCTION.trim_start()));
    }
    messages
}
