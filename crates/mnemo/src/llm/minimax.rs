// crates/mnemo/src/llm/minimax.rs
// MiniMax backend. Wire format is OpenAI-compatible; this module only fixes
// the endpoint and default model so the tagged-variant normalization pass
// doesn't leak MiniMax-specific URLs into the generic backend.

use super::openai_compat::OpenAiCompatible;
use super::{GenerateOptions, LanguageModel, Message};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;

const BASE_URL: &str = "https://api.minimax.chat/v1";
const DEFAULT_MODEL: &str = "abab6.5s-chat";

pub struct MiniMaxLanguageModel {
    inner: OpenAiCompatible,
}

impl MiniMaxLanguageModel {
    pub fn new(api_key: String, model: Option<String>) -> Self {
        Self {
            inner: OpenAiCompatible::new(
                BASE_URL.to_string(),
                api_key,
                model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
                HashMap::new(),
                false,
            ),
        }
    }
}

#[async_trait]
impl LanguageModel for MiniMaxLanguageModel {
    async fn generate(&self, messages: Vec<Message>, opts: GenerateOptions) -> Result<String> {
        self.inner.generate(messages, opts).await
    }
}
