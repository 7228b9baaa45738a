// crates/mnemo/src/llm/factory.rs
// Builds a LanguageModel from resolved provider credentials against the
// tagged-variant provider design in llm/mod.rs.

use super::LanguageModel;
use super::anthropic::AnthropicLanguageModel;
use super::gemini::GeminiLanguageModel;
use super::minimax::MiniMaxLanguageModel;
use super::ollama::OllamaLanguageModel;
use super::openai_compat::OpenAiCompatible;
use crate::config::ApiKeys;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OPENAI_DEFAULT_MODEL: &str = "gpt-4o-mini";
const ANTHROPIC_DEFAULT_MODEL: &str = "claude-3-5-haiku-20241022";
const GEMINI_DEFAULT_MODEL: &str = "gemini-1.5-flash";
const OLLAMA_DEFAULT_MODEL: &str = "llama3.3";

/// Build a [`LanguageModel`] from resolved credentials.
///
/// Priority: OpenAI > Anthropic > Gemini > MiniMax > Ollama, the same
/// hosted-before-local ordering the embedder factory uses. Returns `None`
/// when no provider is configured; callers must treat this the same as a
/// non-fatal `LanguageModelError` and skip the dependent turn.
pub fn from_api_keys(api_keys: &ApiKeys) -> Option<Arc<dyn LanguageModel>> {
    if let Some(key) = api_keys.openai.as_ref() {
        info!("using OpenAI chat completions");
        return Some(Arc::new(OpenAiCompatible::new(
            OPENAI_BASE_URL.to_string(),
            key.clone(),
            OPENAI_DEFAULT_MODEL.to_string(),
            HashMap::new(),
            true,
        )));
    }
    if let Some(key) = api_keys.anthropic.as_ref() {
        info!("using Anthropic messages API");
        return Some(Arc::new(AnthropicLanguageModel::new(
            key.clone(),
            ANTHROPIC_DEFAULT_MODEL.to_string(),
        )));
    }
    if let Some(key) = api_keys.gemini.as_ref() {
        info!("using Gemini generateContent");
        return Some(Arc::new(GeminiLanguageModel::new(
            key.clone(),
            GEMINI_DEFAULT_MODEL.to_string(),
        )));
    }
    if let Some(key) = api_keys.minimax.as_ref() {
        info!("using MiniMax chat completions");
        return Some(Arc::new(MiniMaxLanguageModel::new(key.clone(), None)));
    }
    if let Some(host) = api_keys.ollama_host.as_ref() {
        info!("using local Ollama chat completions");
        return Some(Arc::new(OllamaLanguageModel::new(
            host.clone(),
            OLLAMA_DEFAULT_MODEL.to_string(),
        )));
    }
    None
}
