// crates/mnemo/src/context/mod.rs
// Token estimation and budget-bounded memory serialization for prompt
// injection: a per-model context-window table feeding a greedy char/token
// budget loop, with a CJK-aware token estimator.

use mnemo_types::Memory;

/// Known model context windows, longest-prefix match. Callers pass whatever
/// model id the host reports and the budget degrades to the `default`
/// entry for anything unrecognized.
const MODEL_CONTEXT_TABLE: &[(&str, u64)] = &[
    ("gpt-4-32k", 32_768),
    ("gpt-4-turbo", 128_000),
    ("gpt-4o", 128_000),
    ("gpt-4", 8_192),
    ("claude-3", 200_000),
    ("deepseek-chat", 64_000),
    ("deepseek-coder", 16_000),
    ("moonshot-v1", 32_000),
    ("qwen-max", 32_000),
    ("qwen-plus", 32_000),
    ("abab6.5s-chat", 32_000),
];
const DEFAULT_MODEL_CONTEXT: u64 = 8_192;

const WRAPPER_OVERHEAD_TOKENS: u64 = 50;
const PER_MEMORY_OVERHEAD_TOKENS: u64 = 10;

fn model_context_window(model_id: &str) -> u64 {
    MODEL_CONTEXT_TABLE
        .iter()
        .find(|(prefix, _)| model_id.starts_with(prefix))
        .map(|(_, ctx)| *ctx)
        .unwrap_or(DEFAULT_MODEL_CONTEXT)
}

/// The three `memory_token_budget_*` config knobs, bundled so callers don't
/// have to pass them as three loose arguments. Defaults match the data
/// model's `ratio=0.15`, `min=200`, `max=4000`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BudgetConfig {
    pub ratio: f64,
    pub min: u64,
    pub max: u64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            ratio: 0.15,
            min: 200,
            max: 4_000,
        }
    }
}

/// `raw = floor(model_ctx * ratio)`, clamped to `[min, max]`.
fn token_budget_for_model(model_id: &str, budget_cfg: &BudgetConfig) -> u64 {
    let ctx = model_context_window(model_id);
    let raw = (ctx as f64 * budget_cfg.ratio) as u64;
    raw.clamp(budget_cfg.min, budget_cfg.max)
}

/// `ceil(chinese_chars / 1.5 + other_chars / 4)`, where `chinese_chars`
/// counts code points in U+4E00–U+9FFF.
pub fn estimate_tokens(s: &str) -> u64 {
    let mut chinese = 0u64;
    let mut other = 0u64;
    for c in s.chars() {
        if ('\u{4E00}'..='\u{9FFF}').contains(&c) {
            chinese += 1;
        } else {
            other += 1;
        }
    }
    let raw = chinese as f64 / 1.5 + other as f64 / 4.0;
    raw.ceil() as u64
}

/// Result of [`ContextBuilder::build`], mirrored by
/// [`mnemo_types::ContextBuildResult`].
pub use mnemo_types::ContextBuildResult;

/// Builds the token-budgeted `<relevant-memories>` block injected into the
/// host's system context on `before_turn`.
pub struct ContextBuilder;

impl ContextBuilder {
    /// `memories` should already be recall-ordered; this only re-sorts by
    /// `(score desc, created_at desc)`, which is a no-op for inputs that
    /// already satisfy it.
    pub fn build(memories: &[Memory], model_id: &str) -> ContextBuildResult {
        Self::build_with_budget(memories, model_id, &BudgetConfig::default())
    }

    /// Same as [`Self::build`] but with the `memory_token_budget_*` config
    /// knobs threaded through instead of the data model's hardcoded
    /// defaults, so a host that overrides them actually changes the budget.
    pub fn build_with_budget(
        memories: &[Memory],
        model_id: &str,
        budget_cfg: &BudgetConfig,
    ) -> ContextBuildResult {
        let total = memories.len();
        if total == 0 {
            return ContextBuildResult {
                text: String::new(),
                injected_count: 0,
                total: 0,
                estimated_tokens: 0,
                truncated: false,
            };
        }

        let budget = token_budget_for_model(model_id, budget_cfg);

        let mut ordered: Vec<&Memory> = memories.iter().collect();
        ordered.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });

        let mut selected: Vec<String> = Vec::new();
        let mut used = WRAPPER_OVERHEAD_TOKENS;

        for memory in &ordered {
            let mem_tokens = estimate_tokens(&memory.text) + PER_MEMORY_OVERHEAD_TOKENS;
            if used + mem_tokens > budget {
                break;
            }
            used += mem_tokens;
            selected.push(memory.text.clone());
        }

        // Special case: nothing fit and the single highest-ranked memory
        // alone exceeds the budget — include a truncated copy rather than
        // inject nothing.
        if selected.is_empty() {
            let first = ordered[0];
            let max_chars = 2 * budget.saturating_sub(70) as usize;
            let truncated_text: String = first.text.chars().take(max_chars).collect();
            selected.push(format!("{truncated_text}..."));
            used = budget;
        }

        let injected_count = selected.len();
        let text = format_block(&selected);
        let estimated_tokens = if injected_count == 1 && total == 1 && used == budget {
            budget
        } else {
            used
        };

        ContextBuildResult {
            text,
            injected_count,
            total,
            estimated_tokens,
            truncated: injected_count < total,
        }
    }
}

fn format_block(items: &[String]) -> String {
    let mut out = String::from("<relevant-memories>\n");
    for (i, item) in items.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", i + 1, item));
    }
    out.push_str("</relevant-memories>");
    out
}
