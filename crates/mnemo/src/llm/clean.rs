// crates/mnemo/src/llm/clean.rs
// Reasoning-token noise stripping for providers that leak chain-of-thought
// into otherwise-JSON completions.

use crate::utils::json::parse_json_hardened;
use serde::de::DeserializeOwned;

/// Strip `<think>...</think>`, ```` ```thinking ... ``` ````, and
/// `<|begin_of_thought|>...<|end_of_thought|>` blocks from a raw completion.
/// Unterminated blocks are stripped to end-of-string rather than left in
/// place, since a truncated response is still reasoning noise.
pub fn strip_reasoning_noise(input: &str) -> String {
    let mut s = input.to_string();
    s = strip_between(&s, "<think>", "</think>");
    s = strip_between(&s, "```thinking", "```");
    s = strip_between(&s, "<|begin_of_thought|>", "<|end_of_thought|>");
    s.trim().to_string()
}

fn strip_between(input: &str, open: &str, close: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    loop {
        match rest.find(open) {
            Some(start) => {
                out.push_str(&rest[..start]);
                let after_open = &rest[start + open.len()..];
                match after_open.find(close) {
                    Some(end) => {
                        rest = &after_open[end + close.len()..];
                    }
                    None => {
                        // Unterminated block: drop the remainder entirely.
                        rest = "";
                        break;
                    }
                }
            }
            None => {
                out.push_str(rest);
                break;
            }
        }
    }
    out
}

/// Clean a raw completion and parse it as JSON: on empty or unparsable
/// output, return the literal `"{}"` rather than raise.
pub fn clean_json_or_empty(raw: &str) -> String {
    let cleaned = strip_reasoning_noise(raw);
    if cleaned.is_empty() {
        return "{}".to_string();
    }
    match parse_json_hardened::<serde_json::Value>(&cleaned) {
        Ok(_) => cleaned,
        Err(_) => "{}".to_string(),
    }
}

/// Convenience: clean, then deserialize into `T`, falling back to `T`'s
/// `Default` impl semantics via an empty-object parse when cleaning yields
/// `"{}"` and `T` can be built from it (callers needing strict shapes should
/// use `parse_json_hardened` directly instead).
pub fn clean_and_parse<T: DeserializeOwned>(raw: &str) -> Result<T, String> {
    let cleaned = clean_json_or_empty(raw);
    parse_json_hardened(&cleaned)
}
