//! Hardened JSON parsing utilities for extracting structured data from LLM output.

use serde::de::DeserializeOwned;

/// Parse JSON from LLM output with multiple fallback strategies.
///
/// Tries in order:
/// 1. Direct parse of trimmed content
/// 2. Strip markdown code fences, then parse
/// 3. Extract first `{...}` or `[...]` block, then parse
pub fn parse_json_hardened<T: DeserializeOwned>(content: &str) -> Result<T, String> {
    let trimmed = content.trim();

    // 1. Try direct parse
    if let Ok(v) = serde_json::from_str::<T>(trimmed) {
        return Ok(v);
    }

    // 2. Try stripping markdown code fences
    let stripped = strip_code_fences(trimmed);
    if stripped != trimmed
        && let Ok(v) = serde_json::from_str::<T>(stripped) {
            return Ok(v);
        }

    // 3. Try extracting first JSON object/array
    if let Some(extracted) = extract_json_block(trimmed)
        && let Ok(v) = serde_json::from_str::<T>(extracted) {
            return Ok(v);
        }

    Err(format!(
        "Failed to parse JSON from LLM output (tried direct, fence-strip, brace-extract). Content start: {}",
        &trimmed[..trimmed.len().min(200)]
    ))
}

/// Strip markdown code fences from a string.
pub(crate) fn strip_code_fences(s: &str) -> &str {
    let trimmed = s.trim();

    // Try ```json ... ```
    if let Some(rest) = trimmed.strip_prefix("```json")
        && let Some(json) = rest.strip_suffix("```") {
            return json.trim();
        }
    // Try ``` ... ```
    if let Some(rest) = trimmed.strip_prefix("```")
        && let Some(json) = rest.strip_suffix("```") {
            return json.trim();
        }

    trimmed
}

/// Extract the first balanced `{...}` or `[...]` block from a string.
pub(crate) fn extract_json_block(s: &str) -> Option<&str> {
    // Find the first `{` or `[`
    let (open_char, close_char, start) = {
        let brace_pos = s.find('{');
        let bracket_pos = s.find('[');

        match (brace_pos, bracket_pos) {
            (Some(b), Some(k)) if b < k => ('{', '}', b),
            (Some(_), Some(k)) => ('[', ']', k),
            (Some(b), None) => ('{', '}', b),
            (None, Some(k)) => ('[', ']', k),
            (None, None) => return None,
        }
    };

    // Walk forward counting nesting
    let bytes = s.as_bytes();
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape_next = false;

    for i in start..bytes.len() {
        let ch = bytes[i] as char;

        if escape_next {
            escape_next = false;
            continue;
        }

        if ch == '\\' && in_string {
            escape_next = true;
            continue;
        }

        if ch == '"' {
            in_string = !in_string;
            continue;
        }

        if in_string {
            continue;
        }

        if ch == open_char {
            depth += 1;
        } else if ch == close_char {
            depth -= 1;
            if depth == 0 {
                return Some(&s[start..=i]);
            }
        }
    }

    None
}
