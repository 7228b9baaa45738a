//! crates/mnemo/src/utils/mod.rs
//! Shared utility functions used across the codebase

pub mod json;

use std::path::Path;

/// Convert a Path to an owned String, replacing invalid UTF-8 with U+FFFD.
pub fn path_to_string(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

/// Current time as Unix milliseconds, the timestamp unit used throughout
/// the memory data model.
pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
