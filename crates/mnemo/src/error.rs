// crates/mnemo/src/error.rs
// Crate-wide error type for mnemo.

use thiserror::Error;

/// Main error type for the mnemo library.
#[derive(Error, Debug)]
pub enum MnemoError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("embedder unavailable: {0}")]
    EmbedderUnavailable(String),

    #[error("language model error: {0}")]
    LanguageModel(String),

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("connection pool error: {0}")]
    Pool(String),

    #[error("archive error: {0}")]
    Archive(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("operation timed out: {0}")]
    Timeout(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unknown error: {0}")]
    Other(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Convenience type alias for Result using MnemoError.
pub type Result<T> = std::result::Result<T, MnemoError>;

impl MnemoError {
    /// Convert to a user-facing string for MCP tool boundaries.
    pub fn to_user_string(&self) -> String {
        self.to_string()
    }
}

impl From<String> for MnemoError {
    fn from(s: String) -> Self {
        MnemoError::Other(s)
    }
}

impl From<tokio::task::JoinError> for MnemoError {
    fn from(err: tokio::task::JoinError) -> Self {
        MnemoError::Other(format!("task join error: {err}"))
    }
}

impl From<deadpool_sqlite::PoolError> for MnemoError {
    fn from(err: deadpool_sqlite::PoolError) -> Self {
        MnemoError::Pool(err.to_string())
    }
}

impl From<deadpool_sqlite::InteractError> for MnemoError {
    fn from(err: deadpool_sqlite::InteractError) -> Self {
        MnemoError::Pool(err.to_string())
    }
}

impl From<MnemoError> for String {
    fn from(err: MnemoError) -> Self {
        err.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_user_string_matches_display() {
        let e = MnemoError::NotFound("memory m1".into());
        assert_eq!(e.to_user_string(), "not found: memory m1");
    }

    #[test]
    fn string_conversion_wraps_other() {
        let e: MnemoError = "boom".to_string().into();
        assert!(matches!(e, MnemoError::Other(ref s) if s == "boom"));
    }
}
