use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("storage error at {path}: {message}")]
    Storage { path: PathBuf, message: String },

    #[error("config error: {0}")]
    Config(String),
}

impl RelayError {
    pub fn storage(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Storage {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// GraphQL answers 401/403 once the access token lapsed before a refresh.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::Upstream(msg) if msg.starts_with("401") || msg.starts_with("403"))
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;
