use std::path::PathBuf;

use thiserror::Error;
use tracing::{error, warn};

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {message}")]
    Config { message: String },

    #[error("authentication failed: {message}")]
    Auth { message: String },

    #[error("not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("config file error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl AppError {
    pub fn config(message: impl Into<String>) -> Self {
        let message = message.into();
        error!(target: "app::config", %message, "configuration error");
        AppError::Config { message }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        let message = message.into();
        warn!(target: "app::auth", %message, "authentication error");
        AppError::Auth { message }
    }

    pub fn not_found(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        warn!(target: "app::store", path = %path.display(), "file not found");
        AppError::NotFound { path }
    }

    pub fn other(message: impl Into<String>) -> Self {
        let message = message.into();
        error!(target: "app::other", %message, "other error");
        AppError::Other(message)
    }

    pub fn is_config(&self) -> bool {
        matches!(self, AppError::Config { .. })
    }
}
