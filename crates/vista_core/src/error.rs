//! Error types for the view layer.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for view operations.
pub type ViewResult<T> = Result<T, ViewError>;

/// Errors that can occur while locating, compiling or rendering views.
#[derive(Error, Debug)]
pub enum ViewError {
    #[error("View [{0}] not found.")]
    NotFound(String),

    #[error("Invalid view name: {0}")]
    InvalidName(String),

    #[error("Compile error in {path} on line {line}: {message}")]
    Compile {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Error rendering view [{view}]: {message}")]
    Render { view: String, message: String },

    #[error("Invalid view data: {0}")]
    InvalidData(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl ViewError {
    /// Shorthand for a [`ViewError::Render`] raised while evaluating `view`.
    pub fn render(view: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Render {
            view: view.into(),
            message: message.into(),
        }
    }

    /// Whether this error means the requested view does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
