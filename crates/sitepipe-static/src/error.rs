//! Errors raised by file transforms.

use std::fmt::Display;
use std::path::Path;

/// Errors that can occur while transforming files.
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("Failed to read {path}: {message}")]
    ReadError { path: String, message: String },

    #[error("Failed to write {path}: {message}")]
    WriteError { path: String, message: String },

    #[error("Failed to remove {path}: {message}")]
    RemoveError { path: String, message: String },

    #[error("Template error in {path}: {message}")]
    TemplateError { path: String, message: String },

    #[error("Stylesheet error in {path}: {message}")]
    StyleError { path: String, message: String },

    #[error("Script error in {path}: {message}")]
    ScriptError { path: String, message: String },

    #[error("Invalid glob pattern {pattern}: {message}")]
    PatternError { pattern: String, message: String },

    #[error("Invalid configuration: {0}")]
    ConfigError(String),
}

impl AssetError {
    pub(crate) fn read(path: &Path, err: impl Display) -> Self {
        AssetError::ReadError {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }

    pub(crate) fn write(path: &Path, err: impl Display) -> Self {
        AssetError::WriteError {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }

    pub(crate) fn remove(path: &Path, err: impl Display) -> Self {
        AssetError::RemoveError {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }

    pub(crate) fn style(path: &Path, message: impl Into<String>) -> Self {
        AssetError::StyleError {
            path: path.display().to_string(),
            message: message.into(),
        }
    }
}
