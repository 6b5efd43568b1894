//! Error types for machine-keys

use std::path::PathBuf;

use thiserror::Error;

use crate::keys::{KeyId, KeyKind};

/// Main error type for key lifecycle operations
#[derive(Error, Debug)]
pub enum KeyError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("{kind} key titled '{title}' is already registered; generate a new key instead of renaming it")]
    Conflict { kind: KeyKind, title: String },

    #[error("Key {id} not found on the remote account")]
    NotFound { id: KeyId },

    #[error("{context}: {message}")]
    Remote { context: String, message: String },

    #[error("Key generation failed: {0}")]
    Generation(String),

    #[error("Confirmation prompt failed: {0}")]
    Prompt(String),

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl KeyError {
    pub fn remote(context: impl Into<String>, message: impl std::fmt::Display) -> Self {
        KeyError::Remote {
            context: context.into(),
            message: message.to_string(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        KeyError::Io {
            path: path.into(),
            source,
        }
    }

    /// Deleting a key that is already gone is not a failure
    pub fn is_not_found(&self) -> bool {
        matches!(self, KeyError::NotFound { .. })
    }
}

/// Result type alias for key lifecycle operations
pub type Result<T> = std::result::Result<T, KeyError>;
