use std::{io, path::PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store input must be a JSON object, got {0}")]
    InvalidInput(&'static str),

    /// `resolved` is the longest prefix of `path` that did resolve.
    #[error("attribute `{path}` not found (resolved up to `{resolved}`)")]
    KeyNotFound { path: String, resolved: String },

    #[error("attribute `{path}` is a {found}, expected {expected}")]
    TypeMismatch {
        path: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("failed to parse {path:?} as JSON")]
    Deserialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to access {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StoreError {
    pub(crate) fn not_found(path: &str, resolved: &[&str]) -> Self {
        StoreError::KeyNotFound {
            path: path.to_string(),
            resolved: resolved.join("."),
        }
    }
}
