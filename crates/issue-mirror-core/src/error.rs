use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported embedding store schema version {found} (expected {expected})")]
    SchemaVersion { found: u32, expected: u32 },

    #[error("issue page is a JSON {found}, expected an array")]
    NotAnArray { found: &'static str },

    #[error("issue at position {position} is malformed: {reason}")]
    MalformedIssue { position: usize, reason: String },

    #[error("embedder returned {got} vectors for {expected} texts")]
    VectorCountMismatch { expected: usize, got: usize },

    #[error("embedder returned a {got}-dimensional vector, expected {expected}")]
    VectorDimsMismatch { expected: usize, got: usize },

    #[error("store holds vectors from {stored}, embedder is {configured}")]
    ModelMismatch { stored: String, configured: String },

    #[error("embedding failed: {0}")]
    Embedding(#[from] anyhow::Error),
}

impl CoreError {
    /// True for errors caused by the shape of a fetched page.
    pub fn is_payload_error(&self) -> bool {
        matches!(
            self,
            CoreError::NotAnArray { .. } | CoreError::MalformedIssue { .. }
        )
    }
}
