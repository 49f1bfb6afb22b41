//! Error taxonomy for a repository sync.
//!
//! | Variant | Cause | Effect |
//! |---------|-------|--------|
//! | [`MustReindex`](MirrorError::MustReindex) | saved state absent, unreadable, or from another schema | recovered by starting from empty state |
//! | [`Transport`](MirrorError::Transport) / [`Http`](MirrorError::Http) | non-success status or network failure | sync aborted, nothing saved |
//! | [`MalformedPayload`](MirrorError::MalformedPayload) | page body is not an array of issues | sync aborted, nothing saved |
//! | [`Embedding`](MirrorError::Embedding) | embedder failed | sync aborted, nothing saved |
//! | [`Persist`](MirrorError::Persist) | writing state failed | surfaced to the caller |

use std::path::PathBuf;

use issue_mirror_core::CoreError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, MirrorError>;

#[derive(Error, Debug)]
pub enum MirrorError {
    #[error("saved state for {repo} must be rebuilt: {reason}")]
    MustReindex { repo: String, reason: String },

    #[error("GitHub returned HTTP {status} for {repo}: {body}")]
    Transport {
        repo: String,
        status: u16,
        body: String,
    },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("malformed issue payload for {repo}: {reason}")]
    MalformedPayload { repo: String, reason: String },

    #[error("failed to write {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("embedding step failed for {repo}: {source}")]
    Embedding {
        repo: String,
        #[source]
        source: CoreError,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid repository '{0}': expected owner/name")]
    InvalidRepo(String),
}

impl MirrorError {
    pub fn is_must_reindex(&self) -> bool {
        matches!(self, MirrorError::MustReindex { .. })
    }
}
