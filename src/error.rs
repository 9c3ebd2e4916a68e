/// Error taxonomy shared by every layer of the service.
///
/// Per-file [`LoadError`]s are absorbed by the loader; everything else
/// propagates to the caller as a distinct [`Error`] variant so the boundary
/// layer can map each one to its own response.
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::embedder::EmbedderError;

/// Convenience alias used across the library.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Top-level error returned by the service facade and its components.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("cannot build an index from zero chunks")]
    IndexBuild,

    #[error("no documents have been indexed yet")]
    NotInitialized,

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("reset incomplete, {} item(s) could not be removed: {}", .failures.len(), join_failures(.failures))]
    PartialReset { failures: Vec<ResetFailure> },

    #[error("question store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("upload rejected: {0}")]
    Upload(String),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("index task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// A single file that could not be turned into documents.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} is not valid UTF-8 text", .path.display())]
    Encoding { path: PathBuf },

    #[error("failed to parse PDF {}: {reason}", .path.display())]
    Pdf { path: PathBuf, reason: String },

    #[error("failed to parse DOCX {}: {reason}", .path.display())]
    Docx { path: PathBuf, reason: String },

    #[error("failed to parse XLSX {}: {reason}", .path.display())]
    Xlsx { path: PathBuf, reason: String },
}

/// Saving or restoring the persisted index failed.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("no persisted index at {}", .0.display())]
    Missing(PathBuf),

    #[error("index I/O failed on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("persisted index {} is corrupt: {reason}", .path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("failed to encode index manifest: {0}")]
    Encode(#[from] serde_json::Error),
}

/// The embedding provider or the language model failed.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbedderError),

    #[error("embedding has {actual} dimensions, index expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("language model request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("language model returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("language model returned no choices")]
    EmptyResponse,

    #[error("environment variable {0} with the API key is not set")]
    MissingApiKey(String),

    #[error("language model did not answer within {0:?}")]
    Timeout(Duration),
}

/// One path that `reset` failed to remove.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetFailure {
    pub path: PathBuf,
    pub reason: String,
}

impl fmt::Display for ResetFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.path.display(), self.reason)
    }
}

fn join_failures(failures: &[ResetFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_reset_lists_every_failure() {
        let err = Error::PartialReset {
            failures: vec![
                ResetFailure {
                    path: PathBuf::from("documents/a.txt"),
                    reason: "permission denied".to_string(),
                },
                ResetFailure {
                    path: PathBuf::from("documents/b.pdf"),
                    reason: "busy".to_string(),
                },
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("2 item(s)"), "got: {msg}");
        assert!(msg.contains("documents/a.txt (permission denied)"));
        assert!(msg.contains("documents/b.pdf (busy)"));
    }

    #[test]
    fn test_model_error_wraps_embedder_error() {
        let err: Error = ModelError::from(EmbedderError::InferenceFailed("boom".into())).into();
        assert!(matches!(err, Error::Model(ModelError::Embedding(_))));
        assert!(err.to_string().contains("boom"));
    }
}
