//! Error types for backup-sync.

use std::path::PathBuf;

use thiserror::Error;

use backup_core::ConfigError;

/// Errors that abort a sync run.
///
/// Per-entry problems never surface here; they are collected as
/// [`crate::walker::WalkWarning`] or [`crate::executor::ItemFailure`].
#[derive(Debug, Error)]
pub enum SyncError {
    /// The configuration failed validation.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// A tree root is absent or not a directory.
    #[error("root folder not found or not a directory: {path}")]
    RootNotFound { path: PathBuf },

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization error (report output).
    #[error("report JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
