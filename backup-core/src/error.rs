//! Error types for backup-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from loading and validating a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure (permission denied, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML error without file context (string input).
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load — includes file path and line context from serde_yaml.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The config file did not exist at the expected path.
    #[error("config not found at {path}")]
    ConfigNotFound { path: PathBuf },

    /// `from_folder_path` is missing or is not a directory.
    #[error("source folder not found or not a directory: {path}")]
    SourceNotFound { path: PathBuf },

    /// `trash_path` was configured but does not exist.
    #[error("could not find trash folder: {path}")]
    TrashNotFound { path: PathBuf },

    /// Source and destination are the same directory or nested in each other.
    #[error("source {from} and destination {to} overlap")]
    OverlappingRoots { from: PathBuf, to: PathBuf },

    /// An ignore rule that cannot be matched against relative paths.
    #[error("invalid ignore rule '{rule}': {reason}")]
    InvalidIgnoreRule { rule: String, reason: &'static str },

    /// `dirs::home_dir()` returned `None` while expanding a `~` path.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,
}
