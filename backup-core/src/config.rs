//! YAML configuration for a backup run.
//!
//! ```yaml
//! from_folder_path: ~/Documents
//! to_folder_path: /mnt/backup/Documents
//! trash_path: ~/.Trash            # optional
//! ignore: [.venv, .DS_Store, projects/scratch]
//! ignore_extensions: [.mp4]
//! ```
//!
//! `ignore_files` and `ignore_folders` are accepted as older spellings of
//! `ignore` and are merged into it.
//!
//! A bare `~` is YAML's null. For the two folder paths it still means the
//! home directory; `trash_path: ~` leaves the trash unset, so write
//! `trash_path: "~"` to use the home directory there.
//!
//! # API pattern
//!
//! - `load_at(path)` — explicit config file; used in tests with `TempDir`
//! - `load()` — `config.yaml` in the current directory, delegates to `_at`

use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ConfigError;
use crate::ignore::IgnoreRules;

/// File name looked up by [`load`].
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// On-disk shape, before path expansion and validation.
#[derive(Debug, Clone, Deserialize)]
struct RawConfig {
    #[serde(deserialize_with = "null_as_home")]
    from_folder_path: String,
    #[serde(deserialize_with = "null_as_home")]
    to_folder_path: String,
    #[serde(default)]
    trash_path: Option<String>,
    #[serde(default)]
    ignore: Vec<String>,
    #[serde(default)]
    ignore_files: Vec<String>,
    #[serde(default)]
    ignore_folders: Vec<String>,
    #[serde(default)]
    ignore_extensions: Vec<String>,
}

/// Validated settings for one backup run. All paths are absolute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Config {
    /// Source root; exists and is a directory.
    pub from_folder_path: PathBuf,
    /// Destination root; created by the pipeline when absent.
    pub to_folder_path: PathBuf,
    /// Where deleted destination entries are moved instead of removed.
    pub trash_path: Option<PathBuf>,
    pub ignore: IgnoreRules,
}

impl Config {
    pub fn new(from_folder_path: impl Into<PathBuf>, to_folder_path: impl Into<PathBuf>) -> Self {
        Self {
            from_folder_path: from_folder_path.into(),
            to_folder_path: to_folder_path.into(),
            trash_path: None,
            ignore: IgnoreRules::default(),
        }
    }

    pub fn with_ignore(mut self, ignore: IgnoreRules) -> Self {
        self.ignore = ignore;
        self
    }

    pub fn with_trash(mut self, trash_path: impl Into<PathBuf>) -> Self {
        self.trash_path = Some(trash_path.into());
        self
    }

    /// Check the filesystem preconditions of a run.
    ///
    /// The source must be an existing directory, the trash folder (if any)
    /// must exist, and the two roots may not contain one another.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.from_folder_path.is_dir() {
            return Err(ConfigError::SourceNotFound {
                path: self.from_folder_path.clone(),
            });
        }
        if let Some(trash) = &self.trash_path {
            if !trash.is_dir() {
                return Err(ConfigError::TrashNotFound {
                    path: trash.clone(),
                });
            }
        }

        let from = self.from_folder_path.canonicalize()?;
        let to = canonicalize_existing_prefix(&self.to_folder_path);
        if from.starts_with(&to) || to.starts_with(&from) {
            return Err(ConfigError::OverlappingRoots {
                from: self.from_folder_path.clone(),
                to: self.to_folder_path.clone(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Load and validate the config file at `path`.
///
/// Returns `ConfigError::ConfigNotFound` if absent,
/// `ConfigError::Parse` (with path + line context) if malformed YAML.
/// Relative paths inside the file resolve against the file's directory.
pub fn load_at(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::ConfigNotFound {
            path: path.to_path_buf(),
        });
    }
    let contents = std::fs::read_to_string(path)?;
    let base_dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => std::env::current_dir()?,
    };
    let config = from_yaml_str(&contents, &base_dir).map_err(|e| match e {
        ConfigError::Yaml(source) => ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        },
        other => other,
    })?;
    config.validate()?;
    tracing::debug!(config = ?config, "loaded config from {}", path.display());
    Ok(config)
}

/// `load_at` convenience wrapper for `./config.yaml`.
pub fn load() -> Result<Config, ConfigError> {
    load_at(Path::new(DEFAULT_CONFIG_FILE))
}

/// Parse YAML without touching the filesystem beyond `~` expansion.
///
/// Does not validate; callers run [`Config::validate`].
pub fn from_yaml_str(contents: &str, base_dir: &Path) -> Result<Config, ConfigError> {
    let raw: RawConfig = serde_yaml::from_str(contents)?;

    let mut rules = raw.ignore;
    rules.extend(raw.ignore_folders);
    rules.extend(raw.ignore_files);

    Ok(Config {
        from_folder_path: expand_path(&raw.from_folder_path, base_dir)?,
        to_folder_path: expand_path(&raw.to_folder_path, base_dir)?,
        trash_path: raw
            .trash_path
            .map(|p| expand_path(&p, base_dir))
            .transpose()?,
        ignore: IgnoreRules::parse(&rules, &raw.ignore_extensions)?,
    })
}

fn null_as_home<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_else(|| "~".to_string()))
}

/// Expand a leading `~` and anchor relative paths at `base_dir`.
fn expand_path(raw: &str, base_dir: &Path) -> Result<PathBuf, ConfigError> {
    let path = if raw == "~" {
        home()?
    } else if let Some(rest) = raw.strip_prefix("~/") {
        home()?.join(rest)
    } else {
        PathBuf::from(raw)
    };
    if path.is_absolute() {
        Ok(path)
    } else {
        Ok(base_dir.join(path))
    }
}

/// Canonicalize the longest existing prefix of `path` and append the rest.
fn canonicalize_existing_prefix(path: &Path) -> PathBuf {
    for ancestor in path.ancestors() {
        if let Ok(canonical) = ancestor.canonicalize() {
            return match path.strip_prefix(ancestor) {
                Ok(rest) => canonical.join(rest),
                Err(_) => canonical,
            };
        }
    }
    path.to_path_buf()
}

fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
