//! Backup core library — domain types, configuration, ignore policy, errors.
//!
//! - [`types`] — relative paths, tree entries and listings
//! - [`ignore`] — ignore rules and [`is_ignored`]
//! - [`config`] — YAML config load / validate
//! - [`error`] — [`ConfigError`]

pub mod config;
pub mod error;
pub mod ignore;
pub mod types;

pub use config::Config;
pub use error::ConfigError;
pub use ignore::{is_ignored, IgnoreRule, IgnoreRules};
pub use types::{EntryKind, PathEntry, RelPath, TreeListing};
