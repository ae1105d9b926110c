//! # backup-sync
//!
//! Walk, diff and apply: everything that touches the two trees.
//!
//! Call [`run`] with a loaded [`backup_core::Config`] and a [`Consent`]
//! source to mirror the source folder into the backup folder.

pub mod diff;
pub mod error;
pub mod executor;
pub mod pipeline;
pub mod walker;

pub use diff::{compute_plan, ActionPlan, Category, KindChange};
pub use error::SyncError;
pub use executor::{BatchOutcome, Executor, ItemFailure, Trash};
pub use pipeline::{run, AutoApprove, CategoryOutcome, Consent, RunOptions, SyncReport};
pub use walker::{scan, Scan, TreeWalker, WalkWarning};
