//! Sync pipeline: walk → diff → consent → execute → report.
//!
//! Consent is gathered for every non-empty category (create, update,
//! delete) before anything is touched. Approved categories then run in the
//! order delete, create, update, so a directory that the source replaced
//! with a file is already emptied when the file is copied in.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use serde::Serialize;

use backup_core::{Config, TreeListing};

use crate::diff::{compute_plan, ActionPlan, Category};
use crate::error::{io_err, SyncError};
use crate::executor::{BatchOutcome, Executor, ItemFailure, Trash};
use crate::walker::{self, Scan, WalkWarning};

/// Create/update summaries list at most this many paths.
pub const PREVIEW_LIMIT: usize = 20;

/// Order in which approved categories are applied.
const EXECUTION_ORDER: [Category; 3] = [Category::Delete, Category::Create, Category::Update];

// ---------------------------------------------------------------------------
// Consent
// ---------------------------------------------------------------------------

/// Source of yes/no decisions for each action category.
pub trait Consent {
    /// Called once per non-empty category before any of its actions run.
    /// The last line of `summary` is the question.
    fn ask(&mut self, summary: &str) -> bool;
}

impl<F> Consent for F
where
    F: FnMut(&str) -> bool,
{
    fn ask(&mut self, summary: &str) -> bool {
        self(summary)
    }
}

/// Approves everything without asking.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoApprove;

impl Consent for AutoApprove {
    fn ask(&mut self, summary: &str) -> bool {
        tracing::debug!("auto-approved: {summary}");
        true
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Options for a pipeline run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Compute and report the plan without asking or mutating anything.
    pub dry_run: bool,
}

/// What happened to one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CategoryOutcome {
    /// Nothing to do.
    Empty,
    /// The user refused; nothing in the category ran.
    Declined { count: usize },
    /// Dry run; nothing in the category ran.
    DryRun { count: usize },
    Applied(BatchOutcome),
}

impl CategoryOutcome {
    pub fn applied(&self) -> usize {
        match self {
            CategoryOutcome::Applied(batch) => batch.applied.len(),
            _ => 0,
        }
    }

    pub fn failed(&self) -> &[ItemFailure] {
        match self {
            CategoryOutcome::Applied(batch) => &batch.failed,
            _ => &[],
        }
    }

    pub fn skipped(&self) -> usize {
        match self {
            CategoryOutcome::Declined { count } | CategoryOutcome::DryRun { count } => *count,
            _ => 0,
        }
    }
}

/// Summary of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub source_root: PathBuf,
    pub destination_root: PathBuf,
    pub source_entries: usize,
    pub destination_entries: usize,
    pub plan: ActionPlan,
    pub warnings: Vec<WalkWarning>,
    pub create: CategoryOutcome,
    pub update: CategoryOutcome,
    pub delete: CategoryOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trash_folder: Option<PathBuf>,
}

impl SyncReport {
    pub fn outcome(&self, category: Category) -> &CategoryOutcome {
        match category {
            Category::Create => &self.create,
            Category::Update => &self.update,
            Category::Delete => &self.delete,
        }
    }

    fn outcome_mut(&mut self, category: Category) -> &mut CategoryOutcome {
        match category {
            Category::Create => &mut self.create,
            Category::Update => &mut self.update,
            Category::Delete => &mut self.delete,
        }
    }

    pub fn created(&self) -> usize {
        self.create.applied()
    }

    pub fn updated(&self) -> usize {
        self.update.applied()
    }

    pub fn deleted(&self) -> usize {
        self.delete.applied()
    }

    pub fn skipped(&self) -> usize {
        Category::ALL
            .iter()
            .map(|c| self.outcome(*c).skipped())
            .sum()
    }

    pub fn failed(&self) -> usize {
        self.failures().count()
    }

    /// Every failed item with its category.
    pub fn failures(&self) -> impl Iterator<Item = (Category, &ItemFailure)> {
        Category::ALL
            .into_iter()
            .flat_map(move |c| self.outcome(c).failed().iter().map(move |f| (c, f)))
    }

    pub fn to_json(&self) -> Result<String, SyncError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

/// Run the pipeline for `config`.
///
/// Fails before any mutation when the source root is missing or a root
/// cannot be read. Per-entry problems end up in the report.
pub fn run(
    config: &Config,
    consent: &mut dyn Consent,
    options: RunOptions,
) -> Result<SyncReport, SyncError> {
    let source_root = &config.from_folder_path;
    let destination_root = &config.to_folder_path;
    walker::ensure_root(source_root)?;
    config.validate()?;

    tracing::info!(
        "starting backup: {} -> {}",
        source_root.display(),
        destination_root.display()
    );

    let mut source = walker::scan(source_root, &config.ignore)?;
    tracing::info!("entries in source folder: {}", source.listing.len());

    let mut destination = if destination_root.exists() {
        walker::scan_destination(destination_root, &config.ignore)?
    } else {
        if !options.dry_run {
            std::fs::create_dir_all(destination_root).map_err(|e| io_err(destination_root, e))?;
            tracing::info!("created backup folder: {}", destination_root.display());
        }
        Scan::default()
    };
    tracing::info!("entries in backup folder: {}", destination.listing.len());

    exclude_incomplete(&mut destination.listing, &source);
    exclude_incomplete(&mut source.listing, &destination);

    let plan = compute_plan(&source.listing, &destination.listing);
    let trash = config.trash_path.as_deref().map(Trash::for_run);

    let mut warnings = source.warnings;
    warnings.extend(destination.warnings);
    let mut report = SyncReport {
        source_root: source_root.clone(),
        destination_root: destination_root.clone(),
        source_entries: source.listing.len(),
        destination_entries: destination.listing.len(),
        plan,
        warnings,
        create: CategoryOutcome::Empty,
        update: CategoryOutcome::Empty,
        delete: CategoryOutcome::Empty,
        trash_folder: None,
    };

    let mut approved = Vec::new();
    for category in Category::ALL {
        let count = report.plan.paths(category).len();
        if count == 0 {
            continue;
        }
        if options.dry_run {
            tracing::info!("[dry-run] would {category} {count} entries");
            *report.outcome_mut(category) = CategoryOutcome::DryRun { count };
            continue;
        }
        let summary = consent_summary(category, &report.plan, destination_root, trash.as_ref());
        if consent.ask(&summary) {
            approved.push(category);
        } else {
            tracing::info!("skipped by user: {count} to {category}");
            *report.outcome_mut(category) = CategoryOutcome::Declined { count };
        }
    }

    let mut executor = Executor::new(source_root, destination_root);
    if let Some(trash) = trash {
        executor = executor.with_trash(trash);
    }
    for category in EXECUTION_ORDER {
        if !approved.contains(&category) {
            continue;
        }
        tracing::info!("applying: {category}");
        let batch = executor.apply(category, report.plan.paths(category));
        *report.outcome_mut(category) = CategoryOutcome::Applied(batch);
    }
    // Deletions and kind changes both fill the trash lazily.
    report.trash_folder = executor
        .trash()
        .map(|t| t.folder())
        .filter(|folder| folder.exists())
        .map(Path::to_path_buf);

    tracing::info!(
        "done: created {}, updated {}, deleted {}, skipped {}, failed {}",
        report.created(),
        report.updated(),
        report.deleted(),
        report.skipped(),
        report.failed(),
    );
    Ok(report)
}

/// Keep the other tree's entries out of the plan where a walk was
/// incomplete, so an unreadable source directory never causes deletions.
fn exclude_incomplete(other: &mut TreeListing, scanned: &Scan) {
    for path in &scanned.incomplete {
        let mut removed = other.remove_descendants(path);
        if !scanned.listing.contains(path) && other.remove(path).is_some() {
            removed += 1;
        }
        if removed > 0 {
            tracing::warn!("leaving {removed} entries at {path} untouched: walk was incomplete");
        }
    }
}

/// Human-readable text handed to [`Consent::ask`].
pub fn consent_summary(
    category: Category,
    plan: &ActionPlan,
    destination_root: &Path,
    trash: Option<&Trash>,
) -> String {
    let paths = plan.paths(category);
    let count = paths.len();
    let mut out = match category {
        Category::Create => format!(
            "{count} new {} to copy into '{}':",
            entries(count),
            destination_root.display()
        ),
        Category::Update => format!(
            "{count} outdated {} to overwrite in '{}':",
            if count == 1 { "file" } else { "files" },
            destination_root.display()
        ),
        Category::Delete => format!(
            "{count} {} in '{}' not present in the source:",
            entries(count),
            destination_root.display()
        ),
    };

    // Deletions are always listed in full.
    let limit = match category {
        Category::Delete => count,
        _ => PREVIEW_LIMIT,
    };
    for path in paths.iter().take(limit) {
        let _ = write!(out, "\n  - '{path}'");
        if let Some(change) = plan.kind_change(path) {
            let _ = write!(out, " (replaces a {})", change.destination);
        }
    }
    if count > limit {
        let _ = write!(out, "\n  - +{} more", count - limit);
    }
    if let Some(trash) = trash {
        let replaces = paths.iter().any(|p| plan.kind_change(p).is_some());
        if category == Category::Delete {
            let _ = write!(out, "\nThey will be moved to '{}'.", trash.folder().display());
        } else if category == Category::Create && replaces {
            let _ = write!(
                out,
                "\nReplaced entries will be moved to '{}'.",
                trash.folder().display()
            );
        }
    }
    let _ = write!(out, "\n{}", category.question());
    out
}

fn entries(count: usize) -> &'static str {
    if count == 1 {
        "entry"
    } else {
        "entries"
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::time::UNIX_EPOCH;

    use backup_core::{PathEntry, RelPath};
    use tempfile::TempDir;

    use super::*;

    fn rel(s: &str) -> RelPath {
        RelPath::parse(s).unwrap()
    }

    fn setup() -> (TempDir, Config) {
        let tmp = TempDir::new().expect("tmp");
        let src = tmp.path().join("src");
        fs::create_dir_all(src.join("docs")).expect("mkdir");
        fs::write(src.join("a.txt"), "a").expect("write");
        fs::write(src.join("docs/b.txt"), "b").expect("write");
        let config = Config::new(&src, tmp.path().join("dst"));
        (tmp, config)
    }

    #[test]
    fn first_run_creates_destination_and_copies_everything() {
        let (_tmp, config) = setup();
        let report = run(&config, &mut AutoApprove, RunOptions::default()).expect("run");

        assert_eq!(report.created(), 3);
        assert_eq!(report.failed(), 0);
        assert_eq!(
            fs::read_to_string(config.to_folder_path.join("docs/b.txt")).unwrap(),
            "b"
        );
    }

    #[test]
    fn consent_is_asked_once_per_non_empty_category() {
        let (_tmp, config) = setup();
        let mut asked = Vec::new();
        let mut consent = |summary: &str| {
            asked.push(summary.to_string());
            true
        };
        run(&config, &mut consent, RunOptions::default()).expect("run");
        assert_eq!(asked.len(), 1, "only the create category is non-empty");
        assert!(asked[0].starts_with("3 new entries"));
        assert!(asked[0].ends_with(Category::Create.question()));
    }

    #[test]
    fn declined_category_is_skipped_entirely() {
        let (_tmp, config) = setup();
        let report = run(&config, &mut |_: &str| false, RunOptions::default()).expect("run");

        assert_eq!(report.create, CategoryOutcome::Declined { count: 3 });
        assert_eq!(report.skipped(), 3);
        let mut entries = fs::read_dir(&config.to_folder_path).unwrap();
        assert!(entries.next().is_none(), "declined run must not copy");
    }

    #[test]
    fn dry_run_never_asks_and_never_writes() {
        let (_tmp, config) = setup();
        let mut consent = |_: &str| -> bool { panic!("dry run must not ask") };
        let report = run(&config, &mut consent, RunOptions { dry_run: true }).expect("run");

        assert_eq!(report.create, CategoryOutcome::DryRun { count: 3 });
        assert!(!config.to_folder_path.exists(), "dry run must not create root");
    }

    #[test]
    fn missing_source_fails_before_touching_destination() {
        let tmp = TempDir::new().unwrap();
        let config = Config::new(tmp.path().join("missing"), tmp.path().join("dst"));
        let err = run(&config, &mut AutoApprove, RunOptions::default()).unwrap_err();
        assert!(matches!(err, SyncError::RootNotFound { .. }));
        assert!(!config.to_folder_path.exists());
    }

    #[test]
    fn incomplete_source_walk_shields_destination_entries() {
        let mut destination: TreeListing = [
            PathEntry::directory(rel("locked"), UNIX_EPOCH),
            PathEntry::file(rel("locked/a.txt"), UNIX_EPOCH),
            PathEntry::file(rel("broken-link"), UNIX_EPOCH),
            PathEntry::file(rel("other.txt"), UNIX_EPOCH),
        ]
        .into_iter()
        .collect();
        let source = Scan {
            listing: [PathEntry::directory(rel("locked"), UNIX_EPOCH)]
                .into_iter()
                .collect(),
            warnings: vec![],
            incomplete: vec![rel("locked"), rel("broken-link")],
        };

        exclude_incomplete(&mut destination, &source);
        let paths: Vec<_> = destination.paths().map(RelPath::as_str).collect();
        assert_eq!(paths, vec!["locked", "other.txt"]);
    }

    #[test]
    fn summary_flags_kind_changes_and_truncates_long_lists() {
        let mut plan = ActionPlan::default();
        for i in 0..(PREVIEW_LIMIT + 5) {
            plan.to_create.push(rel(&format!("f{i:03}")));
        }
        plan.kind_changes.push(crate::diff::KindChange {
            path: rel("f000"),
            source: backup_core::EntryKind::File,
            destination: backup_core::EntryKind::Directory,
        });

        let summary = consent_summary(Category::Create, &plan, Path::new("/backup"), None);
        assert!(summary.contains("'f000' (replaces a directory)"));
        assert!(summary.contains("+5 more"));
        assert!(!summary.contains("f024"));
    }

    #[test]
    fn delete_summary_lists_everything_and_mentions_trash() {
        let mut plan = ActionPlan::default();
        for i in 0..(PREVIEW_LIMIT + 5) {
            plan.to_delete.push(rel(&format!("f{i:03}")));
        }
        let trash = Trash::at("/trash/run");
        let summary = consent_summary(Category::Delete, &plan, Path::new("/backup"), Some(&trash));
        assert!(summary.contains("'f024'"));
        assert!(!summary.contains("more"));
        assert!(summary.contains("/trash/run"));
    }

    #[test]
    fn report_serializes_to_json() {
        let (_tmp, config) = setup();
        let report = run(&config, &mut AutoApprove, RunOptions { dry_run: true }).expect("run");
        let json = report.to_json().expect("json");
        let value: serde_json::Value = serde_json::from_str(&json).expect("parse");
        assert_eq!(value["create"]["status"], "dry_run");
        assert_eq!(value["create"]["count"], 3);
        assert_eq!(value["update"]["status"], "empty");
    }
}
