//! Tree walker: enumerate a root into [`PathEntry`] values.
//!
//! Traversal is depth first with entries sorted by file name. Ignored
//! directories are pruned inside the traversal, so nothing beneath them is
//! ever read.
//!
//! Source trees follow symlinks and report the target's kind. Backup trees
//! never do: a link there is a leaf [`EntryKind::File`], so removing it can
//! only ever remove the link.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use walkdir::{DirEntry, WalkDir};

use backup_core::{EntryKind, IgnoreRules, PathEntry, RelPath, TreeListing};

use crate::error::{io_err, SyncError};

/// A recoverable problem met during a walk. The entry is skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WalkWarning {
    pub path: Option<PathBuf>,
    pub message: String,
}

impl fmt::Display for WalkWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "{}: {}", path.display(), self.message),
            None => self.message.fmt(f),
        }
    }
}

impl From<walkdir::Error> for WalkWarning {
    fn from(err: walkdir::Error) -> Self {
        let path = err.path().map(Path::to_path_buf);
        let message = if let Some(ancestor) = err.loop_ancestor() {
            format!("symlink loop back to {}", ancestor.display())
        } else if let Some(io) = err.io_error() {
            io.to_string()
        } else {
            err.to_string()
        };
        Self { path, message }
    }
}

type EntryFilter = Box<dyn FnMut(&DirEntry) -> bool>;

/// Lazy walk over one tree.
pub struct TreeWalker {
    root: PathBuf,
    rules: IgnoreRules,
    inner: walkdir::FilterEntry<walkdir::IntoIter, EntryFilter>,
}

impl TreeWalker {
    /// Start a walk of `root` that follows symlinks, pruning whatever
    /// `rules` ignore.
    ///
    /// Fails with [`SyncError::RootNotFound`] when `root` is absent or not a
    /// directory; every later problem is yielded as a [`WalkWarning`].
    pub fn new(root: &Path, rules: &IgnoreRules) -> Result<Self, SyncError> {
        Self::build(root, rules, true)
    }

    /// Like [`TreeWalker::new`], but symlinks are yielded as leaf file
    /// entries and never descended into.
    pub fn without_following_links(root: &Path, rules: &IgnoreRules) -> Result<Self, SyncError> {
        Self::build(root, rules, false)
    }

    fn build(root: &Path, rules: &IgnoreRules, follow_links: bool) -> Result<Self, SyncError> {
        ensure_root(root)?;

        let prune_root = root.to_path_buf();
        let prune_rules = rules.clone();
        let filter: EntryFilter =
            Box::new(move |entry| keep_entry(&prune_root, &prune_rules, entry));

        let inner = WalkDir::new(root)
            .follow_links(follow_links)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(filter);

        Ok(Self {
            root: root.to_path_buf(),
            rules: rules.clone(),
            inner,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn is_ignored_error(&self, err: &walkdir::Error) -> bool {
        let Some(rel) = err.path().and_then(|p| relative(&self.root, p)) else {
            return false;
        };
        let kind = match err.path().map(std::fs::symlink_metadata) {
            Some(Ok(meta)) if meta.is_dir() => EntryKind::Directory,
            _ => EntryKind::File,
        };
        self.rules.is_ignored(&rel, kind)
    }

    fn path_entry(&self, entry: &DirEntry) -> Result<PathEntry, WalkWarning> {
        let warning = |message: String| WalkWarning {
            path: Some(entry.path().to_path_buf()),
            message,
        };
        let relative_path = relative(&self.root, entry.path())
            .ok_or_else(|| warning("path is not valid UTF-8".to_string()))?;
        let metadata = entry.metadata().map_err(WalkWarning::from)?;
        let modified_at = metadata.modified().map_err(|e| warning(e.to_string()))?;
        let kind = if metadata.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File
        };
        Ok(PathEntry {
            relative_path,
            kind,
            modified_at,
        })
    }
}

impl Iterator for TreeWalker {
    type Item = Result<PathEntry, WalkWarning>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.inner.next()? {
                Ok(entry) => return Some(self.path_entry(&entry)),
                // Errors never reach the entry filter.
                Err(err) if self.is_ignored_error(&err) => {
                    tracing::debug!("ignoring unreadable entry: {}", WalkWarning::from(err));
                }
                Err(err) => return Some(Err(WalkWarning::from(err))),
            }
        }
    }
}

/// Fail unless `root` is an existing directory.
pub fn ensure_root(root: &Path) -> Result<(), SyncError> {
    match std::fs::metadata(root) {
        Ok(meta) if meta.is_dir() => Ok(()),
        _ => Err(SyncError::RootNotFound {
            path: root.to_path_buf(),
        }),
    }
}

fn keep_entry(root: &Path, rules: &IgnoreRules, entry: &DirEntry) -> bool {
    let Some(rel) = relative(root, entry.path()) else {
        tracing::warn!("skipping non UTF-8 path: {}", entry.path().display());
        return false;
    };
    let file_type = entry.file_type();
    // Only an unfollowed link is still a symlink here.
    let kind = if file_type.is_dir() {
        EntryKind::Directory
    } else if file_type.is_file() || file_type.is_symlink() {
        EntryKind::File
    } else {
        tracing::debug!("skipping special file: {rel}");
        return false;
    };
    if rules.is_ignored(&rel, kind) {
        tracing::debug!("ignoring ({kind}): {rel}");
        return false;
    }
    true
}

fn relative(root: &Path, path: &Path) -> Option<RelPath> {
    path.strip_prefix(root).ok().and_then(RelPath::from_path)
}

// ---------------------------------------------------------------------------
// scan
// ---------------------------------------------------------------------------

/// A drained walk.
#[derive(Debug, Clone, Default)]
pub struct Scan {
    pub listing: TreeListing,
    pub warnings: Vec<WalkWarning>,
    /// Entries the walk could not fully read: a directory whose contents
    /// are missing, or an entry that was skipped outright.
    pub incomplete: Vec<RelPath>,
}

/// Walk a source tree to completion, following symlinks.
pub fn scan(root: &Path, rules: &IgnoreRules) -> Result<Scan, SyncError> {
    drain(root, TreeWalker::new(root, rules)?)
}

/// Walk a backup tree to completion. Symlinks are listed as files and never
/// followed, so nothing outside `root` is ever planned.
pub fn scan_destination(root: &Path, rules: &IgnoreRules) -> Result<Scan, SyncError> {
    drain(root, TreeWalker::without_following_links(root, rules)?)
}

fn drain(root: &Path, walker: TreeWalker) -> Result<Scan, SyncError> {
    // An unreadable root would otherwise look like an empty tree.
    std::fs::read_dir(root).map_err(|e| io_err(root, e))?;

    let mut scan = Scan::default();
    for item in walker {
        match item {
            Ok(entry) => {
                scan.listing.insert(entry);
            }
            Err(warning) => {
                tracing::warn!("skipped during walk: {warning}");
                if let Some(rel) = warning.path.as_deref().and_then(|p| relative(root, p)) {
                    scan.incomplete.push(rel);
                }
                scan.warnings.push(warning);
            }
        }
    }
    Ok(scan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn rel(s: &str) -> RelPath {
        RelPath::parse(s).unwrap()
    }

    fn tree() -> TempDir {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("docs/deep")).unwrap();
        fs::create_dir_all(root.join(".venv/lib")).unwrap();
        fs::write(root.join("a.txt"), "a").unwrap();
        fs::write(root.join("docs/deep/b.md"), "b").unwrap();
        fs::write(root.join(".venv/lib/x.py"), "x").unwrap();
        tmp
    }

    #[test]
    fn lists_files_and_directories_relative_to_root() {
        let tmp = tree();
        let scan = scan(tmp.path(), &IgnoreRules::default()).unwrap();
        let paths: Vec<_> = scan.listing.paths().map(RelPath::as_str).collect();
        assert_eq!(
            paths,
            vec![
                ".venv",
                ".venv/lib",
                ".venv/lib/x.py",
                "a.txt",
                "docs",
                "docs/deep",
                "docs/deep/b.md"
            ]
        );
        assert_eq!(
            scan.listing.get(&rel("docs")).unwrap().kind,
            EntryKind::Directory
        );
        assert_eq!(scan.listing.get(&rel("a.txt")).unwrap().kind, EntryKind::File);
        assert!(scan.warnings.is_empty());
    }

    #[test]
    fn ignored_directories_are_pruned() {
        let tmp = tree();
        let rules = IgnoreRules::parse(&[".venv"], &[]).unwrap();
        let scan = scan(tmp.path(), &rules).unwrap();
        assert!(scan
            .listing
            .paths()
            .all(|p| !p.as_str().starts_with(".venv")));
        assert_eq!(scan.listing.len(), 4);
    }

    #[test]
    fn missing_root_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let err = TreeWalker::new(&tmp.path().join("nope"), &IgnoreRules::default())
            .err()
            .expect("missing root must fail");
        assert!(matches!(err, SyncError::RootNotFound { .. }));
    }

    #[test]
    fn file_root_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("f");
        fs::write(&file, "x").unwrap();
        assert!(matches!(
            scan(&file, &IgnoreRules::default()),
            Err(SyncError::RootNotFound { .. })
        ));
    }

    #[test]
    #[cfg(unix)]
    fn symlinks_report_target_kind_and_broken_links_warn() {
        let tmp = tree();
        let root = tmp.path();
        std::os::unix::fs::symlink(root.join("docs"), root.join("docs-link")).unwrap();
        std::os::unix::fs::symlink(root.join("gone"), root.join("broken")).unwrap();

        let scan = scan(root, &IgnoreRules::default()).unwrap();
        assert_eq!(
            scan.listing.get(&rel("docs-link")).unwrap().kind,
            EntryKind::Directory
        );
        assert!(scan.listing.contains(&rel("docs-link/deep/b.md")));
        assert!(!scan.listing.contains(&rel("broken")));
        assert_eq!(scan.warnings.len(), 1);
        assert_eq!(scan.incomplete, vec![rel("broken")]);
    }

    #[test]
    #[cfg(unix)]
    fn destination_symlinks_are_leaves() {
        let tmp = tree();
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("victim.txt"), "v").unwrap();
        std::os::unix::fs::symlink(outside.path(), tmp.path().join("link")).unwrap();
        std::os::unix::fs::symlink(tmp.path().join("gone"), tmp.path().join("broken")).unwrap();

        let scan = scan_destination(tmp.path(), &IgnoreRules::default()).unwrap();
        assert_eq!(scan.listing.get(&rel("link")).unwrap().kind, EntryKind::File);
        assert_eq!(scan.listing.get(&rel("broken")).unwrap().kind, EntryKind::File);
        assert!(!scan.listing.contains(&rel("link/victim.txt")));
        assert!(scan.warnings.is_empty());
    }

    #[test]
    #[cfg(unix)]
    fn ignored_broken_links_are_not_warnings() {
        let tmp = tree();
        std::os::unix::fs::symlink(tmp.path().join("gone"), tmp.path().join(".DS_Store")).unwrap();
        let rules = IgnoreRules::parse(&[".DS_Store"], &[]).unwrap();

        let scan = scan(tmp.path(), &rules).unwrap();
        assert!(scan.warnings.is_empty(), "{:?}", scan.warnings);
        assert!(scan.incomplete.is_empty());
    }

    #[test]
    #[cfg(unix)]
    fn unreadable_directory_is_skipped_with_warning() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tree();
        let locked = tmp.path().join("docs/deep");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
        // Root ignores permission bits; nothing to observe then.
        let readable = fs::read_dir(&locked).is_ok();

        let result = scan(tmp.path(), &IgnoreRules::default());
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
        let scan = result.unwrap();

        if readable {
            return;
        }
        assert!(scan.listing.contains(&rel("a.txt")));
        assert!(!scan.listing.contains(&rel("docs/deep/b.md")));
        assert_eq!(scan.incomplete, vec![rel("docs/deep")]);
    }
}
