//! Action executor: apply plan items to the destination tree.
//!
//! ## File copy protocol
//!
//! 1. Create the destination's parent directories.
//! 2. Copy the source bytes into a fresh, uniquely named temporary file next
//!    to the target.
//! 3. Stamp it with the source modification time and permissions.
//! 4. Rename it over the target (atomic on POSIX).
//!
//! A failure at any step drops the temporary file and leaves the previous
//! destination content in place. No action passes through a symlink inside
//! the destination tree.

use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use filetime::FileTime;
use serde::Serialize;

use backup_core::RelPath;

use crate::diff::Category;
use crate::error::{io_err, SyncError};

/// Temporary files are `.backup-<random>.tmp` in the target's directory.
const TMP_PREFIX: &str = ".backup-";
const TMP_SUFFIX: &str = ".tmp";

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// A single action that did not complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    pub path: RelPath,
    pub error: String,
}

/// Result of applying one category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    pub applied: Vec<RelPath>,
    pub failed: Vec<ItemFailure>,
}

// ---------------------------------------------------------------------------
// Trash
// ---------------------------------------------------------------------------

/// Per-run folder that receives destination entries the run removes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trash {
    folder: PathBuf,
}

impl Trash {
    /// `<trash_root>/backup_trash_<YYYY-MM-DD_HH;MM;SS>` for a run starting now.
    ///
    /// When that folder already exists (two runs within one second), a
    /// `_2`, `_3`, … suffix is appended.
    pub fn for_run(trash_root: &Path) -> Self {
        let stamp = chrono::Local::now()
            .format("backup_trash_%Y-%m-%d_%H;%M;%S")
            .to_string();
        let mut folder = trash_root.join(&stamp);
        let mut n = 2;
        while fs::symlink_metadata(&folder).is_ok() {
            folder = trash_root.join(format!("{stamp}_{n}"));
            n += 1;
        }
        Self { folder }
    }

    pub fn at(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
        }
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    /// Move `target` (the destination entry for `path`) into the trash.
    ///
    /// Directories are expected to be empty by now; their contents were
    /// moved as separate, earlier actions. An entry already in the trash is
    /// never overwritten.
    fn receive(&self, path: &RelPath, target: &Path, is_dir: bool) -> Result<(), SyncError> {
        let binned = path.to_path(&self.folder);
        if is_dir {
            fs::remove_dir(target).map_err(|e| io_err(target, e))?;
            fs::create_dir_all(&binned).map_err(|e| io_err(&binned, e))?;
            return Ok(());
        }

        if fs::symlink_metadata(&binned).is_ok() {
            return Err(io_err(
                &binned,
                io::Error::new(ErrorKind::AlreadyExists, "already in trash"),
            ));
        }
        if let Some(parent) = binned.parent() {
            fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }
        if fs::rename(target, &binned).is_ok() {
            return Ok(());
        }
        // Trash on another filesystem: copy, then remove.
        copy_entry(target, &binned)?;
        fs::remove_file(target).map_err(|e| io_err(target, e))
    }
}

/// Copy a file or a symlink (as a link) to `to`, keeping the mtime.
fn copy_entry(from: &Path, to: &Path) -> Result<(), SyncError> {
    let meta = fs::symlink_metadata(from).map_err(|e| io_err(from, e))?;
    if meta.file_type().is_symlink() {
        #[cfg(unix)]
        {
            let link = fs::read_link(from).map_err(|e| io_err(from, e))?;
            return std::os::unix::fs::symlink(link, to).map_err(|e| io_err(to, e));
        }
        #[cfg(not(unix))]
        return Err(io_err(
            from,
            io::Error::other("cannot move a link across filesystems"),
        ));
    }
    fs::copy(from, to).map_err(|e| io_err(to, e))?;
    filetime::set_file_mtime(to, FileTime::from_last_modification_time(&meta))
        .map_err(|e| io_err(to, e))
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// Applies actions from source to destination, one item at a time.
#[derive(Debug, Clone)]
pub struct Executor {
    source_root: PathBuf,
    destination_root: PathBuf,
    trash: Option<Trash>,
}

impl Executor {
    pub fn new(source_root: impl Into<PathBuf>, destination_root: impl Into<PathBuf>) -> Self {
        Self {
            source_root: source_root.into(),
            destination_root: destination_root.into(),
            trash: None,
        }
    }

    pub fn with_trash(mut self, trash: Trash) -> Self {
        self.trash = Some(trash);
        self
    }

    pub fn trash(&self) -> Option<&Trash> {
        self.trash.as_ref()
    }

    /// Copy a source entry to the same relative path in the destination.
    ///
    /// Directories are created empty; files get bytes and modification
    /// time. A destination entry of the other kind, or a symlink, is removed
    /// first (non-recursively, into the trash when there is one). Idempotent.
    pub fn create(&self, path: &RelPath) -> Result<(), SyncError> {
        let src = path.to_path(&self.source_root);
        let dst = self.destination_path(path)?;
        let meta = fs::metadata(&src).map_err(|e| io_err(&src, e))?;

        self.clear_other_kind(path, &dst, meta.is_dir())?;
        if meta.is_dir() {
            fs::create_dir_all(&dst).map_err(|e| io_err(&dst, e))?;
            tracing::debug!(to = %dst.display(), "created directory: {path}");
            return Ok(());
        }
        copy_file(&src, &dst, &meta)?;
        tracing::debug!(from = %src.display(), to = %dst.display(), "backed up: {path}");
        Ok(())
    }

    /// Overwrite a destination file with the source's content and mtime.
    pub fn update(&self, path: &RelPath) -> Result<(), SyncError> {
        let src = path.to_path(&self.source_root);
        let dst = self.destination_path(path)?;
        let meta = fs::metadata(&src).map_err(|e| io_err(&src, e))?;
        if meta.is_dir() {
            return Err(io_err(
                &src,
                io::Error::other("source changed from file to directory"),
            ));
        }
        copy_file(&src, &dst, &meta)?;
        tracing::debug!(from = %src.display(), to = %dst.display(), "updated: {path}");
        Ok(())
    }

    /// Remove a destination entry. Directories must already be empty; a
    /// symlink is removed itself, never its target.
    ///
    /// With a trash folder the entry is moved there instead. An entry that
    /// is already gone counts as deleted.
    pub fn delete(&self, path: &RelPath) -> Result<(), SyncError> {
        let dst = self.destination_path(path)?;
        let meta = match fs::symlink_metadata(&dst) {
            Ok(meta) => meta,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                tracing::debug!("already gone: {path}");
                return Ok(());
            }
            Err(err) => return Err(io_err(&dst, err)),
        };
        self.remove_entry(path, &dst, meta.is_dir())?;
        tracing::debug!("deleted: {path}");
        Ok(())
    }

    /// Apply every path of one category. Failures are collected per item
    /// and never stop the batch.
    pub fn apply(&self, category: Category, paths: &[RelPath]) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        for path in paths {
            let result = match category {
                Category::Create => self.create(path),
                Category::Update => self.update(path),
                Category::Delete => self.delete(path),
            };
            match result {
                Ok(()) => outcome.applied.push(path.clone()),
                Err(err) => {
                    tracing::error!("failed to {category} '{path}': {err}");
                    outcome.failed.push(ItemFailure {
                        path: path.clone(),
                        error: err.to_string(),
                    });
                }
            }
        }
        outcome
    }

    /// Resolve `path` under the destination root, refusing any path whose
    /// parent chain crosses a symlink.
    fn destination_path(&self, path: &RelPath) -> Result<PathBuf, SyncError> {
        for ancestor in path.ancestors() {
            let dir = self.destination_root.join(ancestor);
            let is_link = fs::symlink_metadata(&dir).is_ok_and(|m| m.file_type().is_symlink());
            if is_link {
                return Err(io_err(
                    &dir,
                    io::Error::other("refusing to go through a symlink in the backup"),
                ));
            }
        }
        Ok(path.to_path(&self.destination_root))
    }

    fn clear_other_kind(&self, path: &RelPath, dst: &Path, want_dir: bool) -> Result<(), SyncError> {
        let existing = match fs::symlink_metadata(dst) {
            Ok(meta) => meta,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(io_err(dst, err)),
        };
        let is_link = existing.file_type().is_symlink();
        if !is_link && existing.is_dir() == want_dir {
            return Ok(());
        }

        tracing::info!("replacing {} in backup", dst.display());
        self.remove_entry(path, dst, existing.is_dir())
    }

    /// Remove one destination entry, into the trash when there is one.
    fn remove_entry(&self, path: &RelPath, dst: &Path, is_dir: bool) -> Result<(), SyncError> {
        match &self.trash {
            Some(trash) => {
                trash.receive(path, dst, is_dir)?;
                tracing::debug!(to = %trash.folder().display(), "moved to trash: {path}");
                Ok(())
            }
            None if is_dir => fs::remove_dir(dst).map_err(|e| io_err(dst, e)),
            None => fs::remove_file(dst).map_err(|e| io_err(dst, e)),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn copy_file(src: &Path, dst: &Path, meta: &fs::Metadata) -> Result<(), SyncError> {
    let parent = dst
        .parent()
        .ok_or_else(|| io_err(dst, io::Error::other("target has no parent directory")))?;
    fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;

    // Dropped (and deleted) on any early return.
    let mut tmp = tempfile::Builder::new()
        .prefix(TMP_PREFIX)
        .suffix(TMP_SUFFIX)
        .tempfile_in(parent)
        .map_err(|e| io_err(parent, e))?;
    let mut reader = fs::File::open(src).map_err(|e| io_err(src, e))?;
    io::copy(&mut reader, tmp.as_file_mut()).map_err(|e| io_err(src, e))?;

    filetime::set_file_mtime(tmp.path(), FileTime::from_last_modification_time(meta))
        .map_err(|e| io_err(tmp.path(), e))?;
    fs::set_permissions(tmp.path(), meta.permissions()).map_err(|e| io_err(tmp.path(), e))?;
    tmp.persist(dst).map_err(|e| io_err(dst, e.error))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
