//! Domain types shared by the walker, the diff engine and the executor.
//!
//! Filesystem locations are `PathBuf`; paths *inside* a tree are [`RelPath`],
//! a slash-separated string that compares segment by segment.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// RelPath
// ---------------------------------------------------------------------------

/// A normalized path relative to a tree root, e.g. `docs/notes/todo.md`.
///
/// Never empty, never absolute, no `.` or `..` segments, no leading or
/// trailing `/`. Ordering is segment-wise, so `a` < `a/b` < `a-b`: an
/// ancestor sorts before its descendants and a subtree is contiguous.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RelPath(String);

impl RelPath {
    /// Normalize `raw` into a relative path.
    ///
    /// Backslashes are treated as separators; empty and `.` segments are
    /// dropped. Returns `None` for an empty result or a `..` segment.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut segments = Vec::new();
        for segment in raw.split(['/', '\\']) {
            match segment {
                "" | "." => continue,
                ".." => return None,
                s => segments.push(s),
            }
        }
        if segments.is_empty() {
            return None;
        }
        Some(Self(segments.join("/")))
    }

    /// Build from a native relative path. Returns `None` for non-UTF-8
    /// names, absolute paths or `..` components.
    pub fn from_path(path: &Path) -> Option<Self> {
        let mut segments = Vec::new();
        for component in path.components() {
            match component {
                Component::Normal(name) => segments.push(name.to_str()?),
                Component::CurDir => continue,
                _ => return None,
            }
        }
        if segments.is_empty() {
            return None;
        }
        Some(Self(segments.join("/")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    /// Number of segments; `a` has depth 1, `a/b` depth 2.
    pub fn depth(&self) -> usize {
        self.segments().count()
    }

    /// Last segment.
    pub fn file_name(&self) -> &str {
        match self.0.rfind('/') {
            Some(idx) => &self.0[idx + 1..],
            None => &self.0,
        }
    }

    /// Suffix of the last segment including the dot (`.txt`).
    ///
    /// A leading dot does not start an extension: `.bashrc` has none.
    pub fn extension(&self) -> Option<&str> {
        let name = self.file_name();
        match name.rfind('.') {
            Some(0) | None => None,
            Some(idx) if idx + 1 == name.len() => None,
            Some(idx) => Some(&name[idx..]),
        }
    }

    pub fn parent(&self) -> Option<RelPath> {
        self.0.rfind('/').map(|idx| Self(self.0[..idx].to_owned()))
    }

    /// Proper ancestors, outermost first: `a/b/c` yields `a`, `a/b`.
    pub fn ancestors(&self) -> impl Iterator<Item = &str> {
        self.0
            .match_indices('/')
            .map(move |(idx, _)| &self.0[..idx])
    }

    /// `true` if `other` lies strictly beneath `self`.
    pub fn is_ancestor_of(&self, other: &RelPath) -> bool {
        other.0.len() > self.0.len()
            && other.0.starts_with(&self.0)
            && other.0.as_bytes()[self.0.len()] == b'/'
    }

    /// Resolve against a tree root.
    pub fn to_path(&self, root: &Path) -> PathBuf {
        let mut path = root.to_path_buf();
        for segment in self.segments() {
            path.push(segment);
        }
        path
    }
}

impl Ord for RelPath {
    fn cmp(&self, other: &Self) -> Ordering {
        self.segments().cmp(other.segments())
    }
}

impl PartialOrd for RelPath {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for RelPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl TryFrom<String> for RelPath {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s).ok_or_else(|| format!("invalid relative path '{s}'"))
    }
}

impl From<RelPath> for String {
    fn from(p: RelPath) -> Self {
        p.0
    }
}

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// Kind of a filesystem object after symlink resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKind::File => write!(f, "file"),
            EntryKind::Directory => write!(f, "directory"),
        }
    }
}

/// One file or directory inside a tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathEntry {
    pub relative_path: RelPath,
    pub kind: EntryKind,
    pub modified_at: SystemTime,
}

impl PathEntry {
    pub fn file(relative_path: RelPath, modified_at: SystemTime) -> Self {
        Self {
            relative_path,
            kind: EntryKind::File,
            modified_at,
        }
    }

    pub fn directory(relative_path: RelPath, modified_at: SystemTime) -> Self {
        Self {
            relative_path,
            kind: EntryKind::Directory,
            modified_at,
        }
    }

    /// Modification time truncated to whole seconds since the Unix epoch.
    ///
    /// Timestamps are compared at this resolution; filesystems disagree on
    /// anything finer.
    pub fn modified_secs(&self) -> i64 {
        match self.modified_at.duration_since(UNIX_EPOCH) {
            Ok(after) => after.as_secs() as i64,
            Err(before) => {
                let d = before.duration();
                let secs = d.as_secs() as i64;
                if d.subsec_nanos() > 0 {
                    -secs - 1
                } else {
                    -secs
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// TreeListing
// ---------------------------------------------------------------------------

/// Every entry of one tree after ignore filtering, keyed by relative path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeListing {
    entries: BTreeMap<RelPath, PathEntry>,
}

impl TreeListing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry, returning the previous one at the same path.
    pub fn insert(&mut self, entry: PathEntry) -> Option<PathEntry> {
        self.entries.insert(entry.relative_path.clone(), entry)
    }

    pub fn get(&self, path: &RelPath) -> Option<&PathEntry> {
        self.entries.get(path)
    }

    pub fn contains(&self, path: &RelPath) -> bool {
        self.entries.contains_key(path)
    }

    pub fn remove(&mut self, path: &RelPath) -> Option<PathEntry> {
        self.entries.remove(path)
    }

    /// Drop every entry strictly beneath `dir`, returning how many went.
    pub fn remove_descendants(&mut self, dir: &RelPath) -> usize {
        let before = self.entries.len();
        self.entries.retain(|path, _| !dir.is_ancestor_of(path));
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in path order (ancestors first).
    pub fn iter(&self) -> impl Iterator<Item = &PathEntry> {
        self.entries.values()
    }

    pub fn paths(&self) -> impl Iterator<Item = &RelPath> {
        self.entries.keys()
    }

    pub fn file_count(&self) -> usize {
        self.iter().filter(|e| e.kind == EntryKind::File).count()
    }

    pub fn directory_count(&self) -> usize {
        self.iter().filter(|e| e.kind == EntryKind::Directory).count()
    }
}

impl FromIterator<PathEntry> for TreeListing {
    fn from_iter<I: IntoIterator<Item = PathEntry>>(iter: I) -> Self {
        let mut listing = Self::new();
        for entry in iter {
            listing.insert(entry);
        }
        listing
    }
}

impl<'a> IntoIterator for &'a TreeListing {
    type Item = &'a PathEntry;
    type IntoIter = std::collections::btree_map::Values<'a, RelPath, PathEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.values()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
