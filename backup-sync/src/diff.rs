//! Diff engine: reconcile two listings into an [`ActionPlan`].
//!
//! Pure; no filesystem access. Timestamps compare at whole seconds.

use std::cmp::Ordering;
use std::fmt;

use serde::Serialize;

use backup_core::{EntryKind, RelPath, TreeListing};

/// One category of mutating actions, gated by its own consent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Create,
    Update,
    Delete,
}

impl Category {
    /// Order in which consent is requested.
    pub const ALL: [Category; 3] = [Category::Create, Category::Update, Category::Delete];

    /// Yes/no question put to the user.
    pub fn question(self) -> &'static str {
        match self {
            Category::Create => "Copy new entries to the backup?",
            Category::Update => "Overwrite outdated files in the backup?",
            Category::Delete => "Delete entries missing from the source?",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Create => write!(f, "create"),
            Category::Update => write!(f, "update"),
            Category::Delete => write!(f, "delete"),
        }
    }
}

/// A path whose destination entry has the other kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KindChange {
    pub path: RelPath,
    pub source: EntryKind,
    pub destination: EntryKind,
}

/// What it takes to make the destination mirror the source.
///
/// `to_create`, `to_update` and `to_delete` are pairwise disjoint.
/// Create and update are ordered ancestors first; delete descendants first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActionPlan {
    pub to_create: Vec<RelPath>,
    pub to_update: Vec<RelPath>,
    pub to_delete: Vec<RelPath>,
    /// Subset of `to_create` that replaces an entry of the other kind.
    pub kind_changes: Vec<KindChange>,
    /// Files whose backup copy is newer than the source. Left alone.
    pub newer_in_destination: Vec<RelPath>,
    /// Entries present on both sides needing no action.
    pub unchanged: usize,
}

impl ActionPlan {
    pub fn paths(&self, category: Category) -> &[RelPath] {
        match category {
            Category::Create => &self.to_create,
            Category::Update => &self.to_update,
            Category::Delete => &self.to_delete,
        }
    }

    /// Number of mutating actions across all categories.
    pub fn action_count(&self) -> usize {
        self.to_create.len() + self.to_update.len() + self.to_delete.len()
    }

    pub fn is_empty(&self) -> bool {
        self.action_count() == 0
    }

    pub fn kind_change(&self, path: &RelPath) -> Option<&KindChange> {
        self.kind_changes.iter().find(|c| &c.path == path)
    }
}

/// Compute the plan that brings `destination` in line with `source`.
pub fn compute_plan(source: &TreeListing, destination: &TreeListing) -> ActionPlan {
    let mut plan = ActionPlan::default();

    for entry in source {
        let path = &entry.relative_path;
        let Some(existing) = destination.get(path) else {
            tracing::debug!("to back up (new {}): {path}", entry.kind);
            plan.to_create.push(path.clone());
            continue;
        };

        if existing.kind != entry.kind {
            tracing::warn!(
                "kind changed: {path} is a {} in the source but a {} in the backup",
                entry.kind,
                existing.kind
            );
            plan.to_create.push(path.clone());
            plan.kind_changes.push(KindChange {
                path: path.clone(),
                source: entry.kind,
                destination: existing.kind,
            });
            continue;
        }

        if entry.kind == EntryKind::Directory {
            plan.unchanged += 1;
            continue;
        }

        match entry.modified_secs().cmp(&existing.modified_secs()) {
            Ordering::Greater => {
                tracing::debug!("to back up (modified): {path}");
                plan.to_update.push(path.clone());
            }
            Ordering::Less => {
                tracing::warn!("modified in backup, leaving it alone: {path}");
                plan.newer_in_destination.push(path.clone());
            }
            Ordering::Equal => {
                tracing::trace!("unchanged: {path}");
                plan.unchanged += 1;
            }
        }
    }

    for entry in destination {
        if !source.contains(&entry.relative_path) {
            tracing::debug!("to delete: {}", entry.relative_path);
            plan.to_delete.push(entry.relative_path.clone());
        }
    }
    // Listings iterate ancestors first; deletion needs the reverse.
    plan.to_delete.reverse();

    tracing::info!(
        "to back up: {} (new: {}, modified: {}), to delete: {}, unchanged: {}",
        plan.to_create.len() + plan.to_update.len(),
        plan.to_create.len(),
        plan.to_update.len(),
        plan.to_delete.len(),
        plan.unchanged,
    );
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    use backup_core::PathEntry;

    fn rel(s: &str) -> RelPath {
        RelPath::parse(s).unwrap()
    }

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    fn file(path: &str, secs: u64) -> PathEntry {
        PathEntry::file(rel(path), at(secs))
    }

    fn dir(path: &str) -> PathEntry {
        PathEntry::directory(rel(path), at(1))
    }

    fn listing(entries: Vec<PathEntry>) -> TreeListing {
        entries.into_iter().collect()
    }

    fn strs(paths: &[RelPath]) -> Vec<&str> {
        paths.iter().map(RelPath::as_str).collect()
    }

    #[test]
    fn new_file_is_created() {
        let plan = compute_plan(&listing(vec![file("a.txt", 10)]), &TreeListing::new());
        assert_eq!(strs(&plan.to_create), vec!["a.txt"]);
        assert!(plan.to_update.is_empty());
        assert!(plan.to_delete.is_empty());
    }

    #[test]
    fn newer_source_file_is_updated() {
        let plan = compute_plan(
            &listing(vec![file("b.txt", 20)]),
            &listing(vec![file("b.txt", 10)]),
        );
        assert_eq!(strs(&plan.to_update), vec!["b.txt"]);
        assert!(plan.to_create.is_empty());
    }

    #[test]
    fn equal_timestamps_are_a_no_op() {
        let plan = compute_plan(
            &listing(vec![file("b.txt", 10)]),
            &listing(vec![file("b.txt", 10)]),
        );
        assert!(plan.is_empty());
        assert_eq!(plan.unchanged, 1);
    }

    #[test]
    fn subsecond_differences_count_as_equal() {
        let src = PathEntry::file(rel("c.txt"), at(10) + Duration::from_millis(900));
        let dst = PathEntry::file(rel("c.txt"), at(10) + Duration::from_millis(100));
        let plan = compute_plan(&listing(vec![src]), &listing(vec![dst]));
        assert!(plan.is_empty());
    }

    #[test]
    fn newer_destination_is_reported_not_overwritten() {
        let plan = compute_plan(
            &listing(vec![file("b.txt", 10)]),
            &listing(vec![file("b.txt", 20)]),
        );
        assert!(plan.is_empty());
        assert_eq!(strs(&plan.newer_in_destination), vec!["b.txt"]);
    }

    #[test]
    fn matching_directories_are_a_no_op() {
        let plan = compute_plan(&listing(vec![dir("d")]), &listing(vec![dir("d")]));
        assert!(plan.is_empty());
    }

    #[test]
    fn stale_subtree_is_deleted_descendants_first() {
        let dest = listing(vec![
            dir("old"),
            file("old/a.txt", 1),
            dir("old/sub"),
            file("old/sub/b.txt", 1),
            file("keep.txt", 1),
        ]);
        let src = listing(vec![file("keep.txt", 1)]);
        let plan = compute_plan(&src, &dest);
        assert_eq!(
            strs(&plan.to_delete),
            vec!["old/sub/b.txt", "old/sub", "old/a.txt", "old"]
        );
    }

    #[test]
    fn creates_are_ordered_ancestors_first() {
        let src = listing(vec![
            file("z.txt", 1),
            file("new/sub/deep.txt", 1),
            dir("new"),
            dir("new/sub"),
            file("new-sibling.txt", 1),
        ]);
        let plan = compute_plan(&src, &TreeListing::new());
        assert_eq!(
            strs(&plan.to_create),
            vec!["new", "new/sub", "new/sub/deep.txt", "new-sibling.txt", "z.txt"]
        );
    }

    #[test]
    fn file_replaced_by_directory_is_a_flagged_create() {
        let src = listing(vec![dir("x"), file("x/a.txt", 1)]);
        let dest = listing(vec![file("x", 1)]);
        let plan = compute_plan(&src, &dest);
        assert_eq!(strs(&plan.to_create), vec!["x", "x/a.txt"]);
        assert!(plan.to_delete.is_empty());
        let change = plan.kind_change(&rel("x")).expect("flagged");
        assert_eq!(change.source, EntryKind::Directory);
        assert_eq!(change.destination, EntryKind::File);
    }

    #[test]
    fn directory_replaced_by_file_deletes_old_contents() {
        let src = listing(vec![file("x", 5)]);
        let dest = listing(vec![dir("x"), file("x/c.txt", 1)]);
        let plan = compute_plan(&src, &dest);
        assert_eq!(strs(&plan.to_create), vec!["x"]);
        assert_eq!(strs(&plan.to_delete), vec!["x/c.txt"]);
        assert_eq!(plan.kind_changes.len(), 1);
    }

    #[test]
    fn categories_are_pairwise_disjoint() {
        let src = listing(vec![
            file("a", 5),
            file("b", 5),
            dir("c"),
            file("c/d", 5),
            file("e", 1),
            dir("f"),
        ]);
        let dest = listing(vec![
            file("b", 1),
            file("c", 1),
            file("e", 9),
            file("f", 1),
            file("gone", 1),
            dir("old"),
            file("old/x", 1),
        ]);
        let plan = compute_plan(&src, &dest);

        let mut seen = HashSet::new();
        for category in Category::ALL {
            for path in plan.paths(category) {
                assert!(seen.insert(path.clone()), "{path} appears twice");
            }
        }
        assert_eq!(plan.action_count(), seen.len());
        assert_eq!(strs(&plan.to_create), vec!["a", "c", "c/d", "f"]);
        assert_eq!(strs(&plan.to_update), vec!["b"]);
        assert_eq!(strs(&plan.to_delete), vec!["old/x", "old", "gone"]);
        assert_eq!(strs(&plan.newer_in_destination), vec!["e"]);
    }

    #[test]
    fn identical_listings_produce_empty_plan() {
        let entries = vec![dir("d"), file("d/a", 3), file("b", 4)];
        let plan = compute_plan(&listing(entries.clone()), &listing(entries));
        assert!(plan.is_empty());
        assert_eq!(plan.unchanged, 3);
    }
}
