//! Tree comparison.
//!
//! Both sides of a diff are name-sorted entry lists, so a single merge walk
//! classifies every name: only on the old side is `removed`, only on the new
//! side is `added`, on both with a different hash or type is `changed`.
//! Output is sorted by name so identical inputs always give identical output.

use std::cmp::Ordering;

use crate::storage::commit;
use crate::storage::error::StorageResult;
use crate::storage::object::ObjectStore;
use crate::storage::tree::{self, Tree, TreeEntry};
use crate::storage::types::{Change, ChangeKind, CommitId};

/// One step of the merge walk over two sorted entry lists.
enum Pair<'a> {
    Old(&'a TreeEntry),
    New(&'a TreeEntry),
    Both(&'a TreeEntry, &'a TreeEntry),
}

fn merge_entries<'a>(old: &'a [TreeEntry], new: &'a [TreeEntry]) -> Vec<Pair<'a>> {
    let mut pairs = Vec::with_capacity(old.len().max(new.len()));
    let (mut i, mut j) = (0, 0);

    while i < old.len() && j < new.len() {
        match old[i].name().cmp(new[j].name()) {
            Ordering::Less => {
                pairs.push(Pair::Old(&old[i]));
                i += 1;
            }
            Ordering::Greater => {
                pairs.push(Pair::New(&new[j]));
                j += 1;
            }
            Ordering::Equal => {
                pairs.push(Pair::Both(&old[i], &new[j]));
                i += 1;
                j += 1;
            }
        }
    }
    pairs.extend(old[i..].iter().map(Pair::Old));
    pairs.extend(new[j..].iter().map(Pair::New));
    pairs
}

/// Compare the top-level entries of two trees.
pub fn diff_trees(old: &Tree, new: &Tree) -> Vec<Change> {
    merge_entries(old.entries(), new.entries())
        .into_iter()
        .filter_map(|pair| match pair {
            Pair::Old(entry) => Some(Change::new(entry.name(), ChangeKind::Removed)),
            Pair::New(entry) => Some(Change::new(entry.name(), ChangeKind::Added)),
            Pair::Both(a, b) if a.id() != b.id() || a.kind() != b.kind() => {
                Some(Change::new(a.name(), ChangeKind::Changed))
            }
            Pair::Both(..) => None,
        })
        .collect()
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", prefix, name)
    }
}

/// Report `entry` and, for a sub-tree, every blob below it as `kind`.
fn expand(
    store: &ObjectStore,
    prefix: &str,
    entry: &TreeEntry,
    kind: ChangeKind,
    out: &mut Vec<Change>,
) -> StorageResult<()> {
    let path = join(prefix, entry.name());
    match entry.as_tree() {
        None => out.push(Change::new(path, kind)),
        Some(id) => {
            let subtree = tree::read_tree(store, id)?;
            for child in subtree.entries() {
                expand(store, &path, child, kind, out)?;
            }
        }
    }
    Ok(())
}

fn walk(
    store: &ObjectStore,
    prefix: &str,
    old: &Tree,
    new: &Tree,
    out: &mut Vec<Change>,
) -> StorageResult<()> {
    for pair in merge_entries(old.entries(), new.entries()) {
        match pair {
            Pair::Old(entry) => expand(store, prefix, entry, ChangeKind::Removed, out)?,
            Pair::New(entry) => expand(store, prefix, entry, ChangeKind::Added, out)?,
            Pair::Both(a, b) if a.id() == b.id() && a.kind() == b.kind() => {}
            Pair::Both(a, b) => match (a.as_tree(), b.as_tree()) {
                (Some(old_id), Some(new_id)) => {
                    let old_sub = tree::read_tree(store, old_id)?;
                    let new_sub = tree::read_tree(store, new_id)?;
                    walk(store, &join(prefix, a.name()), &old_sub, &new_sub, out)?;
                }
                (None, None) => out.push(Change::new(join(prefix, a.name()), ChangeKind::Changed)),
                // a file became a directory or the other way round
                _ => {
                    expand(store, prefix, a, ChangeKind::Removed, out)?;
                    expand(store, prefix, b, ChangeKind::Added, out)?;
                }
            },
        }
    }
    Ok(())
}

/// Compare two trees all the way down, reporting blob paths joined with `/`.
pub fn diff_trees_recursive(store: &ObjectStore, old: &Tree, new: &Tree) -> StorageResult<Vec<Change>> {
    let mut out = Vec::new();
    walk(store, "", old, new, &mut out)?;
    out.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(out)
}

fn commit_tree(store: &ObjectStore, id: CommitId) -> StorageResult<Tree> {
    let commit = commit::read_commit(store, id)?;
    tree::read_tree(store, commit.tree)
}

/// compute the diff between the trees of two commits
pub fn diff_commits(store: &ObjectStore, old: CommitId, new: CommitId) -> StorageResult<Vec<Change>> {
    let old_tree = commit_tree(store, old)?;
    let new_tree = commit_tree(store, new)?;
    Ok(diff_trees(&old_tree, &new_tree))
}

/// like [`diff_commits`], descending into sub-trees
pub fn diff_commits_recursive(
    store: &ObjectStore,
    old: CommitId,
    new: CommitId,
) -> StorageResult<Vec<Change>> {
    let old_tree = commit_tree(store, old)?;
    let new_tree = commit_tree(store, new)?;
    diff_trees_recursive(store, &old_tree, &new_tree)
}
