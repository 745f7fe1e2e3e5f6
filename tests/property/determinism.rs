//! Property-based tests for hashing and diff guarantees

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use minivcs::storage::{
    diff_trees, Change, CommitBuilder, EntryKind, ObjectId, Repository, Signature, Tree, TreeEntry,
};
use proptest::prelude::*;
use tempfile::TempDir;

fn blob_tree(files: &BTreeMap<String, String>) -> Tree {
    Tree::new(
        files
            .iter()
            .map(|(name, content)| {
                TreeEntry::new(EntryKind::Blob, ObjectId::hash(content.as_bytes()), name.as_str())
                    .unwrap()
            })
            .collect(),
    )
    .unwrap()
}

/// Storing the same bytes always yields the same id, and reads them back.
#[test]
fn test_put_determinism_property() {
    let dir = TempDir::new().unwrap();
    let repo = Repository::init(dir.path()).unwrap();
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&any::<Vec<u8>>(), |content| {
            let first = repo.put_object(&content).unwrap();
            let second = repo.put_object(&content).unwrap();

            assert_eq!(first, second);
            assert_eq!(first, ObjectId::hash(&content));
            assert_eq!(repo.get_object(&first).unwrap(), content);
            Ok(())
        })
        .unwrap();
}

/// Input order never affects a tree's hash.
#[test]
fn test_tree_order_independence_property() {
    let mut runner = proptest::test_runner::TestRunner::default();
    let names = prop::collection::btree_set("[a-z0-9_-]{1,12}", 1..12)
        .prop_flat_map(|set: BTreeSet<String>| {
            let sorted: Vec<String> = set.into_iter().collect();
            (Just(sorted.clone()), Just(sorted).prop_shuffle())
        });

    runner
        .run(&names, |(sorted, shuffled)| {
            let entries = |names: &[String]| -> Vec<TreeEntry> {
                names
                    .iter()
                    .map(|n| {
                        TreeEntry::new(EntryKind::Blob, ObjectId::hash(n.as_bytes()), n.as_str())
                            .unwrap()
                    })
                    .collect()
            };

            let a = Tree::new(entries(&sorted)).unwrap();
            let b = Tree::new(entries(&shuffled)).unwrap();
            assert_eq!(a.id(), b.id());
            assert_eq!(a.serialize(), b.serialize());
            Ok(())
        })
        .unwrap();
}

/// A written commit reads back with every field intact.
#[test]
fn test_commit_roundtrip_property() {
    let dir = TempDir::new().unwrap();
    let repo = Repository::init(dir.path()).unwrap();
    let blob = repo.write_blob(b"content").unwrap();
    let tree = repo
        .create_tree(vec![TreeEntry::blob(blob, "file").unwrap()])
        .unwrap();
    let mut runner = proptest::test_runner::TestRunner::default();

    let strategy = (
        "[A-Za-z]{1,10}",
        "[a-z]{1,8}@[a-z]{1,8}\\.com",
        "[ -~\n]{0,40}",
        0i64..4_000_000_000,
        0u32..1_000_000_000,
    );

    runner
        .run(&strategy, |(name, email, body, secs, nanos)| {
            let timestamp: DateTime<Utc> = DateTime::from_timestamp(secs, nanos).unwrap();
            let message = format!("x{}", body);

            let written = CommitBuilder::new(repo.objects())
                .tree(tree)
                .author(Signature::new(name, email).unwrap())
                .message(message.clone())
                .timestamp(timestamp)
                .write()
                .unwrap();
            let read = repo.get_commit(written.id).unwrap();

            assert_eq!(read, written);
            assert_eq!(read.tree, tree);
            assert_eq!(read.parent, None);
            assert_eq!(read.timestamp, timestamp);
            assert_eq!(read.message, message);
            Ok(())
        })
        .unwrap();
}

/// Swapping the sides of a diff swaps added and removed.
#[test]
fn test_diff_symmetry_property() {
    let mut runner = proptest::test_runner::TestRunner::default();
    let side = || prop::collection::btree_map("[a-e]{1,2}", "[a-c]{0,2}", 1..8);

    runner
        .run(&(side(), side()), |(old, new)| {
            let old = blob_tree(&old);
            let new = blob_tree(&new);

            let forward = diff_trees(&old, &new);
            let flipped: Vec<Change> = diff_trees(&new, &old)
                .into_iter()
                .map(|c| Change::new(c.name, c.kind.inverse()))
                .collect();
            assert_eq!(forward, flipped);
            Ok(())
        })
        .unwrap();
}
