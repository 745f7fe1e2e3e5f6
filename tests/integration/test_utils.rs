//! Shared setup for integration tests

use minivcs::storage::{Repository, TreeEntry, TreeId};
use tempfile::TempDir;

pub const ALICE: &str = "Alice <a@x.com>";

/// A freshly initialized repository in its own temp directory.
pub fn init_repo() -> (TempDir, Repository) {
    let dir = TempDir::new().unwrap();
    let repo = Repository::init(dir.path()).unwrap();
    (dir, repo)
}

/// Store `files` as blobs and build a flat tree of them.
pub fn flat_tree(repo: &Repository, files: &[(&str, &str)]) -> TreeId {
    let entries = files
        .iter()
        .map(|(name, content)| {
            let blob = repo.write_blob(content.as_bytes()).unwrap();
            TreeEntry::blob(blob, *name).unwrap()
        })
        .collect();
    repo.create_tree(entries).unwrap()
}
