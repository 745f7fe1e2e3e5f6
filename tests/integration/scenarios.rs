//! End-to-end flows through the public `Repository` API

use std::fs;

use minivcs::storage::{
    BranchName, Change, ChangeKind, CommitId, EntryKind, ErrorKind, ObjectId, Repository,
    StagedEntry, StorageError, TreeEntry, TreeId,
};

use super::test_utils::{flat_tree, init_repo, ALICE};

#[test]
fn init_lists_only_main() {
    let (_dir, repo) = init_repo();

    let branches = repo.list_branches().unwrap();
    assert_eq!(branches.len(), 1);
    assert_eq!(branches[0].name, BranchName::main());
    assert!(branches[0].is_current);
    assert_eq!(branches[0].tip, None);

    assert_eq!(repo.current_branch().unwrap().as_str(), "main");
    assert!(repo.log(10).unwrap().is_empty());
}

#[test]
fn on_disk_layout() {
    let (dir, repo) = init_repo();
    let meta = dir.path().join(".minivcs");

    assert_eq!(fs::read_to_string(meta.join("HEAD")).unwrap(), "ref: refs/heads/main");
    assert_eq!(fs::read_to_string(meta.join("refs/heads/main")).unwrap(), "");

    let tree = flat_tree(&repo, &[("a.txt", "hello")]);
    let commit = repo.create_commit(tree, None, ALICE, "first").unwrap();

    assert_eq!(
        fs::read_to_string(meta.join("refs/heads/main")).unwrap(),
        commit.id.to_string()
    );

    // every object file is named by the hash of its exact bytes
    for entry in fs::read_dir(meta.join("objects")).unwrap() {
        let entry = entry.unwrap();
        let bytes = fs::read(entry.path()).unwrap();
        assert_eq!(
            ObjectId::hash(&bytes).to_hex(),
            entry.file_name().to_string_lossy()
        );
    }

    let raw = fs::read_to_string(meta.join("objects").join(commit.id.to_string())).unwrap();
    assert!(raw.starts_with(&format!("tree {}\nauthor {}\ntimestamp ", tree, ALICE)));
    assert!(raw.ends_with("\n\nfirst"));
}

#[test]
fn first_commit_moves_main() {
    let (_dir, repo) = init_repo();
    let readme = repo.write_blob(b"# project\n").unwrap();
    let main_rs = repo.write_blob(b"fn main() {}\n").unwrap();
    let tree = repo
        .create_tree_from_staged(&[
            StagedEntry::new("README.md", readme),
            StagedEntry::new("main.rs", main_rs),
        ])
        .unwrap();

    let commit = repo.create_commit(tree, None, ALICE, "first").unwrap();

    let main = BranchName::main();
    assert_eq!(repo.refs().resolve_branch(&main).unwrap(), Some(commit.id));

    let log = repo.log(1).unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0], commit);
    assert_eq!(log[0].parent, None);
    assert_eq!(log[0].author.to_string(), ALICE);
}

#[test]
fn feature_branch_leaves_main_alone() {
    let (_dir, repo) = init_repo();
    let base_tree = flat_tree(&repo, &[("a.txt", "1")]);
    let base = repo.create_commit(base_tree, None, ALICE, "base").unwrap();

    let feature = repo.create_branch("feature").unwrap();
    assert_eq!(repo.refs().resolve_branch(&feature).unwrap(), Some(base.id));

    repo.switch_branch("feature").unwrap();
    let work_tree = flat_tree(&repo, &[("a.txt", "2")]);
    let work = repo.create_commit(work_tree, None, ALICE, "work").unwrap();

    assert_eq!(repo.current_branch().unwrap(), feature);
    assert_eq!(repo.refs().resolve_branch(&feature).unwrap(), Some(work.id));
    assert_eq!(
        repo.refs().resolve_branch(&BranchName::main()).unwrap(),
        Some(base.id)
    );

    let ids: Vec<CommitId> = repo.log(10).unwrap().iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![work.id, base.id]);
}

#[test]
fn deleting_current_branch_is_invalid_state() {
    let (_dir, repo) = init_repo();
    repo.create_branch("feature").unwrap();
    repo.switch_branch("feature").unwrap();

    let err = repo.delete_branch("feature").unwrap_err();
    assert!(matches!(err, StorageError::CannotDeleteCurrentBranch(_)));
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    assert!(repo.refs().branch_exists(&BranchName::new("feature").unwrap()));
}

#[test]
fn single_file_change() {
    let (_dir, repo) = init_repo();
    let h1 = repo.put_object(b"one").unwrap();
    let h2 = repo.put_object(b"two").unwrap();

    let t1 = repo
        .create_tree(vec![TreeEntry::new(EntryKind::Blob, h1, "a.txt").unwrap()])
        .unwrap();
    let t2 = repo
        .create_tree(vec![TreeEntry::new(EntryKind::Blob, h2, "a.txt").unwrap()])
        .unwrap();
    let c1 = repo.create_commit(t1, None, ALICE, "one").unwrap();
    let c2 = repo.create_commit(t2, None, ALICE, "two").unwrap();

    assert_eq!(
        repo.diff_commits(c1.id, c2.id).unwrap(),
        vec![Change::new("a.txt", ChangeKind::Changed)]
    );
}

#[test]
fn missing_parent_is_not_found() {
    let (_dir, repo) = init_repo();
    let tree = flat_tree(&repo, &[("a", "1")]);
    let ghost = CommitId::new(ObjectId::hash(b"never written"));

    let err = repo.create_commit(tree, Some(ghost), ALICE, "msg").unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(repo.log(10).unwrap().is_empty());
}

#[test]
fn tree_hash_read_as_commit_is_not_found() {
    let (_dir, repo) = init_repo();
    let tree = flat_tree(&repo, &[("a", "1")]);

    let err = repo.get_commit(CommitId::new(tree.into())).unwrap_err();
    assert!(matches!(err, StorageError::CommitNotFound(_)));

    let blob = repo.put_object(b"plain text").unwrap();
    let err = repo.read_tree(TreeId::new(blob)).unwrap_err();
    assert!(matches!(err, StorageError::TreeNotFound(_)));
}

#[test]
fn invalid_branch_names() {
    let (_dir, repo) = init_repo();
    for name in ["", "has space", "a/b", "..", "x.lock"] {
        let err = repo.create_branch(name).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidName, "name {:?}", name);
    }
    assert_eq!(repo.switch_branch("").unwrap_err().kind(), ErrorKind::InvalidName);
    assert_eq!(repo.delete_branch("a b").unwrap_err().kind(), ErrorKind::InvalidName);
}

#[test]
fn reopen_sees_same_state() {
    let (dir, repo) = init_repo();
    let tree = flat_tree(&repo, &[("a", "1")]);
    let commit = repo.create_commit(tree, None, ALICE, "persisted").unwrap();
    drop(repo);

    let nested = dir.path().join("sub");
    fs::create_dir(&nested).unwrap();
    let repo = Repository::discover(&nested).unwrap();
    assert_eq!(repo.head_commit().unwrap(), commit.id);
    assert_eq!(repo.log(1).unwrap()[0].message, "persisted");
}

#[test]
fn recursive_diff_between_commits() {
    let (_dir, repo) = init_repo();
    let v1 = repo.write_blob(b"v1").unwrap();
    let v2 = repo.write_blob(b"v2").unwrap();

    let t1 = repo
        .create_tree_from_staged(&[
            StagedEntry::new("src/lib.rs", v1),
            StagedEntry::new("src/bin/tool.rs", v1),
        ])
        .unwrap();
    let t2 = repo
        .create_tree_from_staged(&[
            StagedEntry::new("src/lib.rs", v2),
            StagedEntry::new("src/bin/tool.rs", v1),
            StagedEntry::new("Cargo.toml", v1),
        ])
        .unwrap();
    let c1 = repo.create_commit(t1, None, ALICE, "one").unwrap();
    let c2 = repo.create_commit(t2, None, ALICE, "two").unwrap();

    assert_eq!(
        repo.diff_commits_recursive(c1.id, c2.id).unwrap(),
        vec![
            Change::new("Cargo.toml", ChangeKind::Added),
            Change::new("src/lib.rs", ChangeKind::Changed),
        ]
    );
}
