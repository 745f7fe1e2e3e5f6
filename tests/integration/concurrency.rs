//! Concurrent commits, switches and deletes against shared refs

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Barrier};
use std::thread;

use minivcs::storage::{
    BranchName, CommitBuilder, Repository, Signature, StorageError, StorageResult,
};

use super::test_utils::{flat_tree, init_repo, ALICE};

const THREADS: usize = 4;
const COMMITS_PER_THREAD: usize = 5;
const ROUNDS: usize = 200;

/// Run `op` until it returns something other than a retriable error.
fn retrying<T>(mut op: impl FnMut() -> StorageResult<T>) -> StorageResult<T> {
    let mut attempts = 0usize;
    loop {
        match op() {
            Err(e) if e.is_retriable() => {
                attempts += 1;
                assert!(attempts < 10_000, "livelock: {}", e);
                thread::yield_now();
            }
            other => return other,
        }
    }
}

/// Open a fresh handle on `root` in a new thread and run `op` on it once
/// every participant is ready.
fn spawn_on<T: Send + 'static>(
    root: PathBuf,
    start: Arc<Barrier>,
    op: impl FnOnce(&Repository) -> T + Send + 'static,
) -> thread::JoinHandle<T> {
    thread::spawn(move || {
        let repo = Repository::open(&root).unwrap();
        start.wait();
        op(&repo)
    })
}

/// Every thread opens its own handle, so the branch lock file is the only
/// thing coordinating them. Conflicts are retried; none may be lost.
#[test]
fn separate_handles_never_lose_updates() {
    let (dir, repo) = init_repo();
    let tree = flat_tree(&repo, &[("shared.txt", "content")]);

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let root = dir.path().to_path_buf();
            thread::spawn(move || {
                let repo = Repository::open(&root).unwrap();
                let mut conflicts = 0usize;
                for i in 0..COMMITS_PER_THREAD {
                    let message = format!("thread {} commit {}", t, i);
                    loop {
                        match repo.create_commit(tree, None, ALICE, &message) {
                            Ok(_) => break,
                            Err(e) if e.is_retriable() => {
                                conflicts += 1;
                                assert!(conflicts < 10_000, "livelock");
                                thread::yield_now();
                            }
                            Err(e) => panic!("unexpected error: {}", e),
                        }
                    }
                }
                conflicts
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let log = repo.log(THREADS * COMMITS_PER_THREAD + 10).unwrap();
    assert_eq!(log.len(), THREADS * COMMITS_PER_THREAD);

    // one linear chain ending at a root commit
    for pair in log.windows(2) {
        assert_eq!(pair[0].parent, Some(pair[1].id));
    }
    assert!(log.last().unwrap().is_root());

    let messages: HashSet<&str> = log.iter().map(|c| c.message.as_str()).collect();
    assert_eq!(messages.len(), THREADS * COMMITS_PER_THREAD);
}

/// Clones of one handle serialize on the handle's own commit lock.
#[test]
fn shared_handle_commits_without_conflict() {
    let (_dir, repo) = init_repo();
    let tree = flat_tree(&repo, &[("a", "1")]);

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let repo = repo.clone();
            thread::spawn(move || {
                for i in 0..COMMITS_PER_THREAD {
                    repo.create_commit(tree, None, ALICE, &format!("{}-{}", t, i))
                        .unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let log = repo.log(100).unwrap();
    assert_eq!(log.len(), THREADS * COMMITS_PER_THREAD);
    for pair in log.windows(2) {
        assert_eq!(pair[0].parent, Some(pair[1].id));
    }
}

/// Two commits prepared on the same tip: the first advance wins, the
/// second is rejected and the tip is not overwritten.
#[test]
fn racing_advance_reports_conflict() {
    let (_dir, repo) = init_repo();
    let tree = flat_tree(&repo, &[("a", "1")]);
    let base = repo.create_commit(tree, None, ALICE, "base").unwrap();
    let main = BranchName::main();

    let prepare = |message: &str| {
        CommitBuilder::new(repo.objects())
            .tree(tree)
            .parent(base.id)
            .author(Signature::parse(ALICE).unwrap())
            .message(message)
            .write()
            .unwrap()
    };
    let first = prepare("first");
    let second = prepare("second");

    repo.advance_tip(&main, Some(base.id), first.id).unwrap();
    let err = repo.advance_tip(&main, Some(base.id), second.id).unwrap_err();

    assert!(matches!(err, StorageError::ConcurrentModification { .. }));
    assert!(err.is_conflict());
    assert_eq!(repo.head_commit().unwrap(), first.id);
}

/// A switch to a branch and a delete of that branch from two handles: exactly
/// one wins, and HEAD always names a branch that exists afterwards.
#[test]
fn switch_and_delete_keep_head_resolvable() {
    let (dir, repo) = init_repo();
    let feature = BranchName::new("feature").unwrap();

    for round in 0..ROUNDS {
        repo.create_branch("feature").unwrap();
        let start = Arc::new(Barrier::new(2));

        let switcher = spawn_on(dir.path().to_path_buf(), start.clone(), |repo| {
            retrying(|| repo.switch_branch("feature"))
        });
        let deleter = spawn_on(dir.path().to_path_buf(), start, |repo| {
            retrying(|| repo.delete_branch("feature"))
        });
        let switched = switcher.join().unwrap();
        let deleted = deleter.join().unwrap();

        let current = repo
            .current_branch()
            .unwrap_or_else(|e| panic!("round {}: HEAD broken: {}", round, e));

        match (&switched, &deleted) {
            (Ok(()), Err(StorageError::CannotDeleteCurrentBranch(_))) => {
                assert_eq!(current, feature);
                repo.switch_branch("main").unwrap();
                repo.delete_branch("feature").unwrap();
            }
            (Err(StorageError::BranchNotFound(_)), Ok(())) => {
                assert_eq!(current, BranchName::main());
                assert!(!repo.refs().branch_exists(&feature));
            }
            other => panic!("round {}: unexpected outcome {:?}", round, other),
        }
    }

    assert!(!dir.path().join(".minivcs/HEAD.lock").exists());
}

/// Deleting a branch while another handle keeps committing on it never
/// brings the branch back, and commits on the deleted branch fail cleanly.
#[test]
fn delete_while_committing_never_resurrects() {
    let (dir, repo) = init_repo();
    let tree = flat_tree(&repo, &[("a", "1")]);
    let feature = BranchName::new("feature").unwrap();

    for round in 0..ROUNDS / 4 {
        repo.create_branch("feature").unwrap();
        repo.switch_branch("feature").unwrap();
        let start = Arc::new(Barrier::new(2));

        let committer = spawn_on(dir.path().to_path_buf(), start.clone(), move |repo| {
            let mut landed = Vec::new();
            for i in 0..COMMITS_PER_THREAD {
                match retrying(|| repo.create_commit(tree, None, ALICE, &format!("c{}", i))) {
                    Ok(commit) => landed.push(commit.id),
                    // HEAD moved to main and feature was removed in between
                    Err(StorageError::BranchNotFound(_))
                    | Err(StorageError::HeadUnresolvable(_)) => {}
                    Err(e) => panic!("unexpected error: {}", e),
                }
            }
            landed
        });
        let deleter = spawn_on(dir.path().to_path_buf(), start, |repo| -> StorageResult<()> {
            retrying(|| repo.switch_branch("main"))?;
            retrying(|| repo.delete_branch("feature"))
        });
        let landed = committer.join().unwrap();
        deleter.join().unwrap().unwrap();

        assert!(
            !repo.refs().branch_exists(&feature),
            "round {}: deleted branch came back",
            round
        );
        assert!(!dir.path().join(".minivcs/refs/heads/feature.lock").exists());
        assert_eq!(repo.current_branch().unwrap(), BranchName::main());

        for id in &landed {
            assert!(repo.get_commit(*id).is_ok());
        }

        // main only ever holds one linear chain
        let log = repo.log(ROUNDS * COMMITS_PER_THREAD).unwrap();
        for pair in log.windows(2) {
            assert_eq!(pair[0].parent, Some(pair[1].id));
        }
    }
}
