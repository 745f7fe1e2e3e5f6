//!  Branch and reference management.
//!
//!  Branch refs are files under `refs/heads/` holding a commit id, or nothing
//!  for a branch with no commits yet. `HEAD` is a symbolic ref naming the
//!  current branch (`ref: refs/heads/<name>`), never a commit id.
//!
//!  Refs and HEAD are the only mutable state in a repository and may be
//!  updated by several processes at once. Every update:
//! - takes `<ref>.lock` with create-new semantics (a held lock is a conflict),
//! - checks the expected current value under the lock,
//! - writes the new value to a temp file and renames it over the ref.
//!
//! A reader therefore sees either the old or the new value, never a mix.
//!
//! Switching and deleting branches both hold `HEAD.lock` while they check and
//! act, so HEAD never names a branch that a concurrent delete removed.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::{BranchName, CommitId};

/// prefix of HEAD's content
const HEAD_PREFIX: &str = "ref: refs/heads/";

/// a branch as reported by [`RefManager::list_branches`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BranchInfo {
    pub name: BranchName,
    pub is_current: bool,
    /// `None` while the branch has no commits
    pub tip: Option<CommitId>,
}

/// Exclusive lock on one ref file (or HEAD), released on drop.
struct RefLock {
    path: PathBuf,
}

impl RefLock {
    fn acquire(target: &Path) -> StorageResult<Self> {
        let mut path = target.as_os_str().to_owned();
        path.push(BranchName::LOCK_SUFFIX);
        let path = PathBuf::from(path);

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => Ok(Self { path }),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                warn!(lock = %path.display(), "ref is locked by another writer");
                Err(StorageError::RefLocked { lock: path })
            }
            Err(e) => Err(StorageError::Io(e)),
        }
    }
}

impl Drop for RefLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(lock = %self.path.display(), error = %e, "failed to release ref lock");
        }
    }
}

/// Manages branch refs and HEAD.
#[derive(Debug, Clone)]
pub struct RefManager {
    /// the `.minivcs` directory; temp files are staged here
    meta_dir: PathBuf,
    heads_dir: PathBuf,
    head_path: PathBuf,
}

impl RefManager {
    pub(crate) fn new(meta_dir: impl Into<PathBuf>) -> Self {
        let meta_dir = meta_dir.into();
        Self {
            heads_dir: meta_dir.join("refs").join("heads"),
            head_path: meta_dir.join("HEAD"),
            meta_dir,
        }
    }

    /// Lay out `refs/heads/`, an unborn `initial` branch and HEAD naming it.
    pub(crate) fn init(&self, initial: &BranchName) -> StorageResult<()> {
        fs::create_dir_all(&self.heads_dir)?;
        self.write_atomic(&self.ref_path(initial), "")?;
        self.write_atomic(&self.head_path, &format!("{}{}", HEAD_PREFIX, initial))?;
        Ok(())
    }

    fn ref_path(&self, branch: &BranchName) -> PathBuf {
        self.meta_dir.join(branch.as_ref_path())
    }

    /// Write through a temp file in the metadata directory and rename it
    /// into place, so the target is replaced all at once.
    fn write_atomic(&self, path: &Path, contents: &str) -> StorageResult<()> {
        let tmp = self.temp_file(contents)?;
        tmp.persist(path).map_err(|e| StorageError::Io(e.error))?;
        Ok(())
    }

    fn temp_file(&self, contents: &str) -> StorageResult<tempfile::NamedTempFile> {
        let mut tmp = tempfile::Builder::new()
            .prefix(".tmp-")
            .tempfile_in(&self.meta_dir)?;
        tmp.write_all(contents.as_bytes())?;
        tmp.as_file().sync_all()?;
        Ok(tmp)
    }

    fn parse_tip(path: &Path, contents: &str) -> StorageResult<Option<CommitId>> {
        let contents = contents.trim();
        if contents.is_empty() {
            return Ok(None);
        }
        CommitId::from_hex(contents)
            .map(Some)
            .map_err(|e| StorageError::corrupted(path, e.to_string()))
    }

    /// Check if a branch exists.
    pub fn branch_exists(&self, branch: &BranchName) -> bool {
        self.ref_path(branch).is_file()
    }

    /// Resolve a branch name to its tip; `None` for an unborn branch.
    pub fn resolve_branch(&self, branch: &BranchName) -> StorageResult<Option<CommitId>> {
        let path = self.ref_path(branch);
        match fs::read_to_string(&path) {
            Ok(contents) => Self::parse_tip(&path, &contents),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(StorageError::BranchNotFound(branch.clone()))
            }
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    /// The branch name HEAD points at, without checking that it exists.
    fn head_target(&self) -> StorageResult<BranchName> {
        let contents = match fs::read_to_string(&self.head_path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StorageError::HeadUnresolvable("HEAD file not found".to_string()))
            }
            Err(e) => return Err(StorageError::Io(e)),
        };

        let name = contents.trim().strip_prefix(HEAD_PREFIX).ok_or_else(|| {
            StorageError::HeadUnresolvable(format!("HEAD is not a branch ref: '{}'", contents.trim()))
        })?;

        BranchName::new(name)
            .map_err(|e| StorageError::HeadUnresolvable(format!("HEAD names '{}': {}", name, e)))
    }

    /// The branch HEAD points at. Fails if HEAD is missing, garbled, or names
    /// a branch that does not exist.
    pub fn current_branch(&self) -> StorageResult<BranchName> {
        let branch = self.head_target()?;
        if !self.branch_exists(&branch) {
            return Err(StorageError::HeadUnresolvable(format!(
                "HEAD points at missing branch '{}'",
                branch
            )));
        }
        Ok(branch)
    }

    /// The current branch together with its tip.
    pub fn current_tip(&self) -> StorageResult<(BranchName, Option<CommitId>)> {
        let branch = self.current_branch()?;
        let tip = match self.resolve_branch(&branch) {
            Err(StorageError::BranchNotFound(_)) => {
                return Err(StorageError::HeadUnresolvable(format!(
                    "HEAD points at missing branch '{}'",
                    branch
                )))
            }
            other => other?,
        };
        Ok((branch, tip))
    }

    /// Create a new branch pointing at `target` (`None` for unborn).
    ///
    /// Never replaces an existing ref, even one created concurrently.
    pub fn create_branch(&self, branch: &BranchName, target: Option<CommitId>) -> StorageResult<()> {
        let path = self.ref_path(branch);
        if path.exists() {
            return Err(StorageError::BranchAlreadyExists(branch.clone()));
        }

        let contents = target.map(|id| id.to_string()).unwrap_or_default();
        let tmp = self.temp_file(&contents)?;
        match tmp.persist_noclobber(&path) {
            Ok(_) => {}
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
                return Err(StorageError::BranchAlreadyExists(branch.clone()))
            }
            Err(e) => return Err(StorageError::Io(e.error)),
        }

        info!(branch = %branch, tip = ?target.map(|t| t.short()), "created branch");
        Ok(())
    }

    /// Delete a branch. The current branch cannot be deleted.
    ///
    /// HEAD stays locked from the current-branch check until the ref is gone,
    /// so a concurrent switch cannot point HEAD at the branch being removed.
    pub fn delete_branch(&self, branch: &BranchName) -> StorageResult<()> {
        let _head_lock = RefLock::acquire(&self.head_path)?;
        if self.head_target()? == *branch {
            return Err(StorageError::CannotDeleteCurrentBranch(branch.clone()));
        }

        let path = self.ref_path(branch);
        if !path.is_file() {
            return Err(StorageError::BranchNotFound(branch.clone()));
        }

        let _lock = RefLock::acquire(&path)?;
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StorageError::BranchNotFound(branch.clone()))
            }
            Err(e) => return Err(StorageError::Io(e)),
        }

        info!(branch = %branch, "deleted branch");
        Ok(())
    }

    /// Point HEAD at another existing branch.
    ///
    /// The existence check happens under the HEAD lock, which every delete
    /// also holds.
    pub fn switch_branch(&self, branch: &BranchName) -> StorageResult<()> {
        let _head_lock = RefLock::acquire(&self.head_path)?;
        if !self.branch_exists(branch) {
            return Err(StorageError::BranchNotFound(branch.clone()));
        }

        self.write_atomic(&self.head_path, &format!("{}{}", HEAD_PREFIX, branch))?;

        info!(branch = %branch, "switched branch");
        Ok(())
    }

    /// Move a branch from `expected` to `new_tip`, only if it still points
    /// at `expected` (`None` meaning unborn).
    ///
    /// This provides compare-and-swap semantics for safe concurrent updates.
    /// Returns `ConcurrentModification` if the branch moved, and `RefLocked`
    /// if another writer currently holds its lock.
    pub fn advance_tip(
        &self,
        branch: &BranchName,
        expected: Option<CommitId>,
        new_tip: CommitId,
    ) -> StorageResult<()> {
        let path = self.ref_path(branch);
        if !path.is_file() {
            return Err(StorageError::BranchNotFound(branch.clone()));
        }

        let _lock = RefLock::acquire(&path)?;
        let current = self.resolve_branch(branch)?;

        if current != expected {
            warn!(
                branch = %branch,
                expected = ?expected.map(|e| e.short()),
                found = ?current.map(|c| c.short()),
                "branch moved underneath update"
            );
            return Err(StorageError::ConcurrentModification {
                branch: branch.clone(),
            });
        }

        self.write_atomic(&path, &new_tip.to_string())?;
        info!(branch = %branch, tip = %new_tip.short(), "advanced branch");
        Ok(())
    }

    /// All branches, sorted by name.
    ///
    /// Fails with `HeadUnresolvable` when HEAD does not name an existing
    /// branch, since then no branch could be reported as current.
    pub fn list_branches(&self) -> StorageResult<Vec<BranchInfo>> {
        let current = self.current_branch()?;

        let mut branches = Vec::new();
        for dir_entry in fs::read_dir(&self.heads_dir)? {
            let dir_entry = dir_entry?;
            if !dir_entry.file_type()?.is_file() {
                continue;
            }
            let file_name = dir_entry.file_name();
            // lock files and anything else that is not a valid name
            let Some(name) = file_name.to_str().and_then(|n| BranchName::new(n).ok()) else {
                debug!(file = ?file_name, "skipping non-branch file in refs/heads");
                continue;
            };

            let tip = match self.resolve_branch(&name) {
                Ok(tip) => tip,
                // deleted between read_dir and now
                Err(StorageError::BranchNotFound(_)) => continue,
                Err(e) => return Err(e),
            };

            branches.push(BranchInfo {
                is_current: name == current,
                name,
                tip,
            });
        }

        branches.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(branches)
    }
}
