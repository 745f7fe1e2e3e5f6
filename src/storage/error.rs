//! Storage layer error types
//!
//! All errors that can occur during storage operations are defined here.
//! We use `thiserror` for ergonomic error definition and better error messages.
//! Callers that only care about the broad category match on [`StorageError::kind`].

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::storage::types::{BranchName, InvalidNameError, ObjectId};

/// the main error type for storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    /// no object is stored under this id
    #[error("object not found: {0}")]
    ObjectNotFound(ObjectId),

    /// the id does not name a stored tree
    #[error("tree not found: {0}")]
    TreeNotFound(String),

    /// the id does not name a stored commit
    #[error("commit not found: {0}")]
    CommitNotFound(String),

    /// the specified branch ref was not found
    #[error("branch not found: {0}")]
    BranchNotFound(BranchName),

    /// branch already exists
    #[error("branch already exists: {0}")]
    BranchAlreadyExists(BranchName),

    /// `init` on a directory that already holds a repository
    #[error("repository already initialized: {0}")]
    AlreadyInitialized(PathBuf),

    /// invalid branch name
    #[error("invalid branch name: {0}")]
    InvalidName(#[from] InvalidNameError),

    /// the current branch cannot be deleted
    #[error("cannot delete the current branch: {0}")]
    CannotDeleteCurrentBranch(BranchName),

    /// HEAD does not name an existing branch
    #[error("HEAD cannot be resolved: {0}")]
    HeadUnresolvable(String),

    /// the branch has no commits yet
    #[error("branch {0} has no commits yet")]
    UnbornBranch(BranchName),

    /// a tree entry or commit field failed validation
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    /// branch update failed due to concurrent modification
    #[error("concurrent modification: branch {branch} was updated by another writer")]
    ConcurrentModification { branch: BranchName },

    /// another writer holds the lock file for a ref or HEAD
    #[error(
        "ref lock {} is held by another writer; if no writer is running, remove it and retry",
        lock.display()
    )]
    RefLocked { lock: PathBuf },

    /// stored data could not be parsed
    #[error("corrupted data at {path}: {reason}")]
    Corrupted { path: PathBuf, reason: String },

    /// repo is not initialized
    #[error("repository not initialized: {0}")]
    NotInitialized(PathBuf),

    /// I/O error (filesystem level)
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// The broad category of a [`StorageError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    InvalidName,
    InvalidState,
    Validation,
    Conflict,
    Storage,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::NotFound => "not found",
            ErrorKind::AlreadyExists => "already exists",
            ErrorKind::InvalidName => "invalid name",
            ErrorKind::InvalidState => "invalid state",
            ErrorKind::Validation => "validation error",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Storage => "storage error",
        };
        f.write_str(s)
    }
}

impl StorageError {
    /// build a validation error for one named field
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        StorageError::Validation {
            field,
            reason: reason.into(),
        }
    }

    pub(crate) fn corrupted(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        StorageError::Corrupted {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// the category this error belongs to
    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::ObjectNotFound(_)
            | StorageError::TreeNotFound(_)
            | StorageError::CommitNotFound(_)
            | StorageError::BranchNotFound(_)
            | StorageError::NotInitialized(_) => ErrorKind::NotFound,
            StorageError::BranchAlreadyExists(_) | StorageError::AlreadyInitialized(_) => {
                ErrorKind::AlreadyExists
            }
            StorageError::InvalidName(_) => ErrorKind::InvalidName,
            StorageError::CannotDeleteCurrentBranch(_)
            | StorageError::HeadUnresolvable(_)
            | StorageError::UnbornBranch(_) => ErrorKind::InvalidState,
            StorageError::Validation { .. } => ErrorKind::Validation,
            StorageError::ConcurrentModification { .. } | StorageError::RefLocked { .. } => {
                ErrorKind::Conflict
            }
            StorageError::Corrupted { .. } | StorageError::Io(_) => ErrorKind::Storage,
        }
    }

    /// check if this error indicates the resource doesn't exist
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// check if this error is a conflict
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StorageError::BranchAlreadyExists(_)
                | StorageError::ConcurrentModification { .. }
                | StorageError::RefLocked { .. }
        )
    }

    /// check if this error is recoverable by retry
    ///
    /// A held lock is usually released within milliseconds, but one left by a
    /// killed process stays until removed, so retry loops should be bounded.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            StorageError::ConcurrentModification { .. } | StorageError::RefLocked { .. }
        )
    }
}

/// result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
