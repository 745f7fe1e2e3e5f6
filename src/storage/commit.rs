//!  Commit creation and history traversal
//!
//! a commit links a tree snapshot to its author, a message, a timestamp and
//! at most one parent commit. The stored form is a small header block, a
//! blank line, then the message verbatim:
//!
//! ```text
//! tree 4b825dc642cb6eb9a060e54bf8d69288fbee4904
//! parent 2aae6c35c94fcfb415dbe95f408b9ce91ee846ed
//! author Alice <a@x.com>
//! timestamp 2026-10-19T08:15:02.123456789Z
//!
//! first
//! ```
//!
//! A parent must already be stored before a child can reference it, so the
//! history graph can never contain a cycle. This module only writes objects;
//! moving branch tips is the repository's job.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use tracing::debug;

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::object::ObjectStore;
use crate::storage::tree;
use crate::storage::types::{CommitId, ObjectId, Signature, TreeId};

/// a stored commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Commit {
    pub id: CommitId,
    pub tree: TreeId,
    pub parent: Option<CommitId>,
    pub author: Signature,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

impl Commit {
    /// check if this is a root commit (no parent)
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// get a short summary of the commit (first line of message)
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or(&self.message)
    }

    /// canonical byte form (everything but the id, which is derived from it)
    pub fn serialize(&self) -> Vec<u8> {
        serialize_commit(
            self.tree,
            self.parent,
            &self.author,
            &self.timestamp,
            &self.message,
        )
    }

    /// Parse a stored commit. `id` is the address the bytes were read from.
    pub fn parse(id: CommitId, bytes: &[u8]) -> Result<Self, String> {
        let text = std::str::from_utf8(bytes).map_err(|e| format!("not utf-8: {}", e))?;
        let (header, message) = text
            .split_once("\n\n")
            .ok_or_else(|| "missing blank line before message".to_string())?;

        let mut lines = header.split('\n').peekable();

        let tree = header_value(lines.next(), "tree")?;
        let tree = TreeId::from_hex(tree).map_err(|e| e.to_string())?;

        let parent = match lines.peek() {
            Some(line) if line.starts_with("parent ") => {
                let value = header_value(lines.next(), "parent")?;
                Some(CommitId::from_hex(value).map_err(|e| e.to_string())?)
            }
            _ => None,
        };

        let author = header_value(lines.next(), "author")?;
        let author = Signature::parse(author).map_err(|e| e.to_string())?;

        let timestamp = header_value(lines.next(), "timestamp")?;
        let timestamp = DateTime::parse_from_rfc3339(timestamp)
            .map_err(|e| format!("bad timestamp '{}': {}", timestamp, e))?
            .with_timezone(&Utc);

        if let Some(extra) = lines.next() {
            return Err(format!("unexpected header line '{}'", extra));
        }

        Ok(Self {
            id,
            tree,
            parent,
            author,
            timestamp,
            message: message.to_string(),
        })
    }
}

fn header_value<'a>(line: Option<&'a str>, key: &str) -> Result<&'a str, String> {
    let line = line.ok_or_else(|| format!("missing '{}' header", key))?;
    line.strip_prefix(key)
        .and_then(|rest| rest.strip_prefix(' '))
        .ok_or_else(|| format!("expected '{}' header, found '{}'", key, line))
}

/// the timestamp rendering used in commit headers
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn serialize_commit(
    tree: TreeId,
    parent: Option<CommitId>,
    author: &Signature,
    timestamp: &DateTime<Utc>,
    message: &str,
) -> Vec<u8> {
    let mut out = format!("tree {}\n", tree);
    if let Some(parent) = parent {
        out.push_str(&format!("parent {}\n", parent));
    }
    out.push_str(&format!("author {}\n", author));
    out.push_str(&format!("timestamp {}\n", format_timestamp(timestamp)));
    out.push('\n');
    out.push_str(message);
    out.into_bytes()
}

/// builder for creating commits with a fluent interface
pub struct CommitBuilder<'a> {
    store: &'a ObjectStore,
    tree: Option<TreeId>,
    parent: Option<CommitId>,
    author: Option<Signature>,
    message: String,
    timestamp: Option<DateTime<Utc>>,
}

impl<'a> CommitBuilder<'a> {
    /// create a new CommitBuilder
    pub fn new(store: &'a ObjectStore) -> Self {
        Self {
            store,
            tree: None,
            parent: None,
            author: None,
            message: String::new(),
            timestamp: None,
        }
    }

    /// set the tree for this commit
    pub fn tree(mut self, tree: TreeId) -> Self {
        self.tree = Some(tree);
        self
    }

    /// set the parent commit
    pub fn parent(mut self, parent: CommitId) -> Self {
        self.parent = Some(parent);
        self
    }

    /// set or clear the parent commit
    pub fn maybe_parent(mut self, parent: Option<CommitId>) -> Self {
        self.parent = parent;
        self
    }

    /// set the author signature
    pub fn author(mut self, author: Signature) -> Self {
        self.author = Some(author);
        self
    }

    /// set the commit message
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// pin the timestamp instead of capturing the current time
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Validate, serialize and store the commit.
    ///
    /// The tree must be a stored tree and the parent, if any, a stored commit.
    pub fn write(self) -> StorageResult<Commit> {
        let tree = self
            .tree
            .ok_or_else(|| StorageError::validation("tree", "commit requires a tree"))?;
        let author = self
            .author
            .ok_or_else(|| StorageError::validation("author", "commit requires an author"))?;
        if self.message.trim().is_empty() {
            return Err(StorageError::validation("message", "commit message is required"));
        }

        tree::read_tree(self.store, tree)?;
        if let Some(parent) = self.parent {
            read_commit(self.store, parent)?;
        }

        let timestamp = self.timestamp.unwrap_or_else(Utc::now);
        let bytes = serialize_commit(tree, self.parent, &author, &timestamp, &self.message);
        let id = CommitId::new(self.store.put(&bytes)?);
        debug!(commit = %id, tree = %tree, parent = ?self.parent.map(|p| p.short()), "wrote commit");

        Ok(Commit {
            id,
            tree,
            parent: self.parent,
            author,
            timestamp,
            message: self.message,
        })
    }
}

/// Load and parse a stored commit.
///
/// An id that is missing, or that names something which is not a commit, is
/// reported as `CommitNotFound`.
pub fn read_commit(store: &ObjectStore, id: CommitId) -> StorageResult<Commit> {
    let bytes = match store.get(&id.object_id()) {
        Ok(bytes) => bytes,
        Err(StorageError::ObjectNotFound(_)) => {
            return Err(StorageError::CommitNotFound(id.to_string()))
        }
        Err(e) => return Err(e),
    };

    Commit::parse(id, &bytes).map_err(|reason| {
        debug!(commit = %id, %reason, "object is not a commit");
        StorageError::CommitNotFound(id.to_string())
    })
}

/// resolve a commit id given as hex (e.g. from the command line)
pub fn resolve_commit(store: &ObjectStore, hex: &str) -> StorageResult<Commit> {
    let id = ObjectId::from_hex(hex).map_err(|_| StorageError::CommitNotFound(hex.to_string()))?;
    read_commit(store, CommitId::new(id))
}

/// Walks a commit's parent chain, newest first.
///
/// Cheap to clone; a clone restarts from wherever the original currently is.
/// The walk ends after the root commit, or after yielding the first error.
#[derive(Debug, Clone)]
pub struct History<'a> {
    store: &'a ObjectStore,
    next: Option<CommitId>,
}

impl<'a> History<'a> {
    /// create a new history walk; `None` yields nothing (unborn branch)
    pub fn new(store: &'a ObjectStore, start: Option<CommitId>) -> Self {
        Self { store, next: start }
    }
}

impl Iterator for History<'_> {
    type Item = StorageResult<Commit>;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next.take()?;
        match read_commit(self.store, id) {
            Ok(commit) => {
                self.next = commit.parent;
                Some(Ok(commit))
            }
            Err(e) => Some(Err(e)),
        }
    }
}

/// get history for a commit
pub fn history(store: &ObjectStore, start: Option<CommitId>) -> History<'_> {
    History::new(store, start)
}
