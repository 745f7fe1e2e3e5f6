//! tree objects: canonical manifests of named entries.
//!
//! A tree is stored as one line per entry, sorted by name:
//!
//! ```text
//! blob 2aae6c35c94fcfb415dbe95f408b9ce91ee846ed README.md
//! tree 4b825dc642cb6eb9a060e54bf8d69288fbee4904 src
//! ```
//!
//! Entries are always sorted before serializing, so the same set of entries
//! hashes to the same id no matter what order the caller supplied them in.
//! This module also turns the staging layer's flat `(path, blob)` list into
//! nested trees.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::object::ObjectStore;
use crate::storage::types::{BlobId, EntryKind, ObjectId, TreeId};

/// One named pointer inside a tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TreeEntry {
    #[serde(rename = "type")]
    kind: EntryKind,
    #[serde(rename = "hash")]
    id: ObjectId,
    name: String,
}

impl TreeEntry {
    /// create an entry, validating the name
    pub fn new(kind: EntryKind, id: ObjectId, name: impl Into<String>) -> StorageResult<Self> {
        let name = name.into();
        validate_entry_name(&name)?;
        Ok(Self { kind, id, name })
    }

    /// Build an entry from untyped fields, as handed over by the staging layer.
    ///
    /// Fails with a validation error naming the first bad field.
    pub fn parse(kind: &str, hash: &str, name: &str) -> StorageResult<Self> {
        let kind = EntryKind::parse(kind)?;
        let id = ObjectId::from_hex(hash)?;
        Self::new(kind, id, name)
    }

    /// an entry pointing at file content
    pub fn blob(id: BlobId, name: impl Into<String>) -> StorageResult<Self> {
        Self::new(EntryKind::Blob, id.object_id(), name)
    }

    /// an entry pointing at a sub-tree
    pub fn tree(id: TreeId, name: impl Into<String>) -> StorageResult<Self> {
        Self::new(EntryKind::Tree, id.object_id(), name)
    }

    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// the sub-tree id, if this entry is a tree
    pub fn as_tree(&self) -> Option<TreeId> {
        match self.kind {
            EntryKind::Tree => Some(TreeId::new(self.id)),
            EntryKind::Blob => None,
        }
    }
}

impl fmt::Display for TreeEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.kind, self.id, self.name)
    }
}

/// Entry names end up on a single line of the serialized tree and address a
/// single path component, so a few characters are off limits.
fn validate_entry_name(name: &str) -> StorageResult<()> {
    if name.trim().is_empty() {
        return Err(StorageError::validation("name", "entry name is required"));
    }
    if name.contains(['/', '\0', '\n', '\r']) {
        return Err(StorageError::validation(
            "name",
            format!("entry name {:?} may not contain '/', NUL or line breaks", name),
        ));
    }
    if name == "." || name == ".." {
        return Err(StorageError::validation(
            "name",
            format!("'{}' is not a valid entry name", name),
        ));
    }
    Ok(())
}

/// A validated, name-sorted list of entries.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct Tree {
    entries: Vec<TreeEntry>,
}

impl Tree {
    /// Sort and check a set of entries. Fails on an empty list or a name
    /// that appears twice.
    pub fn new(mut entries: Vec<TreeEntry>) -> StorageResult<Self> {
        if entries.is_empty() {
            return Err(StorageError::validation(
                "entries",
                "tree must contain at least one entry",
            ));
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));

        if let Some(pair) = entries.windows(2).find(|w| w[0].name == w[1].name) {
            return Err(StorageError::validation(
                "name",
                format!("duplicate entry name '{}'", pair[0].name),
            ));
        }

        Ok(Self { entries })
    }

    /// the empty tree; never stored, only used as a diff baseline
    pub(crate) fn empty() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[TreeEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// look up an entry by name
    pub fn get(&self, name: &str) -> Option<&TreeEntry> {
        self.entries
            .binary_search_by(|e| e.name.as_str().cmp(name))
            .ok()
            .map(|i| &self.entries[i])
    }

    /// canonical byte form
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&entry.to_string());
            out.push('\n');
        }
        out.into_bytes()
    }

    /// the id this tree has (or would have) once stored
    pub fn id(&self) -> TreeId {
        TreeId::new(ObjectId::hash(&self.serialize()))
    }

    /// Parse the canonical byte form.
    ///
    /// Only canonical input is accepted: strictly increasing names and a
    /// trailing newline. The error is a plain description; callers decide
    /// how to report it.
    pub fn parse(bytes: &[u8]) -> Result<Self, String> {
        let text = std::str::from_utf8(bytes).map_err(|e| format!("not utf-8: {}", e))?;
        let body = text
            .strip_suffix('\n')
            .ok_or_else(|| "missing trailing newline".to_string())?;

        let mut entries: Vec<TreeEntry> = Vec::new();
        for (lineno, line) in body.split('\n').enumerate() {
            let mut parts = line.splitn(3, ' ');
            let (kind, hash, name) = match (parts.next(), parts.next(), parts.next()) {
                (Some(kind), Some(hash), Some(name)) => (kind, hash, name),
                _ => return Err(format!("line {}: expected '<type> <hash> <name>'", lineno + 1)),
            };
            let entry = TreeEntry::parse(kind, hash, name)
                .map_err(|e| format!("line {}: {}", lineno + 1, e))?;

            if entries.last().is_some_and(|prev| prev.name >= entry.name) {
                return Err(format!("line {}: entries out of order", lineno + 1));
            }
            entries.push(entry);
        }

        Ok(Self { entries })
    }
}

/// Validate, serialize and store a tree; returns its id.
pub fn build_tree(store: &ObjectStore, entries: Vec<TreeEntry>) -> StorageResult<TreeId> {
    let tree = Tree::new(entries)?;
    write_tree(store, &tree)
}

/// store an already-validated tree
pub fn write_tree(store: &ObjectStore, tree: &Tree) -> StorageResult<TreeId> {
    let id = store.put(&tree.serialize())?;
    debug!(tree = %id, entries = tree.len(), "wrote tree");
    Ok(TreeId::new(id))
}

/// Load and parse a stored tree.
///
/// An id that is missing, or that names something which is not a tree, is
/// reported as `TreeNotFound`.
pub fn read_tree(store: &ObjectStore, id: TreeId) -> StorageResult<Tree> {
    let bytes = match store.get(&id.object_id()) {
        Ok(bytes) => bytes,
        Err(StorageError::ObjectNotFound(_)) => return Err(StorageError::TreeNotFound(id.to_string())),
        Err(e) => return Err(e),
    };

    Tree::parse(&bytes).map_err(|reason| {
        debug!(tree = %id, %reason, "object is not a tree");
        StorageError::TreeNotFound(id.to_string())
    })
}

/// One staged file: a repository-relative path and its content hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedEntry {
    pub path: String,
    pub blob: BlobId,
}

impl StagedEntry {
    pub fn new(path: impl Into<String>, blob: BlobId) -> Self {
        Self {
            path: path.into(),
            blob,
        }
    }
}

/// in-progress directory while nesting staged paths
#[derive(Debug, Default)]
struct DirNode {
    children: BTreeMap<String, Node>,
}

#[derive(Debug)]
enum Node {
    File(BlobId),
    Dir(DirNode),
}

impl DirNode {
    fn insert(&mut self, path: &str, components: &[&str], blob: BlobId) -> StorageResult<()> {
        let collision = || {
            StorageError::validation(
                "path",
                format!("'{}' collides with another staged path", path),
            )
        };

        match components {
            [] => Err(StorageError::validation("path", "path is required")),
            [file] => {
                if self.children.contains_key(*file) {
                    return Err(collision());
                }
                self.children.insert(file.to_string(), Node::File(blob));
                Ok(())
            }
            [dir, rest @ ..] => {
                let child = self
                    .children
                    .entry(dir.to_string())
                    .or_insert_with(|| Node::Dir(DirNode::default()));
                match child {
                    Node::Dir(node) => node.insert(path, rest, blob),
                    Node::File(_) => Err(collision()),
                }
            }
        }
    }

    /// Turn this directory into a tree, bottom-up. `write` receives every
    /// sub-tree before its parent and returns the id to reference it by.
    fn assemble<F>(&self, write: &mut F) -> StorageResult<Tree>
    where
        F: FnMut(&Tree) -> StorageResult<TreeId>,
    {
        let mut entries = Vec::with_capacity(self.children.len());
        for (name, child) in &self.children {
            let entry = match child {
                Node::File(blob) => TreeEntry::blob(*blob, name.clone())?,
                Node::Dir(dir) => {
                    let subtree = dir.assemble(write)?;
                    TreeEntry::tree(write(&subtree)?, name.clone())?
                }
            };
            entries.push(entry);
        }
        Tree::new(entries)
    }
}

fn split_staged_path(path: &str) -> StorageResult<Vec<&str>> {
    if path.is_empty() {
        return Err(StorageError::validation("path", "path is required"));
    }
    let components: Vec<&str> = path.split('/').collect();
    if components.iter().any(|c| c.is_empty() || *c == "." || *c == "..") {
        return Err(StorageError::validation(
            "path",
            format!("'{}' is not a normalized relative path", path),
        ));
    }
    Ok(components)
}

/// Nest staged entries into a tree hierarchy without storing anything.
/// Returns the root tree; sub-trees are passed to `write` first.
pub(crate) fn assemble_staged<F>(staged: &[StagedEntry], mut write: F) -> StorageResult<Tree>
where
    F: FnMut(&Tree) -> StorageResult<TreeId>,
{
    if staged.is_empty() {
        return Err(StorageError::validation(
            "entries",
            "tree must contain at least one entry",
        ));
    }

    let mut root = DirNode::default();
    for entry in staged {
        let components = split_staged_path(&entry.path)?;
        root.insert(&entry.path, &components, entry.blob)?;
    }

    root.assemble(&mut write)
}

/// Build and store the tree for a list of staged files, creating a sub-tree
/// per directory.
pub fn build_tree_from_staged(store: &ObjectStore, staged: &[StagedEntry]) -> StorageResult<TreeId> {
    let root = assemble_staged(staged, |tree| write_tree(store, tree))?;
    write_tree(store, &root)
}
