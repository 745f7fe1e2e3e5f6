//! Content-addressed object storage.
//!
//! Every object (blob, tree or commit) is a file under `objects/` named by the
//! SHA-1 of its bytes. Objects are immutable: writing bytes that are already
//! stored is a no-op, and a new object only becomes visible once it is fully
//! written (temp file in the same directory, then a no-clobber rename).

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::ObjectId;

/// prefix for in-flight object files; never a valid object name
const TEMP_PREFIX: &str = ".tmp-";

/// The flat on-disk object database.
#[derive(Debug, Clone)]
pub struct ObjectStore {
    dir: PathBuf,
}

impl ObjectStore {
    pub(crate) fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// the `objects/` directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn object_path(&self, id: &ObjectId) -> PathBuf {
        self.dir.join(id.to_hex())
    }

    /// Store `bytes` and return their content address.
    ///
    /// Idempotent: storing the same bytes again, from this or another
    /// process, returns the same id and leaves the stored file untouched.
    pub fn put(&self, bytes: &[u8]) -> StorageResult<ObjectId> {
        let id = ObjectId::hash(bytes);
        let path = self.object_path(&id);

        if path.is_file() {
            debug!(id = %id, "object already stored");
            return Ok(id);
        }

        let mut tmp = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempfile_in(&self.dir)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;

        match tmp.persist_noclobber(&path) {
            Ok(_) => debug!(id = %id, size = bytes.len(), "stored object"),
            // another writer stored the same bytes first
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
                debug!(id = %id, "object stored concurrently");
            }
            Err(e) => return Err(StorageError::Io(e.error)),
        }

        Ok(id)
    }

    /// Read the bytes stored under `id`.
    ///
    /// The content is re-hashed on read; a mismatch means the file was
    /// modified behind our back and is reported as corruption.
    pub fn get(&self, id: &ObjectId) -> StorageResult<Vec<u8>> {
        let path = self.object_path(id);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StorageError::ObjectNotFound(*id))
            }
            Err(e) => return Err(StorageError::Io(e)),
        };

        let actual = ObjectId::hash(&bytes);
        if actual != *id {
            return Err(StorageError::corrupted(
                path,
                format!("content hashes to {}", actual),
            ));
        }

        Ok(bytes)
    }

    /// Check whether an object is stored. Never fails.
    pub fn contains(&self, id: &ObjectId) -> bool {
        self.object_path(id).is_file()
    }

    /// Like [`contains`](Self::contains) for an id that has not been parsed
    /// yet; malformed ids simply report `false`.
    pub fn contains_hex(&self, hex: &str) -> bool {
        ObjectId::from_hex(hex)
            .map(|id| self.contains(&id))
            .unwrap_or(false)
    }
}
