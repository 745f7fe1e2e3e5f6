//! core type-safe wrappers for the storage layer.

use std::fmt;
use std::fmt::Formatter;
use std::str::FromStr;

use serde::{Serialize, Serializer};
use sha1::{Digest, Sha1};

use crate::storage::error::{StorageError, StorageResult};

/// A content address: the SHA-1 digest of an object's stored bytes.
///
/// Always rendered as 40 lowercase hex characters. Parsing accepts either case
/// and normalizes, so two spellings of the same id compare equal.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 20]);

impl ObjectId {
    /// digest length in bytes
    pub const LEN: usize = 20;
    /// length of the hex rendering
    pub const HEX_LEN: usize = 40;

    /// hash raw bytes into their content address
    pub fn hash(bytes: &[u8]) -> Self {
        let digest = Sha1::digest(bytes);
        Self(digest.into())
    }

    /// parse an id from its hex rendering
    pub fn from_hex(hex: &str) -> StorageResult<Self> {
        let hex = hex.trim();
        if hex.is_empty() {
            return Err(StorageError::validation("hash", "hash is required"));
        }
        if hex.len() != Self::HEX_LEN {
            return Err(StorageError::validation(
                "hash",
                format!("expected {} hex characters, got {}", Self::HEX_LEN, hex.len()),
            ));
        }
        let mut bytes = [0u8; Self::LEN];
        hex::decode_to_slice(hex, &mut bytes)
            .map_err(|e| StorageError::validation("hash", format!("'{}' is not hex: {}", hex, e)))?;
        Ok(Self(bytes))
    }

    /// lowercase hex rendering
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// short form of the id (first 7 hex characters)
    pub fn short(&self) -> String {
        self.to_hex()[..7].to_string()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.to_hex())
    }
}

impl FromStr for ObjectId {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for ObjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Declares an id newtype over [`ObjectId`] for one object kind.
///
/// This makes sure we don't accidentally pass a blob ID where a commit ID
/// is expected.
macro_rules! typed_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        #[serde(transparent)]
        pub struct $name(pub(crate) ObjectId);

        impl $name {
            pub fn new(id: ObjectId) -> Self {
                Self(id)
            }

            /// the untyped content address
            pub fn object_id(&self) -> ObjectId {
                self.0
            }

            /// parse from a hex string
            pub fn from_hex(hex: &str) -> StorageResult<Self> {
                ObjectId::from_hex(hex).map(Self)
            }

            /// short form of the id
            pub fn short(&self) -> String {
                self.0.short()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl FromStr for $name {
            type Err = StorageError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_hex(s)
            }
        }

        impl From<$name> for ObjectId {
            fn from(id: $name) -> ObjectId {
                id.0
            }
        }
    };
}

typed_id!(
    /// id of a commit object
    CommitId
);
typed_id!(
    /// id of a tree object
    TreeId
);
typed_id!(
    /// id of a blob object (staged file content)
    BlobId
);

/// The two kinds of thing a tree entry can point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Blob,
    Tree,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Blob => "blob",
            EntryKind::Tree => "tree",
        }
    }

    /// parse the `type` field of a tree entry
    pub fn parse(kind: &str) -> StorageResult<Self> {
        match kind.trim() {
            "" => Err(StorageError::validation("type", "entry type is required")),
            "blob" => Ok(EntryKind::Blob),
            "tree" => Ok(EntryKind::Tree),
            other => Err(StorageError::validation(
                "type",
                format!("entry type must be 'blob' or 'tree', got '{}'", other),
            )),
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated branch name.
///
/// Branches are stored as files under `refs/heads/`, so names are restricted
/// to a single path component:
/// - not empty
/// - no whitespace
/// - no `/` or `\`
/// - not `.` or `..`
/// - not ending in `.lock` (reserved for ref lock files)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct BranchName(String);

impl BranchName {
    /// the branch a fresh repository starts on
    pub const MAIN: &'static str = "main";

    /// suffix reserved for lock files next to refs
    pub const LOCK_SUFFIX: &'static str = ".lock";

    /// create a new BranchName, validating the input
    pub fn new(name: impl Into<String>) -> Result<Self, InvalidNameError> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    fn validate(name: &str) -> Result<(), InvalidNameError> {
        if name.trim().is_empty() {
            return Err(InvalidNameError::Empty);
        }

        for (i, c) in name.chars().enumerate() {
            if c.is_whitespace() || c == '/' || c == '\\' || c.is_control() {
                return Err(InvalidNameError::InvalidCharacter { char: c, position: i });
            }
        }

        if name == "." || name == ".." {
            return Err(InvalidNameError::Reserved(name.to_string()));
        }

        if name.ends_with(Self::LOCK_SUFFIX) {
            return Err(InvalidNameError::Reserved(name.to_string()));
        }

        Ok(())
    }

    /// create the main branch reference
    pub fn main() -> Self {
        Self(Self::MAIN.to_string())
    }

    /// get the full ref path (e.g., "refs/heads/main")
    pub fn as_ref_path(&self) -> String {
        format!("refs/heads/{}", self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BranchName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for BranchName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for BranchName {
    type Err = InvalidNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// commit author in `Name <email>` form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub name: String,
    pub email: String,
}

impl Signature {
    /// create a new signature, validating both parts
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> StorageResult<Self> {
        let name = name.into().trim().to_string();
        let email = email.into().trim().to_string();

        if name.is_empty() {
            return Err(StorageError::validation("author", "author name is required"));
        }
        if email.is_empty() {
            return Err(StorageError::validation("author", "author email is required"));
        }
        for part in [&name, &email] {
            if part.contains(['<', '>']) || part.contains(|c: char| c.is_control()) {
                return Err(StorageError::validation(
                    "author",
                    format!("'{}' may not contain '<', '>' or control characters", part),
                ));
            }
        }

        Ok(Self { name, email })
    }

    /// parse `Name <email>`
    pub fn parse(author: &str) -> StorageResult<Self> {
        let invalid = || {
            StorageError::validation(
                "author",
                format!("invalid author format '{}', use 'Name <email>'", author),
            )
        };

        let body = author.trim().strip_suffix('>').ok_or_else(invalid)?;
        let (name, email) = body.split_once('<').ok_or_else(invalid)?;
        Self::new(name, email).map_err(|_| invalid())
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}>", self.name, self.email)
    }
}

impl FromStr for Signature {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// error type for invalid branch names
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidNameError {
    Empty,
    InvalidCharacter { char: char, position: usize },
    Reserved(String),
}

impl fmt::Display for InvalidNameError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "name cannot be empty"),
            Self::InvalidCharacter { char, position } => {
                write!(f, "invalid character {:?} at position {}", char, position)
            }
            Self::Reserved(name) => write!(f, "'{}' is a reserved name", name),
        }
    }
}

impl std::error::Error for InvalidNameError {}

/// represents one entry in a diff between two trees
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Change {
    pub name: String,
    pub kind: ChangeKind,
}

impl Change {
    pub fn new(name: impl Into<String>, kind: ChangeKind) -> Self {
        Self { name: name.into(), kind }
    }
}

/// the type of change in a diff
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Removed,
    Changed,
}

impl ChangeKind {
    /// the kind the same change has when the diff is taken the other way round
    pub fn inverse(self) -> Self {
        match self {
            ChangeKind::Added => ChangeKind::Removed,
            ChangeKind::Removed => ChangeKind::Added,
            ChangeKind::Changed => ChangeKind::Changed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Added => "added",
            ChangeKind::Removed => "removed",
            ChangeKind::Changed => "changed",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
