//! storage layer for minivcs
//!
//! this module owns everything under `<root>/.minivcs`: content-addressed
//! objects, branch refs and HEAD. Callers (the CLI, tests, embedders) go
//! through [`Repository`] and never touch the files directly.
//!
//!  # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Repository                            │
//! │    (High-level API: commit, log, diff, branches)            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!        ┌─────────────────────┼─────────────────────┐
//!        │                     │                     │
//!        ▼                     ▼                     ▼
//!  ┌─────────────┐       ┌─────────────┐       ┌─────────────┐
//!  │   commit    │       │    diff     │       │    refs     │
//!  │  (history)  │       │  (changes)  │       │ (branches)  │
//!  └─────────────┘       └─────────────┘       └─────────────┘
//!         │                     │
//!         └──────────┬──────────┘
//!                    ▼
//!             ┌─────────────┐
//!             │    tree     │
//!             │ (snapshots) │
//!             └─────────────┘
//!                    │
//!                    ▼
//!             ┌─────────────┐
//!             │   object    │
//!             │  (content)  │
//!             └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use minivcs::storage::{Repository, TreeEntry};
//!
//! # fn main() -> minivcs::storage::StorageResult<()> {
//! let repo = Repository::init("./project")?;
//!
//! let blob = repo.write_blob(b"hello\n")?;
//! let tree = repo.create_tree(vec![TreeEntry::blob(blob, "README")?])?;
//! let commit = repo.create_commit(tree, None, "Alice <alice@example.com>", "first")?;
//!
//! for entry in repo.log(10)? {
//!     println!("{} {}", entry.id.short(), entry.summary());
//! }
//! # let _ = commit;
//! # Ok(())
//! # }
//! ```

mod commit;
mod diff;
mod error;
mod object;
mod refs;
mod repository;
mod tree;
mod types;

// Re-export public API
pub use commit::{format_timestamp, Commit, CommitBuilder, History};
pub use diff::{diff_trees, diff_trees_recursive};
pub use error::{ErrorKind, StorageError, StorageResult};
pub use object::ObjectStore;
pub use refs::{BranchInfo, RefManager};
pub use repository::{Repository, META_DIR};
pub use tree::{StagedEntry, Tree, TreeEntry};
pub use types::{
    BlobId, BranchName, Change, ChangeKind, CommitId, EntryKind, InvalidNameError, ObjectId,
    Signature, TreeId,
};
