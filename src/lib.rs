//! minivcs - a minimal version-control core
//!
//! This crate provides the plumbing of a git-like tool: a content-addressed
//! object store, canonical tree and commit objects, named branches advanced
//! by compare-and-swap, and a tree diff. Everything lives under
//! `<root>/.minivcs/` as plain files.
//!
//! # Example
//!
//! ```no_run
//! use minivcs::storage::{Repository, StagedEntry};
//!
//! let repo = Repository::init("./project").unwrap();
//! let blob = repo.write_blob(b"fn main() {}\n").unwrap();
//! let tree = repo.create_tree_from_staged(&[StagedEntry::new("src/main.rs", blob)]).unwrap();
//! repo.create_commit(tree, None, "Alice <alice@example.com>", "initial import").unwrap();
//! ```

pub mod config;
pub mod logging;
pub mod storage;
