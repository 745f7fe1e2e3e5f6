//! Repository handle.
//!
//! Ties the object store and the ref manager together under one metadata
//! directory and provides the operations the rest of the system uses.
//! A handle is cheap to clone and can be shared across threads; several
//! handles (or processes) on the same directory coordinate through the
//! branch lock files.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::config::RepositoryConfig;
use crate::storage::commit::{self, Commit, CommitBuilder, History};
use crate::storage::diff;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::object::ObjectStore;
use crate::storage::refs::{BranchInfo, RefManager};
use crate::storage::tree::{self, StagedEntry, Tree, TreeEntry};
use crate::storage::types::{BlobId, BranchName, Change, CommitId, ObjectId, Signature, TreeId};

/// Name of the metadata directory inside the working root.
pub const META_DIR: &str = ".minivcs";

/// The main repository handle.
///
/// Clone this to share across threads - it uses Arc internally.
#[derive(Clone)]
pub struct Repository {
    inner: Arc<RepositoryInner>,
}

struct RepositoryInner {
    root: PathBuf,
    meta_dir: PathBuf,
    objects: ObjectStore,
    refs: RefManager,
    config: RepositoryConfig,
    /// serializes commit creation through this handle
    commit_lock: Mutex<()>,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("root", &self.inner.root)
            .finish_non_exhaustive()
    }
}

impl Repository {
    fn from_config(config: RepositoryConfig) -> Self {
        let root = config.root.clone();
        let meta_dir = root.join(META_DIR);
        Self {
            inner: Arc::new(RepositoryInner {
                objects: ObjectStore::new(meta_dir.join("objects")),
                refs: RefManager::new(&meta_dir),
                root,
                meta_dir,
                config,
                commit_lock: Mutex::new(()),
            }),
        }
    }

    /// Initialize a new repository at `root` with default settings.
    pub fn init(root: impl AsRef<Path>) -> StorageResult<Self> {
        Self::init_with_config(RepositoryConfig::new(root.as_ref()))
    }

    /// Initialize a new repository.
    ///
    /// Creates the metadata directory, an empty object store and the
    /// configured default branch (unborn), with HEAD pointing at it.
    pub fn init_with_config(config: RepositoryConfig) -> StorageResult<Self> {
        let meta_dir = config.root.join(META_DIR);
        if meta_dir.exists() {
            return Err(StorageError::AlreadyInitialized(config.root.clone()));
        }

        fs::create_dir_all(meta_dir.join("objects"))?;
        let repo = Self::from_config(config);
        repo.inner.refs.init(&repo.inner.config.default_branch)?;

        info!(
            root = %repo.inner.root.display(),
            branch = %repo.inner.config.default_branch,
            "initialized repository"
        );
        Ok(repo)
    }

    /// Open an existing repository at `root`.
    pub fn open(root: impl AsRef<Path>) -> StorageResult<Self> {
        Self::open_with_config(RepositoryConfig::new(root.as_ref()))
    }

    /// Open a repository, initializing it first when `create_if_missing`
    /// is set and nothing is there yet.
    pub fn open_with_config(config: RepositoryConfig) -> StorageResult<Self> {
        let meta_dir = config.root.join(META_DIR);
        if !Self::is_repository(&config.root) {
            if config.create_if_missing && !meta_dir.exists() {
                return Self::init_with_config(config);
            }
            return Err(StorageError::NotInitialized(config.root.clone()));
        }

        debug!(root = %config.root.display(), "opened repository");
        Ok(Self::from_config(config))
    }

    /// Find the repository containing `start`, walking up parent directories.
    pub fn discover(start: impl AsRef<Path>) -> StorageResult<Self> {
        let start = start.as_ref();
        let absolute = fs::canonicalize(start)
            .map_err(|_| StorageError::NotInitialized(start.to_path_buf()))?;

        absolute
            .ancestors()
            .find(|dir| Self::is_repository(dir))
            .ok_or_else(|| StorageError::NotInitialized(start.to_path_buf()))
            .and_then(|root| Self::open(root))
    }

    fn is_repository(root: &Path) -> bool {
        let meta_dir = root.join(META_DIR);
        meta_dir.join("objects").is_dir() && meta_dir.join("HEAD").is_file()
    }

    /// Working directory root.
    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    /// Metadata directory (`<root>/.minivcs`).
    pub fn meta_dir(&self) -> &Path {
        &self.inner.meta_dir
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.inner.config
    }

    pub fn objects(&self) -> &ObjectStore {
        &self.inner.objects
    }

    pub fn refs(&self) -> &RefManager {
        &self.inner.refs
    }

    // ==================== Content Store ====================

    /// Store raw bytes, returning their hash.
    pub fn put_object(&self, bytes: &[u8]) -> StorageResult<ObjectId> {
        self.inner.objects.put(bytes)
    }

    /// Store file content as a blob.
    pub fn write_blob(&self, bytes: &[u8]) -> StorageResult<BlobId> {
        self.put_object(bytes).map(BlobId::new)
    }

    /// Read back the exact bytes stored under `id`.
    pub fn get_object(&self, id: &ObjectId) -> StorageResult<Vec<u8>> {
        self.inner.objects.get(id)
    }

    /// Whether an object exists. Malformed hashes simply report `false`.
    pub fn object_exists(&self, hex: &str) -> bool {
        self.inner.objects.contains_hex(hex)
    }

    // ==================== Trees ====================

    /// Build and store a single-level tree.
    pub fn create_tree(&self, entries: Vec<TreeEntry>) -> StorageResult<TreeId> {
        tree::build_tree(&self.inner.objects, entries)
    }

    /// Build and store a nested tree from staged file paths.
    pub fn create_tree_from_staged(&self, staged: &[StagedEntry]) -> StorageResult<TreeId> {
        tree::build_tree_from_staged(&self.inner.objects, staged)
    }

    pub fn read_tree(&self, id: TreeId) -> StorageResult<Tree> {
        tree::read_tree(&self.inner.objects, id)
    }

    // ==================== Commits ====================

    /// Create a commit on the current branch and advance the branch to it.
    ///
    /// Without an explicit `parent` the commit's parent is the branch tip
    /// observed at the start. The tip only moves if it still equals that
    /// observed value; otherwise `ConcurrentModification` is returned and
    /// the (already stored) commit object is left unreferenced.
    pub fn create_commit(
        &self,
        tree: TreeId,
        parent: Option<CommitId>,
        author: &str,
        message: &str,
    ) -> StorageResult<Commit> {
        let author = Signature::parse(author)?;

        let _guard = self.inner.commit_lock.lock();
        let (branch, observed) = self.inner.refs.current_tip()?;

        let commit = CommitBuilder::new(&self.inner.objects)
            .tree(tree)
            .maybe_parent(parent.or(observed))
            .author(author)
            .message(message)
            .write()?;

        self.inner.refs.advance_tip(&branch, observed, commit.id)?;

        info!(
            branch = %branch,
            commit = %commit.id.short(),
            summary = commit.summary(),
            "created commit"
        );
        Ok(commit)
    }

    /// Load a commit by id.
    pub fn get_commit(&self, id: CommitId) -> StorageResult<Commit> {
        commit::read_commit(&self.inner.objects, id)
    }

    /// Load a commit from a hex hash.
    pub fn resolve_commit(&self, hex: &str) -> StorageResult<Commit> {
        commit::resolve_commit(&self.inner.objects, hex)
    }

    /// Tip of the current branch, failing with `UnbornBranch` if it has none.
    pub fn head_commit(&self) -> StorageResult<CommitId> {
        let (branch, tip) = self.inner.refs.current_tip()?;
        tip.ok_or(StorageError::UnbornBranch(branch))
    }

    /// Lazily walk first-parent history from the current tip.
    pub fn history(&self) -> StorageResult<History<'_>> {
        let (_, tip) = self.inner.refs.current_tip()?;
        Ok(commit::history(&self.inner.objects, tip))
    }

    /// Up to `limit` commits from the current tip, newest first.
    ///
    /// An unborn branch has an empty log.
    pub fn log(&self, limit: usize) -> StorageResult<Vec<Commit>> {
        self.history()?.take(limit).collect()
    }

    /// [`Repository::log`] with the configured default limit.
    pub fn log_default(&self) -> StorageResult<Vec<Commit>> {
        self.log(self.config().log_limit)
    }

    // ==================== Diff ====================

    /// Top-level differences between the trees of two commits.
    pub fn diff_commits(&self, old: CommitId, new: CommitId) -> StorageResult<Vec<Change>> {
        diff::diff_commits(&self.inner.objects, old, new)
    }

    /// Differences between two commits down to individual file paths.
    pub fn diff_commits_recursive(&self, old: CommitId, new: CommitId) -> StorageResult<Vec<Change>> {
        diff::diff_commits_recursive(&self.inner.objects, old, new)
    }

    /// Compare the current tip's tree with the tree `staged` would produce.
    ///
    /// Nothing is written to the store. An unborn tip compares against an
    /// empty tree, as does an empty `staged` list.
    pub fn diff_working_tree(&self, staged: &[StagedEntry]) -> StorageResult<Vec<Change>> {
        let base = match self.inner.refs.current_tip()? {
            (_, Some(tip)) => self.read_tree(self.get_commit(tip)?.tree)?,
            (_, None) => Tree::empty(),
        };

        let proposed = if staged.is_empty() {
            Tree::empty()
        } else {
            tree::assemble_staged(staged, |subtree| Ok(subtree.id()))?
        };

        Ok(diff::diff_trees(&base, &proposed))
    }

    // ==================== Branch Operations ====================

    /// All branches, sorted by name, flagging the current one.
    pub fn list_branches(&self) -> StorageResult<Vec<BranchInfo>> {
        self.inner.refs.list_branches()
    }

    /// The branch HEAD names.
    pub fn current_branch(&self) -> StorageResult<BranchName> {
        self.inner.refs.current_branch()
    }

    /// Create a branch at the current tip (unborn if the tip is unborn).
    pub fn create_branch(&self, name: &str) -> StorageResult<BranchName> {
        let branch = BranchName::new(name)?;
        let (_, tip) = self.inner.refs.current_tip()?;
        self.inner.refs.create_branch(&branch, tip)?;
        Ok(branch)
    }

    /// Delete a branch other than the current one.
    pub fn delete_branch(&self, name: &str) -> StorageResult<()> {
        let branch = BranchName::new(name)?;
        self.inner.refs.delete_branch(&branch)
    }

    /// Point HEAD at another existing branch.
    pub fn switch_branch(&self, name: &str) -> StorageResult<()> {
        let branch = BranchName::new(name)?;
        self.inner.refs.switch_branch(&branch)
    }

    /// Compare-and-swap a branch tip.
    pub fn advance_tip(
        &self,
        branch: &BranchName,
        expected: Option<CommitId>,
        new_tip: CommitId,
    ) -> StorageResult<()> {
        self.inner.refs.advance_tip(branch, expected, new_tip)
    }
}
