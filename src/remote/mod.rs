//! The remote host contract.
//!
//! The engine talks to a Git-compatible host through [`RemoteHost`]: blobs,
//! trees, and commits addressed by sha, plus a single default branch ref
//! updated with compare-and-swap semantics. Concrete HTTP clients live
//! outside the core; [`memory::MemoryHost`] is the in-crate implementation
//! used by tests and offline operation.

pub mod memory;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::storage::types::{BlobId, CommitSha, TreeSha};

/// The canonical empty-tree hash.
///
/// Some hosts 404 on requests for this object, so the engine treats it as
/// zero entries instead of fetching it.
pub const EMPTY_TREE_SHA: &str = "4b825dc642cb6eb9a060e54bf8d69288fbee4904";

/// Number of commits per history page.
pub const COMMIT_PAGE_SIZE: usize = 30;

/// Errors surfaced by a remote host.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The requested object does not exist on the host.
    #[error("object not found: {0}")]
    NotFound(String),

    /// The branch ref was updated concurrently (an HTTP 422-class
    /// response); the caller may refetch and retry.
    #[error("branch ref changed concurrently")]
    RefChanged,

    /// Missing or invalid credential.
    #[error("unauthorized")]
    Unauthorized,

    /// Any other host failure.
    #[error("host error: {0}")]
    Host(String),
}

/// result type alias for remote host calls
pub type RemoteResult<T> = Result<T, RemoteError>;

/// One blob entry of a recursively fetched tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTreeEntry {
    pub path: String,
    pub sha: BlobId,
}

/// A commit as reported by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCommit {
    pub sha: CommitSha,
    pub tree_sha: TreeSha,
    pub parents: Vec<CommitSha>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// The tip of the default branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchHead {
    pub commit_sha: CommitSha,
}

/// One entry of a tree-creation request.
#[derive(Debug, Clone)]
pub struct TreeWrite {
    pub path: String,
    pub op: TreeWriteOp,
}

#[derive(Debug, Clone)]
pub enum TreeWriteOp {
    /// Create or replace the blob at the path.
    Put(Vec<u8>),
    /// Remove the path from the tree.
    Delete,
}

/// A Git-compatible host exposing blobs, trees, and commits.
pub trait RemoteHost: Send + Sync {
    /// Fetch a tree recursively, flattened to blob entries.
    fn fetch_tree(&self, tree: &TreeSha) -> RemoteResult<Vec<RemoteTreeEntry>>;

    /// Fetch blob content by hash.
    fn fetch_blob(&self, sha: &BlobId) -> RemoteResult<Vec<u8>>;

    /// List commits reachable from the default branch head, newest first.
    /// `since` is an inclusive lower bound on commit time; `page` starts
    /// at 1 with [`COMMIT_PAGE_SIZE`] commits per page.
    fn list_commits(
        &self,
        since: Option<DateTime<Utc>>,
        page: usize,
    ) -> RemoteResult<Vec<RemoteCommit>>;

    /// Create a tree from a base tree plus writes; returns the new sha.
    fn create_tree(
        &self,
        base: Option<&TreeSha>,
        writes: &[TreeWrite],
    ) -> RemoteResult<TreeSha>;

    /// Create a commit object with parent linkage.
    fn create_commit(
        &self,
        message: &str,
        tree: &TreeSha,
        parent: Option<&CommitSha>,
    ) -> RemoteResult<RemoteCommit>;

    /// Read the default branch ref. `None` when the repository has no
    /// commits yet.
    fn branch_head(&self) -> RemoteResult<Option<BranchHead>>;

    /// Compare-and-swap update of the default branch ref.
    ///
    /// Fails with [`RemoteError::RefChanged`] when the ref no longer
    /// points at `expected`.
    fn update_branch_head(
        &self,
        expected: Option<&CommitSha>,
        target: &CommitSha,
    ) -> RemoteResult<()>;

    /// Create a single file through the contents endpoint.
    ///
    /// Repository-initialization bootstrap only: tree/commit object APIs
    /// require a non-empty repository.
    fn create_file(&self, path: &str, content: &[u8], message: &str) -> RemoteResult<()>;
}
