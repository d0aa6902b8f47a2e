//! Storage layer error types.
//!
//! All errors that can occur during storage operations are defined here.
//! We use `thiserror` for ergonomic error definition and better messages.
//!
//! Ref-count and garbage-collection errors indicate a data-integrity bug;
//! they abort the current transaction and are never retried.

use thiserror::Error;

use crate::storage::types::{BlobId, IndexId, RepositoryId};

/// the main error type for storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    /// error from the underlying git hashing library
    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    /// the requested blob content was not found
    #[error("blob not found: {0}")]
    BlobNotFound(BlobId),

    /// a ref-count was touched for a blob id that was never put
    #[error("missing ref-count record for blob: {0}")]
    MissingRefCount(BlobId),

    /// a decrement would take a ref-count below zero
    #[error("ref-count underflow for blob: {0}")]
    NegativeRefCount(BlobId),

    /// the requested file index does not exist
    #[error("file index not found: repository={repository}, index={index}")]
    IndexNotFound {
        repository: RepositoryId,
        index: IndexId,
    },

    /// the requested repository does not exist
    #[error("repository not found: {0}")]
    RepositoryNotFound(RepositoryId),

    /// the repository already exists
    #[error("repository already exists: {0}")]
    RepositoryExists(RepositoryId),

    /// the path does not name a tracked file
    #[error("file not found in index: {0}")]
    PathNotFound(String),

    /// the target path is already taken by another node
    #[error("path already occupied: {0}")]
    PathOccupied(String),

    /// only markdown-suffixed paths can be edited
    #[error("path is not a manageable markdown file: {0}")]
    UnmanagedPath(String),

    /// a rebase index already exists for this repository
    #[error("a rebase is already in progress for repository: {0}")]
    RebaseInProgress(RepositoryId),

    /// no rebase index exists to operate on
    #[error("no rebase in progress for repository: {0}")]
    NoRebaseInProgress(RepositoryId),

    /// JSON serialization or deserialization failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// internal error that shouldn't happen
    #[error("internal error: {0}")]
    Internal(String),
}

impl StorageError {
    /// check if this error indicates the resource doesn't exist
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StorageError::BlobNotFound(_)
                | StorageError::IndexNotFound { .. }
                | StorageError::RepositoryNotFound(_)
                | StorageError::PathNotFound(_)
        )
    }

    /// check if this error is a data-integrity violation
    ///
    /// These are programming errors, not user-recoverable conditions, and
    /// should fail loudly in tests.
    pub fn is_integrity_violation(&self) -> bool {
        matches!(
            self,
            StorageError::MissingRefCount(_)
                | StorageError::NegativeRefCount(_)
                | StorageError::Internal(_)
        )
    }
}

/// result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let not_found = StorageError::RepositoryNotFound(RepositoryId::new("notes"));
        assert!(not_found.is_not_found());
        assert!(!not_found.is_integrity_violation());

        let underflow = StorageError::NegativeRefCount(BlobId::temporary());
        assert!(underflow.is_integrity_violation());
        assert!(!underflow.is_not_found());
    }
}
