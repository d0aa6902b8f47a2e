//! Engine-level error types.
//!
//! Three tiers, per the crate's error taxonomy:
//! - storage precondition violations surface as [`StorageError`] and abort
//!   the current transaction;
//! - domain errors carry a stable [`ErrorCode`] so callers can branch
//!   without string matching;
//! - remote-host failures are wrapped with the failing operation and the
//!   original error retained as cause.

use thiserror::Error;

use crate::remote::RemoteError;
use crate::storage::error::StorageError;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Stable codes for domain errors callers are expected to branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Missing or invalid credential.
    Unauthorized,
    /// A rebase produced conflicts; manual resolution is required.
    RebaseConflicts,
    /// The branch ref moved under us (optimistic-lock loss).
    PushRejected,
    /// The user aborted an interactive step.
    Canceled,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let code = match self {
            ErrorCode::Unauthorized => "unauthorized",
            ErrorCode::RebaseConflicts => "rebase_conflicts",
            ErrorCode::PushRejected => "push_rejected",
            ErrorCode::Canceled => "canceled",
        };
        write!(f, "{}", code)
    }
}

/// The main error type for sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Storage layer error (includes data-integrity violations).
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Domain error with a stable code.
    #[error("{message} ({code})")]
    Domain { code: ErrorCode, message: String },

    /// A remote-host call failed; the operation names what we were doing.
    #[error("remote call failed: {operation}: {source}")]
    Remote {
        operation: &'static str,
        #[source]
        source: RemoteError,
    },
}

impl SyncError {
    /// Wrap a remote-host failure with the operation that was attempted.
    ///
    /// Authorization and optimistic-lock failures keep their domain codes
    /// so callers can branch on them.
    pub fn remote(operation: &'static str, source: RemoteError) -> Self {
        match source {
            RemoteError::Unauthorized => Self::unauthorized(),
            RemoteError::RefChanged => Self::push_rejected(),
            source => SyncError::Remote { operation, source },
        }
    }

    pub fn unauthorized() -> Self {
        SyncError::Domain {
            code: ErrorCode::Unauthorized,
            message: "missing or invalid credential".to_string(),
        }
    }

    pub fn rebase_conflicts(count: i64) -> Self {
        SyncError::Domain {
            code: ErrorCode::RebaseConflicts,
            message: format!("rebase produced {} conflicting file(s)", count),
        }
    }

    pub fn push_rejected() -> Self {
        SyncError::Domain {
            code: ErrorCode::PushRejected,
            message: "branch was updated by another client".to_string(),
        }
    }

    pub fn canceled() -> Self {
        SyncError::Domain {
            code: ErrorCode::Canceled,
            message: "operation canceled".to_string(),
        }
    }

    /// The stable code for this error, if it is a domain error.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            SyncError::Domain { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Check if this error is the optimistic-lock loss the orchestrator
    /// retries on.
    pub fn is_push_rejected(&self) -> bool {
        self.code() == Some(ErrorCode::PushRejected)
    }

    /// Check if this error means a rebase needs manual resolution.
    pub fn is_rebase_conflicts(&self) -> bool {
        self.code() == Some(ErrorCode::RebaseConflicts)
    }
}
