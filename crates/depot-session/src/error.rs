//! Error types for session locking.

use depot_types::{RepoPath, TypeError};
use thiserror::Error;

/// Errors raised by the session lock manager and the item repository.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The session holds a read lock and the caller did not ask to upgrade.
    #[error("{path} is read-locked by this session; an upgrade must be requested explicitly")]
    UpgradeRequired { path: RepoPath },

    /// A write-locked entry has no working copy. Indicates a defect.
    #[error("{path} is write-locked but has no working copy")]
    MissingWorkingCopy { path: RepoPath },

    /// A lock entry was built from inconsistent parts. Indicates a defect.
    #[error("lock entry invariant violated for {path}: {reason}")]
    InvariantViolation { path: RepoPath, reason: String },

    /// Failure reported by the item repository.
    #[error("item repository error: {0}")]
    Repository(String),

    #[error(transparent)]
    Type(#[from] TypeError),
}

impl SessionError {
    /// Whether the error signals a broken internal invariant rather than a
    /// condition the caller can act on.
    pub fn is_defect(&self) -> bool {
        matches!(
            self,
            Self::MissingWorkingCopy { .. } | Self::InvariantViolation { .. }
        )
    }
}

/// Result alias for session operations.
pub type SessionResult<T> = Result<T, SessionError>;
