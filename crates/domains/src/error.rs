//! # Errors
//!
//! Failure taxonomy shared by every engine operation, plus the error type
//! that persistence adapters report through the ports.

use std::fmt;

use thiserror::Error;

/// Which kind of record a `NotFound` refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Account,
    Post,
    Comment,
    ParentComment,
    StreakState,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Account => "account",
            EntityKind::Post => "post",
            EntityKind::Comment => "comment",
            EntityKind::ParentComment => "parent comment",
            EntityKind::StreakState => "streak state",
        };
        f.write_str(name)
    }
}

/// Why a state-dependent operation was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictReason {
    SelfFollow,
    AlreadyFollowing,
    NotFollowing,
    AlreadyLiked,
    NotLiked,
    UsernameTaken,
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            ConflictReason::SelfFollow => "an account cannot follow itself",
            ConflictReason::AlreadyFollowing => "already following this account",
            ConflictReason::NotFollowing => "not following this account",
            ConflictReason::AlreadyLiked => "already liked",
            ConflictReason::NotLiked => "not liked yet",
            ConflictReason::UsernameTaken => "username is already taken",
        };
        f.write_str(msg)
    }
}

/// The primary error type for all engine operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Referenced record does not exist or is not visible to the caller.
    #[error("{entity} not found with ID {id}")]
    NotFound { entity: EntityKind, id: String },

    /// Operation contradicts current membership state.
    #[error("conflict: {0}")]
    Conflict(ConflictReason),

    /// Caller may not mutate the target record.
    #[error("forbidden: {0}")]
    Authorization(String),

    /// Structural invariant violated by the input (e.g. reply across posts).
    #[error("validation error: {0}")]
    Validation(String),

    /// Persistence failure or drift detected at runtime.
    #[error("internal error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn not_found(entity: EntityKind, id: impl fmt::Display) -> Self {
        DomainError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// True when the rejected operation had already been applied, so a
    /// retried toggle can be reported to the user as success.
    pub fn is_benign_retry(&self) -> bool {
        matches!(
            self,
            DomainError::Conflict(
                ConflictReason::AlreadyLiked
                    | ConflictReason::NotLiked
                    | ConflictReason::AlreadyFollowing
                    | ConflictReason::NotFollowing
            )
        )
    }
}

/// Errors raised by storage adapters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// A write was staged for a record the unit of work never locked.
    #[error("{0} {1} was not locked in this unit of work")]
    NotLocked(EntityKind, String),

    #[error("{0} {1} already exists")]
    Duplicate(EntityKind, String),

    /// The unit of work was already committed.
    #[error("unit of work already closed")]
    Closed,
}

impl From<StoreError> for DomainError {
    fn from(err: StoreError) -> Self {
        DomainError::Internal(err.to_string())
    }
}

/// A specialized Result type for engine logic.
pub type Result<T> = std::result::Result<T, DomainError>;
