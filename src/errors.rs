//! Error taxonomy shared by every component
//!
//! - `NotFound`: a missing object, entry or reference; callers decide how to recover
//! - `Malformed` / `Corrupt`: data integrity violations, never repaired silently
//! - `Conflict` / `BinaryConflict`: expected outcomes of merges that need resolution
//! - `OperationsRemaining` / `InvalidState` / `AlreadyApplied`: state machine misuse
//! - `Io`: failures of the working tree or the on-disk stores, propagated unchanged

use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0} not found")]
    NotFound(String),

    #[error("malformed data: {0}")]
    Malformed(String),

    #[error("object {id} is corrupt: {reason}")]
    Corrupt { id: String, reason: String },

    #[error("object {id} is a {actual}, expected a {expected}")]
    KindMismatch {
        id: ObjectId,
        expected: ObjectType,
        actual: ObjectType,
    },

    #[error("unresolved conflicts in: {}", .0.join(", "))]
    Conflict(Vec<String>),

    #[error("cannot merge binary content")]
    BinaryConflict,

    #[error("{remaining} rebase operation(s) remaining")]
    OperationsRemaining { remaining: usize },

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("changes of {0} are already applied")]
    AlreadyApplied(ObjectId),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Regex(#[from] regex::Error),
}

impl Error {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Error::Malformed(reason.into())
    }

    pub fn corrupt(id: impl std::fmt::Display, reason: impl Into<String>) -> Self {
        Error::Corrupt {
            id: id.to_string(),
            reason: reason.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict(_) | Error::BinaryConflict)
    }
}
