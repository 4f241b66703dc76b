//! Uniform error surface of the data-access layer.
//!
//! # Invariants
//! - No `rusqlite` error reaches callers except wrapped in `Storage` or
//!   `Conflict`.
//! - `Conflict` always carries the store failure that caused it.

use crate::db::DbError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors returned by repositories, query handles and the unit of work.
#[derive(Debug)]
pub enum StoreError {
    /// Key lookup miss where presence is required.
    NotFound {
        entity: &'static str,
        keys: Vec<String>,
    },
    /// Unknown relation name, or a relation of the wrong kind.
    InvalidRelation {
        entity: &'static str,
        relation: String,
    },
    InvalidArgument(String),
    /// Illegal transaction nesting or duplicate registration.
    InvalidState(String),
    /// Save/commit failure; the change set was rolled back in memory.
    Conflict(DbError),
    UseAfterDispose,
    /// Store failure on a read path.
    Storage(DbError),
}

impl StoreError {
    pub(crate) fn invalid_relation(entity: &'static str, relation: impl Into<String>) -> Self {
        Self::InvalidRelation {
            entity,
            relation: relation.into(),
        }
    }

    /// Returns whether this error is a save/commit conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { entity, keys } => {
                write!(f, "{entity} not found for key(s): {}", keys.join(", "))
            }
            Self::InvalidRelation { entity, relation } => {
                write!(f, "{entity} has no relation named `{relation}`")
            }
            Self::InvalidArgument(message) => write!(f, "invalid argument: {message}"),
            Self::InvalidState(message) => write!(f, "invalid state: {message}"),
            Self::Conflict(err) => write!(f, "conflict: {err}"),
            Self::UseAfterDispose => write!(f, "unit of work has been disposed"),
            Self::Storage(err) => write!(f, "storage failure: {err}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Conflict(err) | Self::Storage(err) => Some(err),
            Self::NotFound { .. }
            | Self::InvalidRelation { .. }
            | Self::InvalidArgument(_)
            | Self::InvalidState(_)
            | Self::UseAfterDispose => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Storage(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Storage(DbError::Sqlite(value))
    }
}
