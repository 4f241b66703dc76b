//! SQLite storage bootstrap.
//!
//! # Responsibility
//! - Open and configure SQLite connections for the data-access layer.
//! - Define the transport-level error shared by sessions and repositories.
//!
//! # Invariants
//! - Returned connections already carry the pragmas from `SessionConfig`.
//! - Schema (DDL) is owned by callers; this module never creates tables.

use std::error::Error;
use std::fmt::{Display, Formatter};

mod config;
mod open;

pub use config::{BeginMode, SessionConfig};
pub use open::{open_db, open_db_in_memory, open_db_in_memory_with, open_db_with};

pub type DbResult<T> = Result<T, DbError>;

/// Transport-level failure reported by the backing store.
#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    InvalidConfig(String),
    /// An update or delete matched no row.
    StaleRow {
        table: &'static str,
        key: String,
    },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::InvalidConfig(message) => write!(f, "invalid session config: {message}"),
            Self::StaleRow { table, key } => {
                write!(f, "expected a row in {table} for key {key}, found none")
            }
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::InvalidConfig(_) | Self::StaleRow { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
