//! Generic data-access layer over SQLite.
//!
//! `Repository<E>` gives typed CRUD, querying and pagination over one entity
//! table; `UnitOfWork` owns the session and its save/commit/rollback
//! protocol. Both share one `Session` holding the connection and the
//! explicit change set.

pub mod db;
pub mod entity;
pub mod error;
pub mod logging;
pub mod repo;
pub mod session;
pub mod uow;

pub use db::{
    open_db, open_db_in_memory, open_db_in_memory_with, open_db_with, BeginMode, DbError, DbResult,
    SessionConfig,
};
pub use entity::{Entity, EntityKey, KeyPart, LoadContext, Relation, RelationKind};
pub use error::{StoreError, StoreResult};
pub use logging::{default_log_level, init_logging, logging_status, LoggingConfig};
pub use repo::entity_repo::{Repository, SqliteRepository};
pub use repo::filter::{CompareOp, Filter};
pub use repo::pagination::Pagination;
pub use repo::query::{Direction, Query};
pub use session::{EntityState, EntrySummary, Session};
pub use uow::unit_of_work::{SqliteUnitOfWork, UnitOfWork, UnitOfWorkState};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
