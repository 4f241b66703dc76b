//! Repository layer abstractions and the SQLite implementation.
//!
//! # Responsibility
//! - Define the per-entity data access contract (`Repository<E>`).
//! - Provide composable filters, lazy query handles and pagination.
//!
//! # Invariants
//! - Lookup misses in normal flow return `None`/empty results.
//! - Mutations only register changes; nothing is persisted until the unit
//!   of work saves.

pub mod entity_repo;
pub mod filter;
pub mod pagination;
pub mod query;
