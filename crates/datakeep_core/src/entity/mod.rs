//! Entity mapping contracts.
//!
//! # Responsibility
//! - Describe how a Rust record maps onto one SQLite table.
//! - Expose named relations that repositories can load on demand.
//!
//! # Invariants
//! - `KEY_COLUMNS` and `key()` agree in length and order.
//! - `COLUMNS` and `values()` agree in length and order.
//! - `from_row` reads columns by name and never depends on select order.

mod key;
mod relation;

pub use key::{EntityKey, KeyPart};
pub use relation::{LoadContext, LoadFn, Relation, RelationKind};

pub(crate) use relation::{find_relation_of_kind, parse_included};

use rusqlite::types::Value;
use rusqlite::Row;
use std::fmt::Debug;

/// A record type persisted in a single table.
///
/// Relation fields (references or collections to other entities) are not
/// columns; they stay `None` until loaded through a `Relation`.
pub trait Entity: Clone + Debug + 'static {
    /// Table the entity is stored in.
    const TABLE: &'static str;
    /// Primary key columns, in key order.
    const KEY_COLUMNS: &'static [&'static str];
    /// Non-key columns written on insert/update.
    const COLUMNS: &'static [&'static str];

    /// Current primary key value.
    fn key(&self) -> EntityKey;

    /// Non-key column values, ordered like `COLUMNS`.
    fn values(&self) -> Vec<Value>;

    /// Builds an entity from a row holding every key and value column.
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;

    /// Named relations supported by this entity.
    fn relations() -> &'static [Relation<Self>] {
        &[]
    }
}
