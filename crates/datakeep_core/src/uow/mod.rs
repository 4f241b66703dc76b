//! Unit-of-work coordination.
//!
//! # Responsibility
//! - Own the persistence session and its lifecycle.
//! - Expose the begin/save/commit/rollback protocol over it.
//!
//! # See also
//! - `crate::repo` for the per-entity contract sharing the same session.

pub mod unit_of_work;
