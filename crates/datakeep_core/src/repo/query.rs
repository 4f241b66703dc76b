//! Lazy, composable query handles.
//!
//! # Responsibility
//! - Hold the description of a query over one entity table.
//! - Execute it against current store state every time it is materialized.
//!
//! # Invariants
//! - Building or composing a handle never touches the store.
//! - Results are ordered by the explicit order terms, then by key columns,
//!   so paging over a handle is stable.
//! - `read_only` handles never register results in the change set.
//! - Tracked handles leave out entities pending delete in the session.

use crate::entity::{parse_included, Entity, LoadContext, Relation};
use crate::error::StoreResult;
use crate::repo::filter::Filter;
use crate::session::Session;

/// Sort direction for `Query::order_by`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct OrderTerm {
    pub(crate) column: String,
    pub(crate) direction: Direction,
}

/// Store-facing part of a query: predicate, ordering and window.
#[derive(Debug, Clone, PartialEq, Default)]
pub(crate) struct Selection {
    pub(crate) filter: Filter,
    pub(crate) order: Vec<OrderTerm>,
    pub(crate) limit: Option<u64>,
    pub(crate) offset: u64,
}

impl Selection {
    pub(crate) fn new(filter: Filter) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    fn skip(&mut self, count: u64) {
        self.offset = self.offset.saturating_add(count);
        if let Some(limit) = self.limit {
            self.limit = Some(limit.saturating_sub(count));
        }
    }

    fn take(&mut self, count: u64) {
        self.limit = Some(self.limit.map_or(count, |limit| limit.min(count)));
    }
}

/// Deferred query over entity `E`.
///
/// Nothing runs until one of `to_vec`, `iter`, `first`, `count` or `any` is
/// called; each call re-executes against the store.
pub struct Query<'s, E: Entity> {
    session: &'s Session,
    selection: Selection,
    includes: Vec<&'static Relation<E>>,
    tracking: bool,
}

impl<'s, E: Entity> Query<'s, E> {
    pub(crate) fn new(
        session: &'s Session,
        filter: Filter,
        read_only: bool,
        includes: Vec<&'static Relation<E>>,
    ) -> Self {
        Self {
            session,
            selection: Selection::new(filter),
            includes,
            tracking: !read_only,
        }
    }

    /// Narrows the query with an additional predicate.
    pub fn filter(mut self, filter: Filter) -> Self {
        self.selection.filter = std::mem::take(&mut self.selection.filter).and(filter);
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, direction: Direction) -> Self {
        self.selection.order.push(OrderTerm {
            column: column.into(),
            direction,
        });
        self
    }

    pub fn skip(mut self, count: u64) -> Self {
        self.selection.skip(count);
        self
    }

    pub fn take(mut self, count: u64) -> Self {
        self.selection.take(count);
        self
    }

    /// Adds eagerly loaded relations from a comma-separated list.
    pub fn include(mut self, included: &str) -> StoreResult<Self> {
        for relation in parse_included::<E>(included)? {
            if !self
                .includes
                .iter()
                .any(|known| known.name() == relation.name())
            {
                self.includes.push(relation);
            }
        }
        Ok(self)
    }

    pub fn as_no_tracking(mut self) -> Self {
        self.tracking = false;
        self
    }

    pub fn is_read_only(&self) -> bool {
        !self.tracking
    }

    /// Executes the query and returns every matching entity.
    pub fn to_vec(&self) -> StoreResult<Vec<E>> {
        self.materialize(&self.selection)
    }

    /// Executes the query; calling it again re-runs it.
    pub fn iter(&self) -> StoreResult<std::vec::IntoIter<E>> {
        Ok(self.to_vec()?.into_iter())
    }

    pub fn first(&self) -> StoreResult<Option<E>> {
        let mut selection = self.selection.clone();
        selection.take(1);
        Ok(self.materialize(&selection)?.into_iter().next())
    }

    /// Counts matching stored rows, honoring `skip`/`take`. Pending changes
    /// in the session are not applied.
    pub fn count(&self) -> StoreResult<u64> {
        self.session.count::<E>(&self.selection)
    }

    pub fn any(&self) -> StoreResult<bool> {
        let mut selection = self.selection.clone();
        selection.take(1);
        Ok(self.session.count::<E>(&selection)? > 0)
    }

    fn materialize(&self, selection: &Selection) -> StoreResult<Vec<E>> {
        let mut entities = self.session.fetch::<E>(selection, self.tracking)?;
        if self.includes.is_empty() {
            return Ok(entities);
        }

        let ctx = LoadContext::new(self.session, self.tracking);
        for entity in &mut entities {
            for relation in &self.includes {
                relation.ensure_loaded(&ctx, entity)?;
            }
        }
        Ok(entities)
    }
}
