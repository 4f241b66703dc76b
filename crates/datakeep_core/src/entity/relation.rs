//! Named relations between entities.
//!
//! A relation is plain data: a name, a kind, and two function pointers that
//! check and fill the relation field on an entity. Entities expose them as
//! constants, so `load_navigation` receives a compile-time-checked selector
//! while string-based lookups go through `find_relation`.

use super::{Entity, EntityKey};
use crate::error::{StoreError, StoreResult};
use crate::repo::filter::Filter;
use crate::repo::query::Selection;
use crate::session::Session;
use std::fmt::{Debug, Formatter};

/// Whether a relation points at one record or many.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    Reference,
    Collection,
}

/// Loader signature used by relations.
pub type LoadFn<E> = fn(&LoadContext<'_>, &mut E) -> StoreResult<()>;

/// A named, loadable relation on entity `E`.
pub struct Relation<E> {
    name: &'static str,
    kind: RelationKind,
    is_loaded: fn(&E) -> bool,
    load: LoadFn<E>,
}

impl<E> Relation<E> {
    /// Declares a single-valued relation.
    pub const fn reference(name: &'static str, is_loaded: fn(&E) -> bool, load: LoadFn<E>) -> Self {
        Self {
            name,
            kind: RelationKind::Reference,
            is_loaded,
            load,
        }
    }

    /// Declares a collection-valued relation.
    pub const fn collection(
        name: &'static str,
        is_loaded: fn(&E) -> bool,
        load: LoadFn<E>,
    ) -> Self {
        Self {
            name,
            kind: RelationKind::Collection,
            is_loaded,
            load,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn kind(&self) -> RelationKind {
        self.kind
    }

    pub fn is_loaded(&self, entity: &E) -> bool {
        (self.is_loaded)(entity)
    }

    /// Loads the relation unless it is already present on `entity`.
    pub(crate) fn ensure_loaded(&self, ctx: &LoadContext<'_>, entity: &mut E) -> StoreResult<()> {
        if (self.is_loaded)(entity) {
            return Ok(());
        }
        (self.load)(ctx, entity)
    }
}

impl<E> Clone for Relation<E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for Relation<E> {}

impl<E> Debug for Relation<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relation")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Handle given to relation loaders for reading related entities.
///
/// Related entities are tracked when the owning load is tracked.
pub struct LoadContext<'s> {
    session: &'s Session,
    tracking: bool,
}

impl<'s> LoadContext<'s> {
    pub(crate) fn new(session: &'s Session, tracking: bool) -> Self {
        Self { session, tracking }
    }

    /// Finds one related entity by key.
    pub fn find<R: Entity>(&self, key: impl Into<EntityKey>) -> StoreResult<Option<R>> {
        self.session.find::<R>(&key.into(), self.tracking)
    }

    /// Finds every related entity matching `filter`, ordered by key.
    pub fn find_where<R: Entity>(&self, filter: Filter) -> StoreResult<Vec<R>> {
        self.session
            .fetch::<R>(&Selection::new(filter), self.tracking)
    }
}

/// Looks up a relation of `E` by name.
pub(crate) fn find_relation<E: Entity>(name: &str) -> StoreResult<&'static Relation<E>> {
    E::relations()
        .iter()
        .find(|relation| relation.name == name)
        .ok_or_else(|| StoreError::invalid_relation(E::TABLE, name))
}

/// Looks up a relation by name and requires the given kind.
pub(crate) fn find_relation_of_kind<E: Entity>(
    name: &str,
    kind: RelationKind,
) -> StoreResult<&'static Relation<E>> {
    let relation = find_relation::<E>(name)?;
    if relation.kind != kind {
        return Err(StoreError::invalid_relation(E::TABLE, name));
    }
    Ok(relation)
}

/// Parses a comma-separated relation list; empty segments are ignored.
pub(crate) fn parse_included<E: Entity>(included: &str) -> StoreResult<Vec<&'static Relation<E>>> {
    included
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(find_relation::<E>)
        .collect()
}
