//! Generic entity repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide find/query/paginate/insert/update/remove over one entity type.
//! - Resolve relation names and drive eager/explicit relation loading.
//!
//! # Invariants
//! - Relation names are validated before any store access.
//! - Batch registrations are all-or-nothing.
//! - Every operation fails with `UseAfterDispose` once the session is closed.

use crate::entity::{
    find_relation_of_kind, parse_included, Entity, EntityKey, LoadContext, Relation, RelationKind,
};
use crate::error::{StoreError, StoreResult};
use crate::repo::filter::Filter;
use crate::repo::pagination::Pagination;
use crate::repo::query::Query;
use crate::session::Session;
use std::marker::PhantomData;

/// Repository interface for one entity type.
pub trait Repository<E: Entity> {
    /// Loads a single-valued relation into `entity` unless already loaded.
    fn load_navigation<'e>(
        &self,
        entity: &'e mut E,
        relation: &Relation<E>,
    ) -> StoreResult<&'e mut E>;

    /// Loads a collection relation, addressed by name.
    fn load_collection<'e>(&self, entity: &'e mut E, relation: &str) -> StoreResult<&'e mut E>;

    /// Finds an entity by primary key.
    fn get_by_key<K: Into<EntityKey>>(&self, key: K) -> StoreResult<Option<E>> {
        self.get_by_key_with(key, &[], &[])
    }

    /// Finds an entity by primary key and loads the named relations, in
    /// order, before returning it.
    fn get_by_key_with<K: Into<EntityKey>>(
        &self,
        key: K,
        navigations: &[&str],
        collections: &[&str],
    ) -> StoreResult<Option<E>>;

    /// Builds a lazy query. `included` is a comma-separated relation list.
    fn query(&self, filter: Filter, read_only: bool, included: &str) -> StoreResult<Query<'_, E>>;

    fn get_all(&self, included: &str, read_only: bool) -> StoreResult<Query<'_, E>> {
        self.query(Filter::All, read_only, included)
    }

    /// Fills `total_items` and `items` for the requested page, ordered by key.
    fn paginate(&self, mut pagination: Pagination<E>) -> StoreResult<Pagination<E>> {
        let offset = pagination.offset()?;
        let base = self.get_all("", true)?;
        pagination.total_items = base.count()?;
        pagination.items = base.skip(offset).take(pagination.page_length).to_vec()?;
        Ok(pagination)
    }

    /// Registers `entity` as pending add.
    fn insert(&self, entity: E) -> StoreResult<E>;

    fn insert_many(&self, entities: Vec<E>) -> StoreResult<Vec<E>>;

    /// Registers new column values for `entity`.
    fn update(&self, entity: E) -> StoreResult<E>;

    /// Registers `entity` as pending delete.
    fn remove(&self, entity: E) -> StoreResult<E>;

    fn remove_by_key<K: Into<EntityKey>>(&self, key: K) -> StoreResult<E>;

    fn remove_many(&self, entities: Vec<E>) -> StoreResult<Vec<E>>;

    /// Resolves every key before registering anything; fails with
    /// `NotFound` naming all missing keys.
    fn remove_many_by_keys<K, I>(&self, keys: I) -> StoreResult<Vec<E>>
    where
        K: Into<EntityKey>,
        I: IntoIterator<Item = K>;
}

/// SQLite-backed repository borrowing a session.
pub struct SqliteRepository<'s, E: Entity> {
    session: &'s Session,
    _entity: PhantomData<fn() -> E>,
}

impl<'s, E: Entity> SqliteRepository<'s, E> {
    pub fn new(session: &'s Session) -> Self {
        Self {
            session,
            _entity: PhantomData,
        }
    }

    fn load_context(&self) -> LoadContext<'s> {
        LoadContext::new(self.session, true)
    }
}

impl<E: Entity> Repository<E> for SqliteRepository<'_, E> {
    fn load_navigation<'e>(
        &self,
        entity: &'e mut E,
        relation: &Relation<E>,
    ) -> StoreResult<&'e mut E> {
        self.session.ensure_open()?;
        if relation.kind() != RelationKind::Reference {
            return Err(StoreError::InvalidRelation {
                entity: E::TABLE,
                relation: relation.name().to_string(),
            });
        }
        relation.ensure_loaded(&self.load_context(), entity)?;
        Ok(entity)
    }

    fn load_collection<'e>(&self, entity: &'e mut E, relation: &str) -> StoreResult<&'e mut E> {
        self.session.ensure_open()?;
        let relation = find_relation_of_kind::<E>(relation, RelationKind::Collection)?;
        relation.ensure_loaded(&self.load_context(), entity)?;
        Ok(entity)
    }

    fn get_by_key_with<K: Into<EntityKey>>(
        &self,
        key: K,
        navigations: &[&str],
        collections: &[&str],
    ) -> StoreResult<Option<E>> {
        self.session.ensure_open()?;
        let mut relations = Vec::with_capacity(navigations.len() + collections.len());
        for name in navigations {
            relations.push(find_relation_of_kind::<E>(name, RelationKind::Reference)?);
        }
        for name in collections {
            relations.push(find_relation_of_kind::<E>(name, RelationKind::Collection)?);
        }

        let Some(mut entity) = self.session.find::<E>(&key.into(), true)? else {
            return Ok(None);
        };
        let ctx = self.load_context();
        for relation in relations {
            relation.ensure_loaded(&ctx, &mut entity)?;
        }
        Ok(Some(entity))
    }

    fn query(&self, filter: Filter, read_only: bool, included: &str) -> StoreResult<Query<'_, E>> {
        self.session.ensure_open()?;
        let includes = parse_included::<E>(included)?;
        Ok(Query::new(self.session, filter, read_only, includes))
    }

    fn insert(&self, entity: E) -> StoreResult<E> {
        let mut registered = self.session.register_added(vec![entity])?;
        registered
            .pop()
            .ok_or_else(|| StoreError::InvalidState("insert registered nothing".to_string()))
    }

    fn insert_many(&self, entities: Vec<E>) -> StoreResult<Vec<E>> {
        self.session.register_added(entities)
    }

    fn update(&self, entity: E) -> StoreResult<E> {
        self.session.register_modified(entity)
    }

    fn remove(&self, entity: E) -> StoreResult<E> {
        self.session.register_deleted(entity)
    }

    fn remove_by_key<K: Into<EntityKey>>(&self, key: K) -> StoreResult<E> {
        let key = key.into();
        match self.session.find::<E>(&key, true)? {
            Some(entity) => self.session.register_deleted(entity),
            None => Err(StoreError::NotFound {
                entity: E::TABLE,
                keys: vec![key.to_string()],
            }),
        }
    }

    fn remove_many(&self, entities: Vec<E>) -> StoreResult<Vec<E>> {
        self.session.ensure_open()?;
        entities
            .into_iter()
            .map(|entity| self.session.register_deleted(entity))
            .collect()
    }

    fn remove_many_by_keys<K, I>(&self, keys: I) -> StoreResult<Vec<E>>
    where
        K: Into<EntityKey>,
        I: IntoIterator<Item = K>,
    {
        self.session.ensure_open()?;
        let mut found = Vec::new();
        let mut missing = Vec::new();
        for key in keys {
            let key = key.into();
            match self.session.find::<E>(&key, false)? {
                Some(entity) => found.push(entity),
                None => missing.push(key.to_string()),
            }
        }
        if !missing.is_empty() {
            return Err(StoreError::NotFound {
                entity: E::TABLE,
                keys: missing,
            });
        }
        self.remove_many(found)
    }
}
