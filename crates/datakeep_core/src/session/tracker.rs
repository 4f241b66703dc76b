//! In-memory change set.
//!
//! # Invariants
//! - At most one entry per `(entity type, key)`. Distinct entity types over
//!   the same table keep separate identities.
//! - Entries keep registration order; pending writes are emitted in it.
//! - `original` holds the last known persisted column values, or `None` for
//!   entries never read from the store.

use crate::entity::{Entity, EntityKey};
use crate::session::sql;
use rusqlite::types::Value;
use rusqlite::Connection;
use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;

/// Tracked state of one entity in the change set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityState {
    Unchanged,
    Added,
    Modified,
    Deleted,
}

/// Read-only view of one change-set entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrySummary {
    pub table: &'static str,
    pub key: EntityKey,
    pub state: EntityState,
}

/// Type-erased access to a tracked entity.
pub(crate) trait TrackedEntity: Debug {
    fn entity_type(&self) -> TypeId;
    fn table(&self) -> &'static str;
    fn key_columns(&self) -> &'static [&'static str];
    fn columns(&self) -> &'static [&'static str];
    fn entity_key(&self) -> EntityKey;
    fn column_values(&self) -> Vec<Value>;
    fn reload(&self, conn: &Connection) -> rusqlite::Result<Option<Box<dyn TrackedEntity>>>;
    fn as_any(&self) -> &dyn Any;
}

impl<E: Entity> TrackedEntity for E {
    fn entity_type(&self) -> TypeId {
        TypeId::of::<E>()
    }

    fn table(&self) -> &'static str {
        E::TABLE
    }

    fn key_columns(&self) -> &'static [&'static str] {
        E::KEY_COLUMNS
    }

    fn columns(&self) -> &'static [&'static str] {
        E::COLUMNS
    }

    fn entity_key(&self) -> EntityKey {
        self.key()
    }

    fn column_values(&self) -> Vec<Value> {
        self.values()
    }

    fn reload(&self, conn: &Connection) -> rusqlite::Result<Option<Box<dyn TrackedEntity>>> {
        let fresh = sql::select_by_key::<E>(conn, &self.key())?;
        Ok(fresh.map(|entity| Box::new(entity) as Box<dyn TrackedEntity>))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug)]
pub(crate) struct TrackedEntry {
    pub(crate) state: EntityState,
    pub(crate) entity: Box<dyn TrackedEntity>,
    pub(crate) original: Option<Vec<Value>>,
}

/// A write the next save must apply.
#[derive(Debug)]
pub(crate) struct PendingWrite {
    pub(crate) state: EntityState,
    pub(crate) table: &'static str,
    pub(crate) key_columns: &'static [&'static str],
    pub(crate) columns: &'static [&'static str],
    pub(crate) key: EntityKey,
    pub(crate) values: Vec<Value>,
}

type EntryId = (TypeId, EntityKey);

#[derive(Debug, Default)]
pub(crate) struct ChangeTracker {
    entries: BTreeMap<u64, TrackedEntry>,
    index: HashMap<EntryId, u64>,
    next_seq: u64,
}

impl ChangeTracker {
    pub(crate) fn get<E: Entity>(&self, key: &EntityKey) -> Option<&TrackedEntry> {
        let seq = self.index.get(&entry_id::<E>(key))?;
        self.entries.get(seq)
    }

    pub(crate) fn get_mut<E: Entity>(&mut self, key: &EntityKey) -> Option<&mut TrackedEntry> {
        let seq = self.index.get(&entry_id::<E>(key))?;
        self.entries.get_mut(seq)
    }

    pub(crate) fn contains<E: Entity>(&self, key: &EntityKey) -> bool {
        self.index.contains_key(&entry_id::<E>(key))
    }

    /// Adds a new entry. Callers check `contains` first.
    pub(crate) fn track(
        &mut self,
        entity: Box<dyn TrackedEntity>,
        state: EntityState,
        original: Option<Vec<Value>>,
    ) {
        let id = (entity.entity_type(), entity.entity_key());
        let seq = self.next_seq;
        self.next_seq += 1;
        self.index.insert(id, seq);
        self.entries.insert(
            seq,
            TrackedEntry {
                state,
                entity,
                original,
            },
        );
    }

    pub(crate) fn detach<E: Entity>(&mut self, key: &EntityKey) -> Option<TrackedEntry> {
        let seq = self.index.remove(&entry_id::<E>(key))?;
        self.entries.remove(&seq)
    }

    pub(crate) fn has_changes(&self) -> bool {
        self.entries
            .values()
            .any(|entry| entry.state != EntityState::Unchanged)
    }

    pub(crate) fn summaries(&self) -> Vec<EntrySummary> {
        self.entries
            .values()
            .map(|entry| EntrySummary {
                table: entry.entity.table(),
                key: entry.entity.entity_key(),
                state: entry.state,
            })
            .collect()
    }

    pub(crate) fn pending_writes(&self) -> Vec<PendingWrite> {
        self.entries
            .values()
            .filter(|entry| entry.state != EntityState::Unchanged)
            .map(|entry| PendingWrite {
                state: entry.state,
                table: entry.entity.table(),
                key_columns: entry.entity.key_columns(),
                columns: entry.entity.columns(),
                key: entry.entity.entity_key(),
                values: entry.entity.column_values(),
            })
            .collect()
    }

    /// Marks every pending write as persisted.
    pub(crate) fn accept_all(&mut self) {
        let deleted: Vec<u64> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.state == EntityState::Deleted)
            .map(|(seq, _)| *seq)
            .collect();
        for seq in deleted {
            self.remove_seq(seq);
        }

        for entry in self.entries.values_mut() {
            if matches!(entry.state, EntityState::Added | EntityState::Modified) {
                entry.original = Some(entry.entity.column_values());
                entry.state = EntityState::Unchanged;
            }
        }
    }

    /// Re-synchronizes every entry not pending add with the store.
    ///
    /// Entries whose row is gone are detached. Every entry is attempted even
    /// after a failed reload; the first failure is returned and the entries
    /// that failed keep their local state. Returns the number of entries
    /// refreshed.
    pub(crate) fn reload_persisted(&mut self, conn: &Connection) -> rusqlite::Result<usize> {
        let targets: Vec<u64> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.state != EntityState::Added)
            .map(|(seq, _)| *seq)
            .collect();

        let mut refreshed = 0;
        let mut first_error = None;
        for seq in targets {
            let Some(entry) = self.entries.get(&seq) else {
                continue;
            };
            let reloaded = match entry.entity.reload(conn) {
                Ok(reloaded) => reloaded,
                Err(err) => {
                    first_error.get_or_insert(err);
                    continue;
                }
            };
            match reloaded {
                Some(fresh) => {
                    if let Some(entry) = self.entries.get_mut(&seq) {
                        entry.original = Some(fresh.column_values());
                        entry.entity = fresh;
                        entry.state = EntityState::Unchanged;
                        refreshed += 1;
                    }
                }
                None => self.remove_seq(seq),
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(refreshed),
        }
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }

    fn remove_seq(&mut self, seq: u64) {
        if let Some(entry) = self.entries.remove(&seq) {
            self.index
                .remove(&(entry.entity.entity_type(), entry.entity.entity_key()));
        }
    }
}

fn entry_id<E: Entity>(key: &EntityKey) -> EntryId {
    (TypeId::of::<E>(), key.clone())
}
