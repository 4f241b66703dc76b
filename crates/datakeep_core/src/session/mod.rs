//! Persistence session: one connection plus its change set.
//!
//! # Responsibility
//! - Own the SQLite connection and the in-memory change set.
//! - Perform tracked/untracked reads, change registration and flushes.
//! - Track the explicit transaction opened by the unit of work.
//!
//! # Invariants
//! - A closed session rejects every operation with `UseAfterDispose`.
//! - A failed flush never leaves a partial write in the store.
//! - Sessions are single-threaded (`!Sync`); callers serialize access.

pub(crate) mod sql;
mod tracker;

pub use tracker::{EntityState, EntrySummary};

use crate::db::{BeginMode, DbError, SessionConfig};
use crate::entity::{Entity, EntityKey};
use crate::error::{StoreError, StoreResult};
use crate::repo::query::Selection;
use log::{debug, warn};
use rusqlite::Connection;
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use tracker::{ChangeTracker, PendingWrite};

/// A unit of connectivity to the backing store with its change set.
pub struct Session {
    conn: RefCell<Option<Connection>>,
    tracker: RefCell<ChangeTracker>,
    begin_mode: BeginMode,
    in_transaction: Cell<bool>,
    savepoint_seq: Cell<u64>,
}

impl Session {
    /// Wraps an opened connection using the default session config.
    pub fn new(conn: Connection) -> Self {
        Self::with_config(conn, &SessionConfig::default())
    }

    pub fn with_config(conn: Connection, config: &SessionConfig) -> Self {
        Self {
            conn: RefCell::new(Some(conn)),
            tracker: RefCell::new(ChangeTracker::default()),
            begin_mode: config.begin_mode,
            in_transaction: Cell::new(false),
            savepoint_seq: Cell::new(0),
        }
    }

    pub fn is_open(&self) -> bool {
        self.conn.borrow().is_some()
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction.get()
    }

    /// Returns whether any entry is pending add, modify or delete.
    pub fn has_changes(&self) -> bool {
        self.tracker.borrow().has_changes()
    }

    /// Lists change-set entries in registration order.
    pub fn entries(&self) -> Vec<EntrySummary> {
        self.tracker.borrow().summaries()
    }

    /// Returns the tracked state of one entity, if it is tracked.
    pub fn state_of<E: Entity>(&self, key: impl Into<EntityKey>) -> Option<EntityState> {
        let key = key.into();
        self.tracker
            .borrow()
            .get::<E>(&key)
            .map(|entry| entry.state)
    }

    pub(crate) fn ensure_open(&self) -> StoreResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(StoreError::UseAfterDispose)
        }
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> StoreResult<T>) -> StoreResult<T> {
        let guard = self.conn.borrow();
        let conn = guard.as_ref().ok_or(StoreError::UseAfterDispose)?;
        f(conn)
    }

    /// Finds one entity by key, consulting the change set first.
    ///
    /// A tracked entity pending delete is reported absent.
    pub(crate) fn find<E: Entity>(
        &self,
        key: &EntityKey,
        tracking: bool,
    ) -> StoreResult<Option<E>> {
        if key.len() != E::KEY_COLUMNS.len() {
            return Err(StoreError::InvalidArgument(format!(
                "{} expects {} key component(s), got {}",
                E::TABLE,
                E::KEY_COLUMNS.len(),
                key.len()
            )));
        }

        if let Some(entry) = self.tracker.borrow().get::<E>(key) {
            if entry.state == EntityState::Deleted {
                return Ok(None);
            }
            return downcast::<E>(entry.entity.as_any()).map(Some);
        }

        let found = self.with_conn(|conn| Ok(sql::select_by_key::<E>(conn, key)?))?;
        match found {
            Some(entity) if tracking => self.attach_loaded(entity),
            other => Ok(other),
        }
    }

    /// Runs a selection; tracked reads resolve identities against the
    /// change set and leave out entities pending delete.
    pub(crate) fn fetch<E: Entity>(
        &self,
        selection: &Selection,
        tracking: bool,
    ) -> StoreResult<Vec<E>> {
        let (statement, params) = sql::select_sql::<E>(selection);
        let rows = self.with_conn(|conn| Ok(sql::select_rows::<E>(conn, &statement, &params)?))?;
        debug!(
            "event=query_execute module=session status=ok table={} rows={} tracking={}",
            E::TABLE,
            rows.len(),
            tracking
        );

        if !tracking {
            return Ok(rows);
        }
        let mut resolved = Vec::with_capacity(rows.len());
        for entity in rows {
            if let Some(entity) = self.attach_loaded(entity)? {
                resolved.push(entity);
            }
        }
        Ok(resolved)
    }

    /// Counts stored rows; pending changes are not applied.
    pub(crate) fn count<E: Entity>(&self, selection: &Selection) -> StoreResult<u64> {
        let (statement, params) = sql::count_sql::<E>(selection);
        self.with_conn(|conn| {
            let count: u64 = conn.query_row(
                &statement,
                rusqlite::params_from_iter(params.iter()),
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    /// Registers a freshly read entity as `Unchanged`, or returns the
    /// already tracked instance for its key. `None` when that instance is
    /// pending delete.
    fn attach_loaded<E: Entity>(&self, entity: E) -> StoreResult<Option<E>> {
        let key = entity.key();
        let mut tracker = self.tracker.borrow_mut();
        if let Some(entry) = tracker.get::<E>(&key) {
            if entry.state == EntityState::Deleted {
                return Ok(None);
            }
            return downcast::<E>(entry.entity.as_any()).map(Some);
        }
        let original = entity.values();
        tracker.track(
            Box::new(entity.clone()),
            EntityState::Unchanged,
            Some(original),
        );
        Ok(Some(entity))
    }

    /// Registers entities as pending add; nothing is registered on error.
    pub(crate) fn register_added<E: Entity>(&self, entities: Vec<E>) -> StoreResult<Vec<E>> {
        self.ensure_open()?;
        let mut tracker = self.tracker.borrow_mut();
        let mut batch = HashSet::new();
        for entity in &entities {
            let key = entity.key();
            if tracker.contains::<E>(&key) || !batch.insert(key.clone()) {
                return Err(StoreError::InvalidState(format!(
                    "{} with key {key} is already tracked",
                    E::TABLE
                )));
            }
        }

        for entity in &entities {
            tracker.track(Box::new(entity.clone()), EntityState::Added, None);
        }
        debug!(
            "event=entity_register module=session status=ok table={} state=added count={}",
            E::TABLE,
            entities.len()
        );
        Ok(entities)
    }

    /// Registers new values for an entity.
    pub(crate) fn register_modified<E: Entity>(&self, entity: E) -> StoreResult<E> {
        self.ensure_open()?;
        let key = entity.key();
        let mut tracker = self.tracker.borrow_mut();
        match tracker.get_mut::<E>(&key) {
            Some(entry) => match entry.state {
                EntityState::Deleted => {
                    return Err(StoreError::InvalidState(format!(
                        "{} with key {key} is pending delete",
                        E::TABLE
                    )));
                }
                EntityState::Added => entry.entity = Box::new(entity.clone()),
                EntityState::Unchanged | EntityState::Modified => {
                    let values = entity.values();
                    entry.state = if entry.original.as_ref() == Some(&values) {
                        EntityState::Unchanged
                    } else {
                        EntityState::Modified
                    };
                    entry.entity = Box::new(entity.clone());
                }
            },
            None => tracker.track(Box::new(entity.clone()), EntityState::Modified, None),
        }
        debug!(
            "event=entity_register module=session status=ok table={} state=modified",
            E::TABLE
        );
        Ok(entity)
    }

    /// Registers an entity as pending delete. Pending adds are detached.
    pub(crate) fn register_deleted<E: Entity>(&self, entity: E) -> StoreResult<E> {
        self.ensure_open()?;
        let key = entity.key();
        let mut tracker = self.tracker.borrow_mut();
        let current = tracker.get::<E>(&key).map(|entry| entry.state);
        match current {
            Some(EntityState::Added) => {
                tracker.detach::<E>(&key);
            }
            Some(EntityState::Deleted) => {}
            Some(EntityState::Unchanged | EntityState::Modified) => {
                if let Some(entry) = tracker.get_mut::<E>(&key) {
                    entry.state = EntityState::Deleted;
                }
            }
            None => {
                let original = entity.values();
                tracker.track(
                    Box::new(entity.clone()),
                    EntityState::Deleted,
                    Some(original),
                );
            }
        }
        debug!(
            "event=entity_register module=session status=ok table={} state=deleted",
            E::TABLE
        );
        Ok(entity)
    }

    /// Opens the explicit transaction.
    pub(crate) fn begin(&self) -> StoreResult<()> {
        if self.in_transaction.get() {
            return Err(StoreError::InvalidState(
                "a transaction is already active on this session".to_string(),
            ));
        }
        self.with_conn(|conn| {
            conn.execute_batch(self.begin_mode.begin_sql())?;
            Ok(())
        })?;
        self.in_transaction.set(true);
        Ok(())
    }

    /// Writes the change set to the store.
    ///
    /// Runs under a savepoint inside an explicit transaction and in its own
    /// transaction otherwise, so a failure rolls back every write of this
    /// flush. The change set itself is left untouched.
    pub(crate) fn flush(&self) -> StoreResult<usize> {
        self.ensure_open()?;
        let pending = self.tracker.borrow().pending_writes();
        if pending.is_empty() {
            return Ok(0);
        }

        self.with_conn(|conn| {
            let outcome = if self.in_transaction.get() {
                self.flush_in_savepoint(conn, &pending)
            } else {
                self.flush_in_own_transaction(conn, &pending)
            };
            outcome.map_err(StoreError::Storage)
        })
    }

    fn flush_in_savepoint(
        &self,
        conn: &Connection,
        pending: &[PendingWrite],
    ) -> Result<usize, DbError> {
        let seq = self.savepoint_seq.get() + 1;
        self.savepoint_seq.set(seq);
        let name = format!("datakeep_save_{seq}");

        conn.execute_batch(&format!("SAVEPOINT {name};"))?;
        let outcome = write_all(conn, pending).and_then(|written| {
            conn.execute_batch(&format!("RELEASE {name};"))?;
            Ok(written)
        });
        if outcome.is_err() {
            let undo = format!("ROLLBACK TO {name}; RELEASE {name};");
            if let Err(err) = conn.execute_batch(&undo) {
                warn!(
                    "event=uow_save module=session status=error error_code=savepoint_rollback_failed error={err}"
                );
            }
        }
        outcome
    }

    fn flush_in_own_transaction(
        &self,
        conn: &Connection,
        pending: &[PendingWrite],
    ) -> Result<usize, DbError> {
        conn.execute_batch(self.begin_mode.begin_sql())?;
        let outcome = write_all(conn, pending).and_then(|written| {
            conn.execute_batch("COMMIT;")?;
            Ok(written)
        });
        if outcome.is_err() && !conn.is_autocommit() {
            if let Err(err) = conn.execute_batch("ROLLBACK;") {
                warn!(
                    "event=uow_save module=session status=error error_code=rollback_failed error={err}"
                );
            }
        }
        outcome
    }

    /// Marks the last flush as persisted in the change set.
    pub(crate) fn accept_changes(&self) {
        self.tracker.borrow_mut().accept_all();
    }

    /// Commits the explicit transaction, if any.
    ///
    /// On failure the transaction stays marked active so the caller can roll
    /// it back.
    pub(crate) fn commit_transaction(&self) -> StoreResult<()> {
        if !self.in_transaction.get() {
            return self.ensure_open();
        }
        self.with_conn(|conn| {
            conn.execute_batch("COMMIT;")
                .map_err(|err| StoreError::Conflict(err.into()))
        })?;
        self.in_transaction.set(false);
        Ok(())
    }

    /// Rolls back the explicit transaction, if any.
    pub(crate) fn rollback_transaction(&self) -> StoreResult<()> {
        if !self.in_transaction.replace(false) {
            return self.ensure_open();
        }
        self.with_conn(|conn| {
            // A failed COMMIT may already have ended the transaction.
            if !conn.is_autocommit() {
                conn.execute_batch("ROLLBACK;")?;
            }
            Ok(())
        })
    }

    /// Reloads every tracked entity not pending add from the store.
    pub(crate) fn reload_tracked(&self) -> StoreResult<usize> {
        self.with_conn(|conn| Ok(self.tracker.borrow_mut().reload_persisted(conn)?))
    }

    /// Releases the transaction, the change set and the connection.
    ///
    /// Returns `false` when the session was already closed.
    pub(crate) fn close(&self) -> bool {
        let Ok(mut guard) = self.conn.try_borrow_mut() else {
            warn!("event=uow_dispose module=session status=error error_code=session_busy");
            return false;
        };
        let Some(conn) = guard.take() else {
            return false;
        };

        if self.in_transaction.replace(false) && !conn.is_autocommit() {
            if let Err(err) = conn.execute_batch("ROLLBACK;") {
                warn!(
                    "event=uow_dispose module=session status=error error_code=rollback_failed error={err}"
                );
            }
        }
        self.tracker.borrow_mut().clear();
        if let Err((_, err)) = conn.close() {
            warn!(
                "event=uow_dispose module=session status=error error_code=close_failed error={err}"
            );
        }
        true
    }
}

fn write_all(conn: &Connection, pending: &[PendingWrite]) -> Result<usize, DbError> {
    let mut written = 0;
    for write in pending {
        let affected = match write.state {
            EntityState::Added => sql::insert_row(
                conn,
                write.table,
                write.key_columns,
                write.columns,
                &write.key,
                &write.values,
            )?,
            EntityState::Modified => sql::update_row(
                conn,
                write.table,
                write.key_columns,
                write.columns,
                &write.key,
                &write.values,
            )?,
            EntityState::Deleted => {
                sql::delete_row(conn, write.table, write.key_columns, &write.key)?
            }
            EntityState::Unchanged => continue,
        };
        if affected == 0 {
            return Err(DbError::StaleRow {
                table: write.table,
                key: write.key.to_string(),
            });
        }
        written += affected;
    }
    Ok(written)
}

fn downcast<E: Entity>(entity: &dyn std::any::Any) -> StoreResult<E> {
    entity.downcast_ref::<E>().cloned().ok_or_else(|| {
        StoreError::InvalidState(format!(
            "{} entry is tracked under a different entity type",
            E::TABLE
        ))
    })
}
