//! Unit-of-work contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide explicit transaction boundaries over one session.
//! - Translate store failures on mutation paths into `Conflict`.
//!
//! # Invariants
//! - At most one explicit transaction is active; nesting is rejected.
//! - `commit` ends in either a full commit or a full rollback.
//! - A failed save or commit leaves the change set matching the store,
//!   except for entities still pending add.
//! - After `dispose`, every operation fails with `UseAfterDispose`.

use crate::db::SessionConfig;
use crate::entity::Entity;
use crate::error::{StoreError, StoreResult};
use crate::repo::entity_repo::SqliteRepository;
use crate::session::Session;
use log::{error, info, warn};
use rusqlite::Connection;
use std::time::Instant;

/// Lifecycle state of a unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitOfWorkState {
    Idle,
    InTransaction,
    Disposed,
}

/// Transaction coordinator contract.
pub trait UnitOfWork {
    /// Starts an explicit transaction.
    fn begin(&self) -> StoreResult<&Self>;

    /// Flushes the change set. Returns the number of rows written.
    fn save(&self) -> StoreResult<usize>;

    /// Saves, then commits the explicit transaction if one is active.
    fn commit(&self) -> StoreResult<()>;

    /// Rolls back the explicit transaction and discards local edits.
    fn rollback_transaction(&self) -> StoreResult<()>;

    /// Re-synchronizes every tracked entity not pending add with the store.
    fn rollback_states(&self) -> StoreResult<()>;

    /// Releases the transaction and the session. Idempotent.
    fn dispose(&self);

    fn state(&self) -> UnitOfWorkState;
}

/// Unit of work owning a SQLite session.
pub struct SqliteUnitOfWork {
    session: Session,
}

impl SqliteUnitOfWork {
    pub fn new(conn: Connection) -> Self {
        Self {
            session: Session::new(conn),
        }
    }

    pub fn with_config(conn: Connection, config: &SessionConfig) -> Self {
        Self {
            session: Session::with_config(conn, config),
        }
    }

    /// Session shared with repositories created for this unit of work.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Creates a repository for `E` over this unit of work's session.
    pub fn repository<E: Entity>(&self) -> SqliteRepository<'_, E> {
        SqliteRepository::new(&self.session)
    }

    pub fn has_changes(&self) -> bool {
        self.session.has_changes()
    }

    fn restore_states_after_failure(&self, operation: &str) {
        if let Err(err) = self.session.reload_tracked() {
            error!(
                "event=uow_rollback_states module=uow status=error trigger={} error={}",
                operation, err
            );
        }
    }
}

impl UnitOfWork for SqliteUnitOfWork {
    fn begin(&self) -> StoreResult<&Self> {
        self.session.ensure_open()?;
        self.session.begin()?;
        info!("event=uow_begin module=uow status=ok");
        Ok(self)
    }

    fn save(&self) -> StoreResult<usize> {
        let started_at = Instant::now();
        match self.session.flush() {
            Ok(written) => {
                self.session.accept_changes();
                info!(
                    "event=uow_save module=uow status=ok rows={} duration_ms={}",
                    written,
                    started_at.elapsed().as_millis()
                );
                Ok(written)
            }
            Err(StoreError::Storage(cause)) => {
                warn!(
                    "event=uow_save module=uow status=error error_code=save_failed duration_ms={} error={}",
                    started_at.elapsed().as_millis(),
                    cause
                );
                self.restore_states_after_failure("save");
                Err(StoreError::Conflict(cause))
            }
            Err(err) => Err(err),
        }
    }

    fn commit(&self) -> StoreResult<()> {
        self.session.ensure_open()?;
        let started_at = Instant::now();
        let outcome = self.save().and_then(|_| self.session.commit_transaction());

        match outcome {
            Ok(()) => {
                info!(
                    "event=uow_commit module=uow status=ok duration_ms={}",
                    started_at.elapsed().as_millis()
                );
                Ok(())
            }
            Err(err) => {
                warn!(
                    "event=uow_commit module=uow status=error error_code=commit_failed duration_ms={} error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
                if let Err(rollback_err) = self.rollback_transaction() {
                    error!(
                        "event=uow_rollback module=uow status=error trigger=commit error={}",
                        rollback_err
                    );
                }
                Err(match err {
                    StoreError::Storage(cause) => StoreError::Conflict(cause),
                    other => other,
                })
            }
        }
    }

    fn rollback_transaction(&self) -> StoreResult<()> {
        self.session.ensure_open()?;
        let was_active = self.session.in_transaction();
        // The store must be rolled back first so reloads observe the
        // pre-transaction rows.
        if let Err(err) = self.session.rollback_transaction() {
            self.restore_states_after_failure("rollback");
            return Err(err);
        }
        self.rollback_states()?;
        info!(
            "event=uow_rollback module=uow status=ok transaction_active={}",
            was_active
        );
        Ok(())
    }

    fn rollback_states(&self) -> StoreResult<()> {
        let refreshed = self.session.reload_tracked()?;
        info!(
            "event=uow_rollback_states module=uow status=ok refreshed={}",
            refreshed
        );
        Ok(())
    }

    fn dispose(&self) {
        if self.session.close() {
            info!("event=uow_dispose module=uow status=ok");
        }
    }

    fn state(&self) -> UnitOfWorkState {
        if !self.session.is_open() {
            UnitOfWorkState::Disposed
        } else if self.session.in_transaction() {
            UnitOfWorkState::InTransaction
        } else {
            UnitOfWorkState::Idle
        }
    }
}

impl Drop for SqliteUnitOfWork {
    fn drop(&mut self) {
        self.dispose();
    }
}
