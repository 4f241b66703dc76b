//! Connection bootstrap utilities for SQLite.
//!
//! # Responsibility
//! - Open file or in-memory SQLite connections.
//! - Apply the pragmas described by `SessionConfig`.
//!
//! # Invariants
//! - Returned connections honor `SessionConfig::foreign_keys`.
//! - Invalid configs are rejected before any file is touched.

use super::{DbResult, SessionConfig};
use log::{error, info};
use rusqlite::Connection;
use std::path::Path;
use std::time::Instant;

/// Opens a SQLite database file with the default session config.
pub fn open_db(path: impl AsRef<Path>) -> DbResult<Connection> {
    open_db_with(path, &SessionConfig::default())
}

/// Opens an in-memory SQLite database with the default session config.
pub fn open_db_in_memory() -> DbResult<Connection> {
    open_db_in_memory_with(&SessionConfig::default())
}

/// Opens a SQLite database file and applies `config`.
///
/// # Side effects
/// - Emits `db_open` logging events with duration and status.
pub fn open_db_with(path: impl AsRef<Path>, config: &SessionConfig) -> DbResult<Connection> {
    config.validate()?;
    open_with("file", config, || Connection::open(path))
}

/// Opens an in-memory SQLite database and applies `config`.
pub fn open_db_in_memory_with(config: &SessionConfig) -> DbResult<Connection> {
    config.validate()?;
    open_with("memory", config, Connection::open_in_memory)
}

fn open_with(
    mode: &str,
    config: &SessionConfig,
    open: impl FnOnce() -> rusqlite::Result<Connection>,
) -> DbResult<Connection> {
    let started_at = Instant::now();
    info!("event=db_open module=db status=start mode={mode}");

    let conn = match open() {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={} duration_ms={} error_code=db_open_failed error={}",
                mode,
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err.into());
        }
    };

    match configure_connection(&conn, config) {
        Ok(()) => {
            info!(
                "event=db_open module=db status=ok mode={} duration_ms={} foreign_keys={}",
                mode,
                started_at.elapsed().as_millis(),
                config.foreign_keys
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={} duration_ms={} error_code=db_configure_failed error={}",
                mode,
                started_at.elapsed().as_millis(),
                err
            );
            Err(err.into())
        }
    }
}

fn configure_connection(conn: &Connection, config: &SessionConfig) -> rusqlite::Result<()> {
    let foreign_keys = if config.foreign_keys { "ON" } else { "OFF" };
    conn.execute_batch(&format!("PRAGMA foreign_keys = {foreign_keys};"))?;
    conn.busy_timeout(config.busy_timeout())?;
    Ok(())
}
