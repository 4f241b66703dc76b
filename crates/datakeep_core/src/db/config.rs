//! Connection configuration.
//!
//! Deserializable so applications can embed it in their own config files.

use super::{DbError, DbResult};
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// How explicit transactions are opened on the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BeginMode {
    Deferred,
    #[default]
    Immediate,
    Exclusive,
}

impl BeginMode {
    pub(crate) fn begin_sql(self) -> &'static str {
        match self {
            Self::Deferred => "BEGIN DEFERRED;",
            Self::Immediate => "BEGIN IMMEDIATE;",
            Self::Exclusive => "BEGIN EXCLUSIVE;",
        }
    }
}

/// Settings applied to every connection opened through `open_db_with`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How long SQLite waits on a locked database before failing.
    pub busy_timeout_ms: u64,
    /// Mirrors `PRAGMA foreign_keys`.
    pub foreign_keys: bool,
    /// Used by `begin()` and by implicit save transactions.
    pub begin_mode: BeginMode,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            foreign_keys: true,
            begin_mode: BeginMode::Immediate,
        }
    }
}

impl SessionConfig {
    pub(crate) fn validate(&self) -> DbResult<()> {
        if self.busy_timeout_ms == 0 {
            return Err(DbError::InvalidConfig(
                "busy_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub(crate) fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::{BeginMode, SessionConfig};

    #[test]
    fn defaults_enable_foreign_keys_and_immediate_begin() {
        let config = SessionConfig::default();
        assert!(config.foreign_keys);
        assert_eq!(config.begin_mode, BeginMode::Immediate);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: SessionConfig =
            serde_json::from_str(r#"{ "begin_mode": "deferred" }"#).unwrap();
        assert_eq!(config.begin_mode, BeginMode::Deferred);
        assert_eq!(config.busy_timeout_ms, 5_000);
        assert!(config.foreign_keys);
    }

    #[test]
    fn zero_busy_timeout_is_rejected() {
        let config = SessionConfig {
            busy_timeout_ms: 0,
            ..SessionConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
