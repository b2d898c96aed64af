//! SQLite-backed storage for the persistent cache tier.
//!
//! Stores one row per entry: the value as JSON text plus an optional expiry
//! in epoch milliseconds. Keys are namespaced with a prefix so the table
//! can coexist with other data in a shared database file.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::backend::{BackendStatus, PersistedEntry, StorageBackend};
use crate::error::{CacheError, Result};

/// Default namespace prefix for persisted keys.
pub const DEFAULT_KEY_PREFIX: &str = "mabon:";

/// Persistent cache tier backed by SQLite.
///
/// Uses WAL mode for better concurrent read performance. All access goes
/// through a single connection behind a mutex, matching how the store
/// serializes writes anyway.
pub struct SqliteBackend {
    /// The SQLite connection (wrapped in Mutex for thread safety).
    conn: Mutex<Connection>,
    /// Namespace prefix applied to all keys.
    prefix: String,
}

impl std::fmt::Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackend")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl SqliteBackend {
    /// Open or create a cache database at the given path.
    ///
    /// Creates the database file and initializes the schema if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    CacheError::Backend(format!("failed to create {}: {}", parent.display(), e))
                })?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_FULL_MUTEX,
        )?;

        let backend = Self {
            conn: Mutex::new(conn),
            prefix: DEFAULT_KEY_PREFIX.to_string(),
        };
        backend.initialize()?;

        info!("Cache database opened at {:?}", path);
        Ok(backend)
    }

    /// Create an in-memory database (useful for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let backend = Self {
            conn: Mutex::new(conn),
            prefix: DEFAULT_KEY_PREFIX.to_string(),
        };
        backend.initialize()?;
        Ok(backend)
    }

    /// Use a different namespace prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Initialize the database with schema and pragmas.
    fn initialize(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();

        // Enable WAL mode for better concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS entries (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                expires_at_ms INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_entries_expires_at
                ON entries(expires_at_ms);
            "#,
        )?;

        Ok(())
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    fn like_pattern(&self) -> String {
        format!("{}%", self.prefix)
    }
}

impl StorageBackend for SqliteBackend {
    fn get(&self, key: &str) -> Result<Option<PersistedEntry>> {
        let conn = self.conn.lock().unwrap();

        let row: Option<(String, Option<i64>)> = conn
            .query_row(
                "SELECT value, expires_at_ms FROM entries WHERE key = ?1",
                params![self.namespaced(key)],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((raw, expires_ms)) = row else {
            return Ok(None);
        };

        let value: Value = match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                warn!(key = %key, error = %e, "Dropping corrupt persisted entry");
                conn.execute(
                    "DELETE FROM entries WHERE key = ?1",
                    params![self.namespaced(key)],
                )?;
                return Ok(None);
            }
        };

        let expires_at = expires_ms.and_then(|ms| Utc.timestamp_millis_opt(ms).single());
        Ok(Some(PersistedEntry { value, expires_at }))
    }

    fn set(
        &self,
        key: &str,
        value: &Value,
        expires_at: Option<DateTime<Utc>>,
        _persist: bool,
    ) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        let conn = self.conn.lock().unwrap();

        conn.execute(
            r#"
            INSERT INTO entries (key, value, expires_at_ms)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                expires_at_ms = excluded.expires_at_ms
            "#,
            params![
                self.namespaced(key),
                raw,
                expires_at.map(|t| t.timestamp_millis()),
            ],
        )?;

        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM entries WHERE key = ?1",
            params![self.namespaced(key)],
        )?;
        Ok(())
    }

    fn cleanup(&self) -> Result<Option<usize>> {
        let conn = self.conn.lock().unwrap();
        let removed = conn.execute(
            "DELETE FROM entries WHERE key LIKE ?1 AND expires_at_ms IS NOT NULL AND expires_at_ms <= ?2",
            params![self.like_pattern(), Utc::now().timestamp_millis()],
        )?;

        if removed > 0 {
            debug!(removed, "Purged expired persisted entries");
        }
        Ok(Some(removed))
    }

    fn clear(&self) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let removed = conn.execute(
            "DELETE FROM entries WHERE key LIKE ?1",
            params![self.like_pattern()],
        )?;

        debug!(removed, "Cleared persisted entries");
        Ok(true)
    }

    fn status(&self) -> Option<BackendStatus> {
        let conn = self.conn.lock().unwrap();

        let entries: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM entries WHERE key LIKE ?1",
                params![self.like_pattern()],
                |row| row.get(0),
            )
            .ok()?;
        let expiring: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM entries WHERE key LIKE ?1 AND expires_at_ms IS NOT NULL",
                params![self.like_pattern()],
                |row| row.get(0),
            )
            .ok()?;

        Some(BackendStatus {
            entries: entries as usize,
            expiring: expiring as usize,
        })
    }
}
