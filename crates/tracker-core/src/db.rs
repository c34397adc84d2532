//! SQLite connection handle shared by the record and credential stores.

use crate::error::{Result, TrackerError};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS learning_updates (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        owner_id INTEGER,
        topic TEXT NOT NULL,
        hours_spent REAL NOT NULL,
        difficulty_level INTEGER NOT NULL,
        notes TEXT NOT NULL,
        understanding_level INTEGER NOT NULL,
        questions TEXT NOT NULL DEFAULT '[]',
        timestamp TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_learning_updates_topic
        ON learning_updates (owner_id, topic);

    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        disabled INTEGER NOT NULL DEFAULT 0
    );
";

/// A single SQLite connection, serialized behind a mutex.
///
/// Every store operation holds the lock for the duration of one statement
/// (or one transaction), so concurrent handlers never interleave writes.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a database file, creating parent directories as needed.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        tracing::debug!("Opened database at {}", path.display());
        Self::from_connection(conn)
    }

    /// Create an in-memory database (used by tests and `--ephemeral` runs).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Exclusive access to the underlying connection.
    pub fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| TrackerError::Unavailable(format!("lock poisoned: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_is_idempotent() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("progress.db");
        Database::open(&path).unwrap();
        // Reopening must not fail on existing tables.
        let db = Database::open(&path).unwrap();
        let conn = db.lock().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM learning_updates", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
