//! SQLite catalog.
//!
//! Single embedded database owning the durable state: roots, indexed files,
//! data-quality events, the gap-fix queue and per-market gap-tracker
//! snapshots. The connection is wrapped in a mutex; SQLite is the only
//! shared mutable resource in the process and every write happens inside an
//! explicit transaction.

pub mod events;
pub mod files;

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use rusqlite::Connection;

/// Catalog handle. Cheap to share by reference across worker threads.
pub struct Catalog {
    conn: Mutex<Connection>,
}

impl Catalog {
    /// Open or create the catalog at `db_path`.
    pub fn open(db_path: &Path) -> Result<Catalog> {
        let conn = Connection::open(db_path)
            .with_context(|| format!("open catalog {}", db_path.display()))?;
        let catalog = Catalog {
            conn: Mutex::new(conn),
        };
        catalog.ensure_schema()?;
        Ok(catalog)
    }

    /// In-memory catalog for tests.
    pub fn open_in_memory() -> Result<Catalog> {
        let conn = Connection::open_in_memory().context("open in-memory catalog")?;
        let catalog = Catalog {
            conn: Mutex::new(conn),
        };
        catalog.ensure_schema()?;
        Ok(catalog)
    }

    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap()
    }

    fn ensure_schema(&self) -> Result<()> {
        let conn = self.conn();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS roots (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                path TEXT NOT NULL UNIQUE
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS files (
                root_id INTEGER NOT NULL,
                relative_path TEXT NOT NULL,
                collector TEXT NOT NULL,
                era TEXT NOT NULL,
                exchange TEXT,
                symbol TEXT,
                start_ts INTEGER,
                ext TEXT,
                created_at INTEGER NOT NULL,
                processed_at INTEGER,
                process_status TEXT,
                PRIMARY KEY (root_id, relative_path)
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                root_id INTEGER NOT NULL,
                relative_path TEXT NOT NULL,
                collector TEXT NOT NULL,
                exchange TEXT,
                symbol TEXT,
                kind TEXT NOT NULL,
                start_line INTEGER NOT NULL,
                end_line INTEGER NOT NULL,
                ts INTEGER,
                gap_ms INTEGER,
                gap_miss INTEGER,
                gap_end_ts INTEGER
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS gap_fix_queue (
                event_id INTEGER PRIMARY KEY REFERENCES events(id),
                status TEXT,
                recovered INTEGER,
                updated_at INTEGER
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS market_state (
                collector TEXT NOT NULL,
                exchange TEXT NOT NULL,
                symbol TEXT NOT NULL,
                state TEXT NOT NULL,
                PRIMARY KEY (collector, exchange, symbol)
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_files_market ON files(exchange, symbol)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_files_start_ts ON files(start_ts)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_files_collector ON files(collector)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_events_market ON events(exchange, symbol)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_events_kind ON events(kind)",
            [],
        )?;

        Ok(())
    }
}

pub(crate) fn now_epoch_s() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_creates_schema_idempotently() {
        let tmp = tempfile::TempDir::new().unwrap();
        let db = tmp.path().join("catalog.db");
        {
            let catalog = Catalog::open(&db).unwrap();
            catalog.ensure_root("/data/RAM").unwrap();
        }
        // Re-open over the existing file.
        let catalog = Catalog::open(&db).unwrap();
        let id = catalog.ensure_root("/data/RAM").unwrap();
        assert_eq!(catalog.ensure_root("/data/RAM").unwrap(), id);
    }
}
