//! Root and file rows.

use anyhow::{Context, Result};
use rusqlite::{params, OptionalExtension};

use super::{now_epoch_s, Catalog};
use crate::classify::ClassifiedFile;
use crate::gap::GapSnapshot;

/// A classified file staged for insertion.
#[derive(Debug, Clone)]
pub struct NewFile {
    pub root_id: i64,
    pub relative_path: String,
    pub classified: ClassifiedFile,
}

/// Per-batch insert counters. Duplicate keys are not errors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertOutcome {
    pub inserted: u64,
    /// Same key, same classification.
    pub existing: u64,
    /// Same key, different classification. Recorded, never overwritten.
    pub conflicts: u64,
}

/// A file row joined with its root, as the process driver consumes it.
#[derive(Debug, Clone)]
pub struct CatalogFile {
    pub root_id: i64,
    pub root_path: String,
    pub relative_path: String,
    pub collector: String,
    pub era: String,
    pub exchange: String,
    pub symbol: String,
    pub start_ts: i64,
    pub ext: Option<String>,
    pub process_status: Option<String>,
}

/// Market filter shared by the process and gap-fix drivers.
#[derive(Debug, Clone, Default)]
pub struct MarketFilter {
    pub collector: Option<String>,
    pub exchange: Option<String>,
    pub symbol: Option<String>,
}

impl Catalog {
    /// Look up or create a root row. Idempotent.
    pub fn ensure_root(&self, path: &str) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT OR IGNORE INTO roots (path) VALUES (?1)",
            params![path],
        )?;
        let id = conn
            .query_row("SELECT id FROM roots WHERE path = ?1", params![path], |r| {
                r.get(0)
            })
            .with_context(|| format!("root row for {}", path))?;
        Ok(id)
    }

    /// Insert a batch of classified files inside one transaction.
    ///
    /// A second sighting of the same (root_id, relative_path) with identical
    /// classification counts as existing; a sighting that would change the
    /// classification counts as a conflict and leaves the stored row alone.
    pub fn insert_files(&self, batch: &[NewFile]) -> Result<InsertOutcome> {
        let mut outcome = InsertOutcome::default();
        if batch.is_empty() {
            return Ok(outcome);
        }
        let now = now_epoch_s();
        let mut conn = self.conn();
        let tx = conn.transaction().context("begin file batch")?;
        {
            let mut select = tx.prepare_cached(
                "SELECT collector, era, exchange, symbol, start_ts, ext
                 FROM files WHERE root_id = ?1 AND relative_path = ?2",
            )?;
            let mut insert = tx.prepare_cached(
                "INSERT INTO files
                 (root_id, relative_path, collector, era, exchange, symbol, start_ts, ext, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            for file in batch {
                let c = &file.classified;
                let existing: Option<(String, String, Option<String>, Option<String>, Option<i64>, Option<String>)> =
                    select
                        .query_row(params![file.root_id, file.relative_path], |r| {
                            Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?, r.get(5)?))
                        })
                        .optional()?;
                match existing {
                    None => {
                        insert.execute(params![
                            file.root_id,
                            file.relative_path,
                            c.collector.as_str(),
                            c.era.as_str(),
                            c.exchange,
                            c.symbol,
                            c.start_ts,
                            c.ext,
                            now,
                        ])?;
                        outcome.inserted += 1;
                    }
                    Some((collector, era, exchange, symbol, start_ts, ext)) => {
                        let same = collector == c.collector.as_str()
                            && era == c.era.as_str()
                            && exchange.as_deref() == Some(c.exchange.as_str())
                            && symbol.as_deref() == Some(c.symbol.as_str())
                            && start_ts == Some(c.start_ts)
                            && ext == c.ext;
                        if same {
                            outcome.existing += 1;
                        } else {
                            outcome.conflicts += 1;
                        }
                    }
                }
            }
        }
        tx.commit().context("commit file batch")?;
        Ok(outcome)
    }

    /// Files matching the filter, ascending (exchange, symbol, start_ts).
    pub fn files_for_processing(&self, filter: &MarketFilter) -> Result<Vec<CatalogFile>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT f.root_id, r.path, f.relative_path, f.collector, f.era,
                    f.exchange, f.symbol, f.start_ts, f.ext, f.process_status
             FROM files f JOIN roots r ON r.id = f.root_id
             WHERE f.exchange IS NOT NULL AND f.symbol IS NOT NULL AND f.start_ts IS NOT NULL
               AND (?1 IS NULL OR f.collector = ?1)
               AND (?2 IS NULL OR f.exchange = ?2)
               AND (?3 IS NULL OR f.symbol = ?3)
             ORDER BY f.exchange ASC, f.symbol ASC, f.start_ts ASC, f.relative_path ASC",
        )?;
        let rows = stmt.query_map(
            params![filter.collector, filter.exchange, filter.symbol],
            |r| {
                Ok(CatalogFile {
                    root_id: r.get(0)?,
                    root_path: r.get(1)?,
                    relative_path: r.get(2)?,
                    collector: r.get(3)?,
                    era: r.get(4)?,
                    exchange: r.get(5)?,
                    symbol: r.get(6)?,
                    start_ts: r.get(7)?,
                    ext: r.get(8)?,
                    process_status: r.get(9)?,
                })
            },
        )?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Record the outcome of processing one file (`processed` or `failed`).
    pub fn mark_file(&self, root_id: i64, relative_path: &str, status: &str) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "UPDATE files SET processed_at = ?1, process_status = ?2
             WHERE root_id = ?3 AND relative_path = ?4",
            params![now_epoch_s(), status, root_id, relative_path],
        )?;
        Ok(())
    }

    /// Stored gap-tracker snapshot for a market, if any.
    pub fn load_market_state(
        &self,
        collector: &str,
        exchange: &str,
        symbol: &str,
    ) -> Result<Option<GapSnapshot>> {
        let conn = self.conn();
        let state: Option<String> = conn
            .query_row(
                "SELECT state FROM market_state
                 WHERE collector = ?1 AND exchange = ?2 AND symbol = ?3",
                params![collector, exchange, symbol],
                |r| r.get(0),
            )
            .optional()?;
        match state {
            Some(json) => {
                let snapshot =
                    serde_json::from_str(&json).context("decode market gap snapshot")?;
                Ok(Some(snapshot))
            }
            None => Ok(None),
        }
    }

    /// Persist a market's gap-tracker snapshot.
    pub fn store_market_state(
        &self,
        collector: &str,
        exchange: &str,
        symbol: &str,
        snapshot: &GapSnapshot,
    ) -> Result<()> {
        let json = serde_json::to_string(snapshot).context("encode market gap snapshot")?;
        let conn = self.conn();
        conn.execute(
            "INSERT INTO market_state (collector, exchange, symbol, state)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(collector, exchange, symbol) DO UPDATE SET state = excluded.state",
            params![collector, exchange, symbol, json],
        )?;
        Ok(())
    }
}
