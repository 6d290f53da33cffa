//! Event rows and the gap-fix queue.

use anyhow::{Context, Result};
use rusqlite::{params, OptionalExtension};

use super::{now_epoch_s, Catalog};
use crate::events::{EventKind, FileEvent};

/// Identifies the file an event batch belongs to.
#[derive(Debug, Clone)]
pub struct EventFileRef {
    pub root_id: i64,
    pub relative_path: String,
    pub collector: String,
    pub exchange: String,
    pub symbol: String,
}

/// Queue row yielded to the gap-fix driver.
#[derive(Debug, Clone)]
pub struct GapFixRow {
    pub event_id: i64,
    pub root_id: i64,
    pub root_path: String,
    pub relative_path: String,
    pub collector: String,
    pub exchange: String,
    pub symbol: String,
    pub start_line: u64,
    pub end_line: u64,
    pub ts: Option<i64>,
    pub gap_ms: Option<i64>,
    pub gap_end_ts: Option<i64>,
    /// None = new entry, otherwise pending/fetched/merged/failed:*.
    pub status: Option<String>,
}

/// Selection for `iterate_gap_events_for_fix`.
#[derive(Debug, Clone, Default)]
pub struct GapFixFilter {
    pub collector: Option<String>,
    pub exchange: Option<String>,
    pub symbol: Option<String>,
    /// Statuses eligible for (re)processing in addition to new rows.
    pub retry_statuses: Vec<String>,
    pub limit: Option<u64>,
    pub id: Option<i64>,
}

impl Catalog {
    /// Insert a flushed event batch; gap events are enqueued for repair in
    /// the same transaction.
    pub fn insert_events(&self, file: &EventFileRef, events: &[FileEvent]) -> Result<u64> {
        if events.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn();
        let tx = conn.transaction().context("begin event batch")?;
        let mut inserted = 0;
        {
            let mut insert = tx.prepare_cached(
                "INSERT INTO events
                 (root_id, relative_path, collector, exchange, symbol, kind,
                  start_line, end_line, ts, gap_ms, gap_miss, gap_end_ts)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            )?;
            let mut enqueue = tx.prepare_cached(
                "INSERT OR IGNORE INTO gap_fix_queue (event_id, status, recovered, updated_at)
                 VALUES (?1, NULL, NULL, ?2)",
            )?;
            for event in events {
                let gap = event.gap;
                insert.execute(params![
                    file.root_id,
                    file.relative_path,
                    file.collector,
                    file.exchange,
                    file.symbol,
                    event.kind.as_str(),
                    event.start_line,
                    event.end_line,
                    event.ts,
                    gap.map(|g| g.gap_ms),
                    gap.map(|g| g.gap_miss),
                    gap.map(|g| g.gap_end_ts),
                ])?;
                if event.kind == EventKind::Gap {
                    let event_id = tx.last_insert_rowid();
                    enqueue.execute(params![event_id, now_epoch_s()])?;
                }
                inserted += 1;
            }
        }
        tx.commit().context("commit event batch")?;
        Ok(inserted)
    }

    /// Queue rows eligible for gap repair, ascending (symbol, ts, id).
    ///
    /// New rows (NULL status) are always eligible; rows whose status appears
    /// in `retry_statuses` are re-opened. An explicit `id` bypasses the
    /// status check entirely.
    pub fn iterate_gap_events_for_fix(&self, filter: &GapFixFilter) -> Result<Vec<GapFixRow>> {
        let conn = self.conn();
        let mut sql = String::from(
            "SELECT e.id, e.root_id, r.path, e.relative_path, e.collector, e.exchange, e.symbol,
                    e.start_line, e.end_line, e.ts, e.gap_ms, e.gap_end_ts, q.status
             FROM events e
             JOIN gap_fix_queue q ON q.event_id = e.id
             JOIN roots r ON r.id = e.root_id
             WHERE e.kind = 'gap'
               AND (?1 IS NULL OR e.collector = ?1)
               AND (?2 IS NULL OR e.exchange = ?2)
               AND (?3 IS NULL OR e.symbol = ?3)",
        );
        let mut bound: Vec<&dyn rusqlite::ToSql> =
            vec![&filter.collector, &filter.exchange, &filter.symbol];
        if let Some(id) = &filter.id {
            bound.push(id);
            sql.push_str(&format!(" AND e.id = ?{}", bound.len()));
        } else {
            sql.push_str(" AND (q.status IS NULL");
            for status in &filter.retry_statuses {
                bound.push(status);
                sql.push_str(&format!(" OR q.status = ?{}", bound.len()));
            }
            sql.push(')');
        }
        sql.push_str(" ORDER BY e.symbol ASC, e.ts ASC, e.id ASC");
        if let Some(limit) = &filter.limit {
            bound.push(limit);
            sql.push_str(&format!(" LIMIT ?{}", bound.len()));
        }

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            bound.as_slice(),
            |r| {
                Ok(GapFixRow {
                    event_id: r.get(0)?,
                    root_id: r.get(1)?,
                    root_path: r.get(2)?,
                    relative_path: r.get(3)?,
                    collector: r.get(4)?,
                    exchange: r.get(5)?,
                    symbol: r.get(6)?,
                    start_line: r.get(7)?,
                    end_line: r.get(8)?,
                    ts: r.get(9)?,
                    gap_ms: r.get(10)?,
                    gap_end_ts: r.get(11)?,
                    status: r.get(12)?,
                })
            },
        )?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Advance a queue row. Transitions are forward-only; callers re-open
    /// failed rows by listing them in the fix filter, not by rewinding here.
    pub fn update_gap_fix_status(
        &self,
        event_id: i64,
        status: &str,
        recovered: Option<i64>,
    ) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "UPDATE gap_fix_queue
             SET status = ?1, recovered = COALESCE(?2, recovered), updated_at = ?3
             WHERE event_id = ?4",
            params![status, recovered, now_epoch_s(), event_id],
        )?;
        Ok(())
    }

    /// (exchange, status, count) over the gap-fix queue, for `registry`.
    pub fn gap_fix_status_counts(&self) -> Result<Vec<(String, String, u64)>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT COALESCE(e.exchange, '?'), COALESCE(q.status, 'new'), COUNT(*)
             FROM gap_fix_queue q JOIN events e ON e.id = q.event_id
             GROUP BY e.exchange, q.status
             ORDER BY e.exchange ASC, q.status ASC",
        )?;
        let rows = stmt.query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Count events of one kind, for tests and the registry summary.
    pub fn count_events(&self, kind: Option<&str>) -> Result<u64> {
        let conn = self.conn();
        let count: u64 = match kind {
            Some(kind) => conn.query_row(
                "SELECT COUNT(*) FROM events WHERE kind = ?1",
                params![kind],
                |r| r.get(0),
            )?,
            None => conn.query_row("SELECT COUNT(*) FROM events", [], |r| r.get(0))?,
        };
        Ok(count)
    }

    /// Current status of a queue row (None when still new).
    pub fn gap_fix_status(&self, event_id: i64) -> Result<Option<String>> {
        let conn = self.conn();
        let status: Option<Option<String>> = conn
            .query_row(
                "SELECT status FROM gap_fix_queue WHERE event_id = ?1",
                params![event_id],
                |r| r.get(0),
            )
            .optional()?;
        Ok(status.flatten())
    }
}
