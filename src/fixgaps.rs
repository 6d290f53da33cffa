//! Gap-fix driver.
//!
//! Consumes the catalog's gap-fix queue: derive a recovery window from the
//! raw file, dispatch the exchange's adapter, merge recoveries into the
//! logical store and advance the queue status. Everything attributable to a
//! single queue row is recorded on that row; the driver always moves on.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::adapters::{AdapterRegistry, RecoverRequest, TimeWindow};
use crate::catalog::events::{EventFileRef, GapFixFilter, GapFixRow};
use crate::catalog::Catalog;
use crate::events::{EventKind, FileEvent};
use crate::http::RateLimitedClient;
use crate::logical;
use crate::trade::ParsedLine;

/// Queue statuses written by this driver.
const STATUS_PENDING: &str = "pending";
const STATUS_FETCHED: &str = "fetched";
const STATUS_MERGED: &str = "merged";
const STATUS_FAILED_IO: &str = "failed:io";
const STATUS_FAILED_MISSING_ADAPTER: &str = "failed:missing_adapter";
const STATUS_FAILED_ADAPTER: &str = "failed:adapter_error";

/// Gap-fix options.
#[derive(Debug, Clone)]
pub struct FixOptions {
    pub filter: GapFixFilter,
    /// Root of the logical store recoveries merge into.
    pub logical_root: PathBuf,
    /// Extract and fetch, but neither merge nor update the queue.
    pub dry_run: bool,
}

/// Aggregate counters over one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FixReport {
    pub examined: u64,
    pub fetched: u64,
    pub merged: u64,
    pub failed: u64,
    pub recovered_trades: u64,
    pub duplicates: u64,
}

/// Work through the queue rows matching the filter.
pub fn run_fixgaps(
    catalog: &Catalog,
    registry: &AdapterRegistry,
    client: &RateLimitedClient,
    options: &FixOptions,
) -> Result<FixReport> {
    let rows = catalog.iterate_gap_events_for_fix(&options.filter)?;
    info!(rows = rows.len(), dry_run = options.dry_run, "fixing gaps");

    let mut report = FixReport::default();
    for row in &rows {
        report.examined += 1;
        fix_row(catalog, registry, client, options, row, &mut report)?;
    }
    info!(
        examined = report.examined,
        fetched = report.fetched,
        merged = report.merged,
        failed = report.failed,
        recovered = report.recovered_trades,
        "fixgaps complete"
    );
    Ok(report)
}

fn fix_row(
    catalog: &Catalog,
    registry: &AdapterRegistry,
    client: &RateLimitedClient,
    options: &FixOptions,
    row: &GapFixRow,
    report: &mut FixReport,
) -> Result<()> {
    let set_status = |status: &str, recovered: Option<i64>| -> Result<()> {
        if options.dry_run {
            return Ok(());
        }
        catalog.update_gap_fix_status(row.event_id, status, recovered)
    };

    // 1. Window from the raw file; the recorded gap bounds are the fallback
    //    when the file yields no anchors.
    let window = match extract_window(row) {
        Ok(Some(window)) => window,
        Ok(None) => {
            warn!(event = row.event_id, path = %row.relative_path, "no window anchors");
            set_status(STATUS_FAILED_IO, None)?;
            report.failed += 1;
            return Ok(());
        }
        Err(e) => {
            warn!(event = row.event_id, error = %e, "window extraction failed");
            set_status(STATUS_FAILED_IO, None)?;
            report.failed += 1;
            return Ok(());
        }
    };

    // 2. Adapter lookup.
    let adapter = match registry.get(&row.exchange) {
        Some(adapter) => adapter,
        None => {
            if !options.dry_run {
                record_failure_event(catalog, row, EventKind::MissingAdapter)?;
            }
            set_status(STATUS_FAILED_MISSING_ADAPTER, None)?;
            report.failed += 1;
            return Ok(());
        }
    };

    // 3. Fetch.
    set_status(STATUS_PENDING, None)?;
    let request = RecoverRequest {
        symbol: row.symbol.clone(),
        windows: vec![window],
    };
    let trades = match adapter.recover(client, &request) {
        Ok(trades) => trades,
        Err(e) => {
            warn!(event = row.event_id, exchange = %row.exchange, error = %e, "adapter failed");
            if !options.dry_run {
                record_failure_event(catalog, row, EventKind::AdapterError)?;
            }
            set_status(STATUS_FAILED_ADAPTER, None)?;
            report.failed += 1;
            return Ok(());
        }
    };
    report.fetched += 1;
    report.recovered_trades += trades.len() as u64;
    set_status(STATUS_FETCHED, Some(trades.len() as i64))?;

    if options.dry_run {
        info!(
            event = row.event_id,
            recovered = trades.len(),
            from = window.from_ts,
            to = window.to_ts,
            "dry run, not merging"
        );
        return Ok(());
    }
    if trades.is_empty() {
        return Ok(());
    }

    // 4. Merge into the logical store.
    let merge = logical::merge_trades(
        &options.logical_root,
        &row.collector,
        &row.exchange,
        &row.symbol,
        &trades,
    )?;
    report.duplicates += merge.duplicates;

    // 5. Done.
    set_status(STATUS_MERGED, Some(trades.len() as i64))?;
    report.merged += 1;
    Ok(())
}

/// Convert the event's line range to a time window.
///
/// Scans the raw file: the window opens at the last non-liquidation trade
/// strictly before `start_line` and closes at the first non-liquidation
/// trade at or after `end_line`. Liquidation rows never anchor windows.
fn extract_window(row: &GapFixRow) -> Result<Option<TimeWindow>> {
    let path = Path::new(&row.root_path).join(&row.relative_path);
    let file = File::open(&path).with_context(|| format!("open {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut parsed = ParsedLine::default();
    let mut from_ts: Option<i64> = None;
    let mut to_ts: Option<i64> = None;
    let mut line_no: u64 = 0;

    for line in reader.lines() {
        line_no += 1;
        let line = line.with_context(|| format!("read {}:{}", path.display(), line_no))?;
        crate::trade::parse_line(&line, f64::INFINITY, &mut parsed);
        let trade = match parsed.trade {
            Some(trade) if !trade.liquidation => trade,
            _ => continue,
        };
        if line_no < row.start_line {
            from_ts = Some(trade.ts);
        } else if line_no >= row.end_line {
            to_ts = Some(trade.ts);
            break;
        }
    }

    let from_ts = from_ts.or(row.ts);
    let to_ts = to_ts.or(row.gap_end_ts);
    match (from_ts, to_ts) {
        (Some(from), Some(to)) if from <= to => Ok(Some(TimeWindow { from_ts: from, to_ts: to })),
        _ => Ok(None),
    }
}

/// Append a missing_adapter / adapter_error event on the gap's file.
fn record_failure_event(catalog: &Catalog, row: &GapFixRow, kind: EventKind) -> Result<()> {
    let file_ref = EventFileRef {
        root_id: row.root_id,
        relative_path: row.relative_path.clone(),
        collector: row.collector.clone(),
        exchange: row.exchange.clone(),
        symbol: row.symbol.clone(),
    };
    let event = FileEvent {
        kind,
        start_line: row.start_line,
        end_line: row.end_line,
        ts: row.ts,
        gap: None,
    };
    catalog.insert_events(&file_ref, &[event])?;
    Ok(())
}
