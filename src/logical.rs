//! Logical-store day files and recovery merges.
//!
//! The logical layout stores one file per (collector, exchange, symbol, UTC
//! day). Recovered trades append to the day file they belong to, after
//! exact-tuple deduplication against the lines already present.

use std::collections::{BTreeMap, HashSet};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, NaiveDate};

use crate::trade::{ParsedLine, Side, Trade};

/// Merge counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub appended: u64,
    pub duplicates: u64,
}

/// `<collector>/<exchange>/<symbol>/YYYY/MM/DD` under the logical root.
pub fn day_relative_path(collector: &str, exchange: &str, symbol: &str, day: NaiveDate) -> String {
    format!(
        "{}/{}/{}/{:04}/{:02}/{:02}",
        collector,
        exchange,
        symbol,
        day.year(),
        day.month(),
        day.day()
    )
}

/// The parser's own line format: `ts price size side liq`.
pub fn format_trade_line(trade: &Trade) -> String {
    format!(
        "{} {} {} {} {}",
        trade.ts,
        trade.price,
        trade.size,
        if trade.side == Side::Buy { 1 } else { 0 },
        if trade.liquidation { 1 } else { 0 },
    )
}

/// Append recovered trades to their per-day files.
///
/// Trades already present — same (ts, price, size, side) exactly — are
/// dropped. Day files and parent directories are created as needed.
pub fn merge_trades(
    root: &Path,
    collector: &str,
    exchange: &str,
    symbol: &str,
    trades: &[Trade],
) -> Result<MergeReport> {
    let mut report = MergeReport::default();
    let mut by_day: BTreeMap<NaiveDate, Vec<&Trade>> = BTreeMap::new();
    for trade in trades {
        let day = match DateTime::from_timestamp_millis(trade.ts) {
            Some(dt) => dt.date_naive(),
            None => continue,
        };
        by_day.entry(day).or_default().push(trade);
    }

    for (day, day_trades) in by_day {
        let path = root.join(day_relative_path(collector, exchange, symbol, day));
        let day_report = merge_day_file(&path, &day_trades)?;
        report.appended += day_report.appended;
        report.duplicates += day_report.duplicates;
    }
    Ok(report)
}

fn merge_day_file(path: &PathBuf, trades: &[&Trade]) -> Result<MergeReport> {
    let mut report = MergeReport::default();
    let existing = existing_keys(path)?;

    let mut lines = String::new();
    let mut seen = existing;
    for trade in trades {
        let key = dedupe_key(trade);
        if !seen.insert(key) {
            report.duplicates += 1;
            continue;
        }
        lines.push_str(&format_trade_line(trade));
        lines.push('\n');
        report.appended += 1;
    }
    if lines.is_empty() {
        return Ok(report);
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create {}", parent.display()))?;
    }
    let mut file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .with_context(|| format!("open {}", path.display()))?;
    file.write_all(lines.as_bytes())
        .with_context(|| format!("append to {}", path.display()))?;
    Ok(report)
}

/// Dedupe keys of every parseable line already in the file. Values are
/// compared exactly via their bit patterns.
fn existing_keys(path: &Path) -> Result<HashSet<(i64, u64, u64, Side)>> {
    let mut keys = HashSet::new();
    let data = match fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(keys),
        Err(e) => return Err(e).with_context(|| format!("read {}", path.display())),
    };
    let mut parsed = ParsedLine::default();
    for line in data.lines() {
        crate::trade::parse_line(line, f64::INFINITY, &mut parsed);
        if let Some(trade) = parsed.trade {
            keys.insert(dedupe_key(&trade));
        }
    }
    Ok(keys)
}

fn dedupe_key(trade: &Trade) -> (i64, u64, u64, Side) {
    (trade.ts, trade.price.to_bits(), trade.size.to_bits(), trade.side)
}
