//! Path classification for collector trees.
//!
//! Maps a relative file path to (collector, era, exchange, symbol, start_ts)
//! or rejects it. Two layouts are recognized:
//!
//! - legacy: `[<collector>/]<exchange>/<symbol>/YYYY-MM-DD[-HH]` with the date
//!   token read as Europe/Paris wall-clock time
//! - logical: `[<collector>/]<exchange>/<symbol>/YYYY/MM/DD[-HH]` read as UTC
//!
//! Classification is pure: no filesystem access, no allocation beyond the
//! returned record.

use chrono::NaiveDate;

/// Upstream data producer identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collector {
    Ram,
    Pi,
}

impl Collector {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collector::Ram => "RAM",
            Collector::Pi => "PI",
        }
    }

    /// Recognize a collector token. Matching is exact and case-sensitive:
    /// collector directories are written in caps by both producers.
    pub fn from_segment(s: &str) -> Option<Collector> {
        match s {
            "RAM" => Some(Collector::Ram),
            "PI" => Some(Collector::Pi),
            _ => None,
        }
    }
}

impl std::fmt::Display for Collector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Directory-layout era.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Era {
    /// Europe/Paris local-time directories (`YYYY-MM-DD[-HH]` token).
    Legacy,
    /// UTC directories (`YYYY/MM/DD[-HH]`).
    Logical,
}

impl Era {
    pub fn as_str(&self) -> &'static str {
        match self {
            Era::Legacy => "legacy",
            Era::Logical => "logical",
        }
    }
}

/// A successfully classified file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedFile {
    pub collector: Collector,
    pub era: Era,
    pub exchange: String,
    pub symbol: String,
    /// UTC epoch milliseconds at the start of the path's date/hour token.
    pub start_ts: i64,
    /// File extension without the dot, when present.
    pub ext: Option<String>,
}

/// Classify a relative path (POSIX separators).
///
/// `collector_hint` comes from the root directory basename when the path
/// itself carries no collector segment. Returns None for unrecognized paths;
/// the caller counts those as skipped.
pub fn classify_path(relative_path: &str, collector_hint: Option<Collector>) -> Option<ClassifiedFile> {
    let segments: Vec<&str> = relative_path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.len() < 3 {
        return None;
    }

    let (collector, rest) = match Collector::from_segment(segments[0]) {
        Some(c) => (c, &segments[1..]),
        None => (collector_hint?, &segments[..]),
    };

    // Logical: <exchange>/<symbol>/YYYY/MM/DD[-HH][.ext]
    if rest.len() == 5 {
        let (stem, ext) = split_ext(rest[4]);
        if let Some(start_ts) = logical_start_ts(rest[2], rest[3], stem) {
            return Some(ClassifiedFile {
                collector,
                era: Era::Logical,
                exchange: rest[0].to_uppercase(),
                symbol: rest[1].to_uppercase(),
                start_ts,
                ext,
            });
        }
    }

    // Legacy: <exchange>/<symbol>/YYYY-MM-DD[-HH][.ext]
    if rest.len() == 3 {
        let (stem, ext) = split_ext(rest[2]);
        if let Some(start_ts) = legacy_start_ts(stem) {
            return Some(ClassifiedFile {
                collector,
                era: Era::Legacy,
                exchange: rest[0].to_uppercase(),
                symbol: rest[1].to_uppercase(),
                start_ts,
                ext,
            });
        }
    }

    None
}

fn split_ext(name: &str) -> (&str, Option<String>) {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => (stem, Some(ext.to_string())),
        _ => (name, None),
    }
}

fn parse_u32(s: &str, digits: usize) -> Option<u32> {
    if s.len() != digits || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// Split a `DD` or `DD-HH` token.
fn parse_day_hour(token: &str) -> Option<(u32, Option<u32>)> {
    match token.split_once('-') {
        Some((d, h)) => Some((parse_u32(d, 2)?, Some(parse_u32(h, 2)?))),
        None => Some((parse_u32(token, 2)?, None)),
    }
}

/// UTC start of a logical `YYYY/MM/DD[-HH]` token, in epoch ms.
fn logical_start_ts(year: &str, month: &str, day_token: &str) -> Option<i64> {
    let year = parse_u32(year, 4)? as i32;
    let month = parse_u32(month, 2)?;
    let (day, hour) = parse_day_hour(day_token)?;
    let hour = hour.unwrap_or(0);
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    let dt = date.and_hms_opt(hour, 0, 0)?;
    Some(dt.and_utc().timestamp_millis())
}

/// UTC start of a legacy `YYYY-MM-DD[-HH]` token interpreted as Europe/Paris
/// wall-clock time, in epoch ms.
fn legacy_start_ts(token: &str) -> Option<i64> {
    let mut parts = token.splitn(4, '-');
    let year = parse_u32(parts.next()?, 4)? as i32;
    let month = parse_u32(parts.next()?, 2)?;
    let day = parse_u32(parts.next()?, 2)?;
    let hour = match parts.next() {
        Some(h) => parse_u32(h, 2)?,
        None => 0,
    };
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    let local = date.and_hms_opt(hour, 0, 0)?;
    let offset_hours = paris_utc_offset(date, hour);
    Some(local.and_utc().timestamp_millis() - (offset_hours as i64) * 3_600_000)
}

/// Europe/Paris UTC offset (1 or 2 hours) for a wall-clock date and hour.
///
/// DST starts at 02:00 local on the last Sunday of March (UTC+2 from 02:00
/// inclusive; hour 2 itself never legally exists and maps to UTC+2 by
/// convention) and ends at 03:00 local on the last Sunday of October (UTC+1
/// from 03:00 inclusive).
fn paris_utc_offset(date: NaiveDate, hour: u32) -> i32 {
    use chrono::Datelike;
    let (year, month, day) = (date.year(), date.month(), date.day());
    match month {
        4..=9 => 2,
        1 | 2 | 11 | 12 => 1,
        3 => {
            let switch = last_sunday(year, 3);
            if day > switch || (day == switch && hour >= 2) {
                2
            } else {
                1
            }
        }
        10 => {
            let switch = last_sunday(year, 10);
            if day > switch || (day == switch && hour >= 3) {
                1
            } else {
                2
            }
        }
        _ => unreachable!("month out of range"),
    }
}

/// Day-of-month of the last Sunday of a month. Only called for March and
/// October, both 31-day months.
fn last_sunday(year: i32, month: u32) -> u32 {
    use chrono::Datelike;
    let last_day = match NaiveDate::from_ymd_opt(year, month, 31) {
        Some(d) => d,
        None => return 31,
    };
    last_day.day() - last_day.weekday().num_days_from_sunday()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts_utc(y: i32, mo: u32, d: u32, h: u32) -> i64 {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
            .and_utc()
            .timestamp_millis()
    }

    #[test]
    fn test_logical_path_with_hour() {
        let c = classify_path("PI/binance/btcusdt/2023/07/14-09.txt", None).unwrap();
        assert_eq!(c.collector, Collector::Pi);
        assert_eq!(c.era, Era::Logical);
        assert_eq!(c.exchange, "BINANCE");
        assert_eq!(c.symbol, "BTCUSDT");
        assert_eq!(c.start_ts, ts_utc(2023, 7, 14, 9));
        assert_eq!(c.ext.as_deref(), Some("txt"));
    }

    #[test]
    fn test_logical_path_day_only_no_ext() {
        let c = classify_path("RAM/BITMEX/XBTUSD/2022/01/03", None).unwrap();
        assert_eq!(c.era, Era::Logical);
        assert_eq!(c.start_ts, ts_utc(2022, 1, 3, 0));
        assert_eq!(c.ext, None);
    }

    #[test]
    fn test_legacy_winter_is_utc_plus_one() {
        // 2023-01-15 08:00 Paris == 07:00 UTC
        let c = classify_path("BINANCE/btcusdt/2023-01-15-08.txt", Some(Collector::Ram)).unwrap();
        assert_eq!(c.era, Era::Legacy);
        assert_eq!(c.collector, Collector::Ram);
        assert_eq!(c.start_ts, ts_utc(2023, 1, 15, 7));
    }

    #[test]
    fn test_legacy_summer_is_utc_plus_two() {
        // 2023-07-15 08:00 Paris == 06:00 UTC
        let c = classify_path("BINANCE/btcusdt/2023-07-15-08.txt", Some(Collector::Ram)).unwrap();
        assert_eq!(c.start_ts, ts_utc(2023, 7, 15, 6));
    }

    #[test]
    fn test_legacy_day_only_uses_midnight_offset() {
        // Midnight 2023-07-15 Paris == 22:00 UTC on the 14th
        let c = classify_path("BINANCE/ethusdt/2023-07-15.txt", Some(Collector::Pi)).unwrap();
        assert_eq!(c.start_ts, ts_utc(2023, 7, 14, 22));
    }

    #[test]
    fn test_spring_forward_boundary() {
        // Last Sunday of March 2023 is the 26th. 01:00 local is still UTC+1;
        // the nonexistent 02:00 maps to UTC+2 by convention; 03:00 is UTC+2.
        let c1 = classify_path("BINANCE/BTCUSDT/2023-03-26-01.txt", Some(Collector::Ram)).unwrap();
        assert_eq!(c1.start_ts, ts_utc(2023, 3, 26, 0));
        let c2 = classify_path("BINANCE/BTCUSDT/2023-03-26-02.txt", Some(Collector::Ram)).unwrap();
        assert_eq!(c2.start_ts, ts_utc(2023, 3, 26, 0));
        let c3 = classify_path("BINANCE/BTCUSDT/2023-03-26-03.txt", Some(Collector::Ram)).unwrap();
        assert_eq!(c3.start_ts, ts_utc(2023, 3, 26, 1));
    }

    #[test]
    fn test_fall_back_boundary() {
        // Last Sunday of October 2023 is the 29th. 02:00 local is still UTC+2;
        // 03:00 local is UTC+1.
        let c1 = classify_path("BINANCE/BTCUSDT/2023-10-29-02.txt", Some(Collector::Ram)).unwrap();
        assert_eq!(c1.start_ts, ts_utc(2023, 10, 29, 0));
        let c2 = classify_path("BINANCE/BTCUSDT/2023-10-29-03.txt", Some(Collector::Ram)).unwrap();
        assert_eq!(c2.start_ts, ts_utc(2023, 10, 29, 2));
    }

    #[test]
    fn test_collector_segment_beats_hint() {
        let c = classify_path("PI/KRAKEN/XBT-USD/2023/05/01", Some(Collector::Ram)).unwrap();
        assert_eq!(c.collector, Collector::Pi);
    }

    #[test]
    fn test_symbol_keeps_separators() {
        let c = classify_path("RAM/kraken/xbt-usd/2023/05/01", None).unwrap();
        assert_eq!(c.symbol, "XBT-USD");
    }

    #[test]
    fn test_rejects_without_collector() {
        assert!(classify_path("BINANCE/BTCUSDT/2023-01-15.txt", None).is_none());
    }

    #[test]
    fn test_rejects_malformed_tokens() {
        let hint = Some(Collector::Ram);
        assert!(classify_path("BINANCE/BTCUSDT/2023-1-15.txt", hint).is_none());
        assert!(classify_path("BINANCE/BTCUSDT/notadate.txt", hint).is_none());
        assert!(classify_path("BINANCE/BTCUSDT/2023/13/01", hint).is_none());
        assert!(classify_path("BINANCE/BTCUSDT/2023/02/30", hint).is_none());
        assert!(classify_path("readme.md", hint).is_none());
        assert!(classify_path("BINANCE/2023-01-15.txt", hint).is_none());
    }
}
