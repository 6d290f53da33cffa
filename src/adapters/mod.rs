//! Exchange recovery adapters.
//!
//! Each adapter recovers trades for (symbol, time windows) from an
//! exchange's public daily archive: enumerate the UTC days the windows
//! touch, fetch each day's gzip/zip CSV through the shared rate-limited
//! client, parse, filter to the windows and return trades sorted by ts.
//! A missing day (HTTP 404) is an empty day, not an error.

pub mod binance;
pub mod bitmex;
pub mod bybit;
pub mod kraken;

use std::collections::HashMap;
use std::io::Read;

use chrono::{DateTime, NaiveDate};
use thiserror::Error;

use crate::http::{FetchError, RateLimitedClient};
use crate::trade::Trade;

/// Inclusive time window in epoch ms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub from_ts: i64,
    pub to_ts: i64,
}

/// A recovery request.
#[derive(Debug, Clone)]
pub struct RecoverRequest {
    /// Exchange-native symbol, uppercase.
    pub symbol: String,
    pub windows: Vec<TimeWindow>,
}

/// Adapter failures surface on the gap-fix queue as `adapter_error`.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("archive fetch failed with status {status} for {url}")]
    Http { status: u16, url: String },
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("archive decode failed: {0}")]
    Decode(String),
}

/// One exchange's archive recovery.
pub trait ExchangeAdapter: Send + Sync {
    /// Uppercase registry key.
    fn name(&self) -> &'static str;

    /// Recover trades covering the request windows, sorted by ts ascending.
    fn recover(
        &self,
        client: &RateLimitedClient,
        request: &RecoverRequest,
    ) -> Result<Vec<Trade>, AdapterError>;
}

/// Keyed adapter lookup. No inheritance, just a map.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: HashMap<String, Box<dyn ExchangeAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> AdapterRegistry {
        AdapterRegistry::default()
    }

    /// Registry with every built-in adapter.
    pub fn builtin() -> AdapterRegistry {
        let mut registry = AdapterRegistry::new();
        registry.register(Box::new(binance::BinanceAdapter));
        registry.register(Box::new(bitmex::BitmexAdapter));
        registry.register(Box::new(bybit::BybitAdapter));
        registry.register(Box::new(kraken::KrakenAdapter));
        registry
    }

    pub fn register(&mut self, adapter: Box<dyn ExchangeAdapter>) {
        self.adapters.insert(adapter.name().to_string(), adapter);
    }

    /// Lookup by uppercase exchange name.
    pub fn get(&self, name: &str) -> Option<&dyn ExchangeAdapter> {
        self.adapters.get(name).map(|a| a.as_ref())
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.adapters.keys().map(|k| k.as_str()).collect();
        names.sort();
        names
    }
}

/// UTC calendar days intersecting any window, deduplicated and ascending.
pub(crate) fn utc_days(windows: &[TimeWindow]) -> Vec<NaiveDate> {
    let mut days = Vec::new();
    for window in windows {
        if window.to_ts < window.from_ts {
            continue;
        }
        let mut day = to_date(window.from_ts);
        let last = to_date(window.to_ts);
        while day <= last {
            if !days.contains(&day) {
                days.push(day);
            }
            day = match day.succ_opt() {
                Some(next) => next,
                None => break,
            };
        }
    }
    days.sort();
    days
}

fn to_date(ts_ms: i64) -> NaiveDate {
    DateTime::from_timestamp_millis(ts_ms)
        .map(|dt| dt.date_naive())
        .unwrap_or(NaiveDate::MIN)
}

pub(crate) fn in_windows(ts: i64, windows: &[TimeWindow]) -> bool {
    windows.iter().any(|w| ts >= w.from_ts && ts <= w.to_ts)
}

/// Fetch one archive. 404 means the day was never published.
pub(crate) fn fetch_archive(
    client: &RateLimitedClient,
    url: &str,
) -> Result<Option<Vec<u8>>, AdapterError> {
    let response = client.get(url)?;
    if response.status == 404 {
        return Ok(None);
    }
    if !response.is_success() {
        return Err(AdapterError::Http { status: response.status, url: url.to_string() });
    }
    Ok(Some(response.body))
}

pub(crate) fn gunzip(bytes: &[u8]) -> Result<Vec<u8>, AdapterError> {
    let mut decoder = flate2::read::GzDecoder::new(bytes);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| AdapterError::Decode(format!("gunzip: {}", e)))?;
    Ok(out)
}

/// Extract the first file of a zip archive (daily archives hold exactly one
/// CSV).
pub(crate) fn unzip_single(bytes: &[u8]) -> Result<Vec<u8>, AdapterError> {
    let cursor = std::io::Cursor::new(bytes);
    let mut archive =
        zip::ZipArchive::new(cursor).map_err(|e| AdapterError::Decode(format!("zip: {}", e)))?;
    if archive.len() == 0 {
        return Err(AdapterError::Decode("zip archive is empty".to_string()));
    }
    let mut file = archive
        .by_index(0)
        .map_err(|e| AdapterError::Decode(format!("zip entry: {}", e)))?;
    let mut out = Vec::new();
    file.read_to_end(&mut out)
        .map_err(|e| AdapterError::Decode(format!("zip read: {}", e)))?;
    Ok(out)
}

/// Shared day loop: fetch each day's archive, parse it, filter to windows,
/// sort.
pub(crate) fn recover_days<F>(
    client: &RateLimitedClient,
    request: &RecoverRequest,
    day_url: impl Fn(&NaiveDate) -> String,
    parse_day: F,
) -> Result<Vec<Trade>, AdapterError>
where
    F: Fn(&[u8]) -> Result<Vec<Trade>, AdapterError>,
{
    let mut trades = Vec::new();
    for day in utc_days(&request.windows) {
        let url = day_url(&day);
        let body = match fetch_archive(client, &url)? {
            Some(body) => body,
            None => continue,
        };
        for trade in parse_day(&body)? {
            if in_windows(trade.ts, &request.windows) {
                trades.push(trade);
            }
        }
    }
    trades.sort_by_key(|t| t.ts);
    Ok(trades)
}
