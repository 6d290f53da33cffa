//! BitMEX public data archives (gzip CSV, whole exchange per day).

use chrono::{NaiveDate, NaiveDateTime};

use super::{gunzip, recover_days, AdapterError, ExchangeAdapter, RecoverRequest};
use crate::http::RateLimitedClient;
use crate::trade::{Side, Trade};

const ARCHIVE_BASE: &str =
    "https://s3-eu-west-1.amazonaws.com/public.bitmex.com/data/trade";

pub struct BitmexAdapter;

impl ExchangeAdapter for BitmexAdapter {
    fn name(&self) -> &'static str {
        "BITMEX"
    }

    fn recover(
        &self,
        client: &RateLimitedClient,
        request: &RecoverRequest,
    ) -> Result<Vec<Trade>, AdapterError> {
        let symbol = request.symbol.clone();
        recover_days(
            client,
            request,
            day_url,
            |body| parse_day(&gunzip(body)?, &symbol),
        )
    }
}

fn day_url(day: &NaiveDate) -> String {
    format!("{}/{}.csv.gz", ARCHIVE_BASE, day.format("%Y%m%d"))
}

/// Header row: timestamp,symbol,side,size,price,... The day file covers the
/// whole exchange, so rows are filtered by symbol here. Timestamps look like
/// `2023-05-01D00:00:01.123456789` (BitMEX uses `D` as the date separator).
pub(crate) fn parse_day(csv_bytes: &[u8], symbol: &str) -> Result<Vec<Trade>, AdapterError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(csv_bytes);
    let mut trades = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| AdapterError::Decode(format!("bitmex csv: {}", e)))?;
        if record.len() < 5 || !record[1].eq_ignore_ascii_case(symbol) {
            continue;
        }
        let ts = match parse_timestamp(&record[0]) {
            Some(ts) => ts,
            None => continue,
        };
        let side = if record[2].eq_ignore_ascii_case("buy") {
            Side::Buy
        } else {
            Side::Sell
        };
        let size: f64 = match record[3].parse() {
            Ok(v) => v,
            Err(_) => continue,
        };
        let price: f64 = match record[4].parse() {
            Ok(v) => v,
            Err(_) => continue,
        };
        trades.push(Trade { ts, price, size, side, liquidation: false });
    }
    Ok(trades)
}

fn parse_timestamp(raw: &str) -> Option<i64> {
    let normalized = raw.replacen('D', " ", 1);
    let dt = NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%d %H:%M:%S%.f").ok()?;
    Some(dt.and_utc().timestamp_millis())
}
