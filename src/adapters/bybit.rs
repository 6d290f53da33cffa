//! Bybit daily trading archives (gzip CSV).

use chrono::NaiveDate;

use super::{gunzip, recover_days, AdapterError, ExchangeAdapter, RecoverRequest};
use crate::http::RateLimitedClient;
use crate::trade::{Side, Trade};

const ARCHIVE_BASE: &str = "https://public.bybit.com/trading";

pub struct BybitAdapter;

impl ExchangeAdapter for BybitAdapter {
    fn name(&self) -> &'static str {
        "BYBIT"
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
            |day| day_url(&symbol, day),
            |body| parse_day(&gunzip(body)?),
        )
    }
}

fn day_url(symbol: &str, day: &NaiveDate) -> String {
    format!("{}/{}/{}{}.csv.gz", ARCHIVE_BASE, symbol, symbol, day.format("%Y-%m-%d"))
}

/// Header row: timestamp,symbol,side,size,price,... Timestamps are epoch
/// seconds with a fractional part.
pub(crate) fn parse_day(csv_bytes: &[u8]) -> Result<Vec<Trade>, AdapterError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(csv_bytes);
    let mut trades = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| AdapterError::Decode(format!("bybit csv: {}", e)))?;
        if record.len() < 5 {
            continue;
        }
        let seconds: f64 = match record[0].parse() {
            Ok(v) => v,
            Err(_) => continue,
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
        trades.push(Trade {
            ts: (seconds * 1_000.0).round() as i64,
            price,
            size,
            side,
            liquidation: false,
        });
    }
    Ok(trades)
}
