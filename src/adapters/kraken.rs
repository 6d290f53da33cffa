//! Kraken daily trade exports (gzip CSV, no side column).
//!
//! Kraken's historical exports carry only `ts,price,volume`, so the trade
//! side is inferred with the tick rule: inherit the previous side, flip to
//! buy on a strict uptick and to sell on a strict downtick. The first trade
//! of a day counts as a buy.

use chrono::NaiveDate;

use super::{gunzip, recover_days, AdapterError, ExchangeAdapter, RecoverRequest};
use crate::http::RateLimitedClient;
use crate::trade::{Side, Trade};

const ARCHIVE_BASE: &str = "https://archive.kraken.com/trades";

pub struct KrakenAdapter;

impl ExchangeAdapter for KrakenAdapter {
    fn name(&self) -> &'static str {
        "KRAKEN"
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
    format!("{}/{}/{}.csv.gz", ARCHIVE_BASE, symbol, day.format("%Y-%m-%d"))
}

/// Columns: ts (epoch seconds, fractional), price, volume. No header row,
/// no side column; the tick rule runs over the day in file order.
pub(crate) fn parse_day(csv_bytes: &[u8]) -> Result<Vec<Trade>, AdapterError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(csv_bytes);
    let mut trades = Vec::new();
    let mut last_price: Option<f64> = None;
    let mut last_side = Side::Buy;
    for record in reader.records() {
        let record = record.map_err(|e| AdapterError::Decode(format!("kraken csv: {}", e)))?;
        if record.len() < 3 {
            continue;
        }
        let seconds: f64 = match record[0].parse() {
            Ok(v) => v,
            Err(_) => continue,
        };
        let price: f64 = match record[1].parse() {
            Ok(v) => v,
            Err(_) => continue,
        };
        let size: f64 = match record[2].parse() {
            Ok(v) => v,
            Err(_) => continue,
        };
        let side = match last_price {
            Some(last) if price > last => Side::Buy,
            Some(last) if price < last => Side::Sell,
            Some(_) => last_side,
            None => Side::Buy,
        };
        last_price = Some(price);
        last_side = side;
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
