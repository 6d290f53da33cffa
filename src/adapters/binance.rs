//! Binance daily trade archives (zip CSV).

use chrono::NaiveDate;

use super::{recover_days, unzip_single, AdapterError, ExchangeAdapter, RecoverRequest};
use crate::http::RateLimitedClient;
use crate::trade::{Side, Trade};

const ARCHIVE_BASE: &str = "https://data.binance.vision/data/spot/daily/trades";

pub struct BinanceAdapter;

impl ExchangeAdapter for BinanceAdapter {
    fn name(&self) -> &'static str {
        "BINANCE"
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
            |body| parse_day(&unzip_single(body)?),
        )
    }
}

fn day_url(symbol: &str, day: &NaiveDate) -> String {
    format!(
        "{}/{}/{}-trades-{}.zip",
        ARCHIVE_BASE,
        symbol,
        symbol,
        day.format("%Y-%m-%d")
    )
}

/// Columns: id, price, qty, quote_qty, time, is_buyer_maker, is_best_match.
/// No header row. A buyer-maker trade is a sell (the taker hit the bid).
pub(crate) fn parse_day(csv_bytes: &[u8]) -> Result<Vec<Trade>, AdapterError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(csv_bytes);
    let mut trades = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| AdapterError::Decode(format!("binance csv: {}", e)))?;
        if record.len() < 6 {
            continue;
        }
        let price: f64 = match record[1].parse() {
            Ok(v) => v,
            Err(_) => continue,
        };
        let size: f64 = match record[2].parse() {
            Ok(v) => v,
            Err(_) => continue,
        };
        let mut ts: i64 = match record[4].parse() {
            Ok(v) => v,
            Err(_) => continue,
        };
        // Archives moved from milliseconds to microseconds in 2025.
        if ts > 100_000_000_000_000 {
            ts /= 1_000;
        }
        let side = if record[5].eq_ignore_ascii_case("true") {
            Side::Sell
        } else {
            Side::Buy
        };
        trades.push(Trade { ts, price, size, side, liquidation: false });
    }
    Ok(trades)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_day_url_layout() {
        let day = NaiveDate::from_ymd_opt(2023, 5, 1).unwrap();
        assert_eq!(
            day_url("BTCUSDT", &day),
            "https://data.binance.vision/data/spot/daily/trades/BTCUSDT/BTCUSDT-trades-2023-05-01.zip"
        );
    }

    #[test]
    fn test_parse_day_sides_and_fields() {
        let csv = b"\
1001,27123.5,0.5,13561.75,1683000000100,True,True
1002,27124.0,0.25,6781.0,1683000000200,False,True
";
        let trades = parse_day(csv).unwrap();
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].ts, 1_683_000_000_100);
        assert_eq!(trades[0].price, 27_123.5);
        assert_eq!(trades[0].size, 0.5);
        assert_eq!(trades[0].side, Side::Sell, "buyer-maker is a sell");
        assert_eq!(trades[1].side, Side::Buy);
        assert!(trades.iter().all(|t| !t.liquidation));
    }

    #[test]
    fn test_parse_day_microsecond_timestamps_rescale() {
        let csv = b"1,100.0,1.0,100.0,1683000000100000,False,True\n";
        let trades = parse_day(csv).unwrap();
        assert_eq!(trades[0].ts, 1_683_000_000_100);
    }

    #[test]
    fn test_parse_day_skips_malformed_rows() {
        let csv = b"\
1,not-a-price,1.0,1.0,1683000000100,False,True
2,100.0,1.0,100.0,1683000000200,False,True
short,row
";
        let trades = parse_day(csv).unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].ts, 1_683_000_000_200);
    }
}
