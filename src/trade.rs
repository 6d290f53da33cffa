//! Trade-line parsing.
//!
//! A raw line is whitespace-delimited: `ts price size side [liquidation]`.
//! The parser writes into a caller-provided [`ParsedLine`] so the hot loop
//! allocates nothing.

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

/// A parsed trade. Derived from raw lines; never stored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trade {
    /// Epoch milliseconds.
    pub ts: i64,
    pub price: f64,
    pub size: f64,
    pub side: Side,
    pub liquidation: bool,
}

/// Why a line was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Fewer than four whitespace-separated fields.
    PartsShort,
    /// ts, price or size failed the finite check.
    NonFinite,
    /// price * size exceeded the corruption ceiling.
    NotionalTooLarge,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::PartsShort => "parts_short",
            RejectReason::NonFinite => "non_finite",
            RejectReason::NotionalTooLarge => "notional_too_large",
        }
    }
}

/// Reusable parse target.
#[derive(Debug, Default)]
pub struct ParsedLine {
    pub trade: Option<Trade>,
    pub reject: Option<RejectReason>,
}

impl ParsedLine {
    pub fn clear(&mut self) {
        self.trade = None;
        self.reject = None;
    }
}

/// Default ceiling on price * size, in quote-currency units. Lines above it
/// are treated as corruption, not data.
pub const DEFAULT_NOTIONAL_CEILING: f64 = 1e9;

/// Parse one line into `out`. Exactly one of `out.trade` / `out.reject` is
/// set on return.
///
/// Splits on runs of ASCII whitespace. `side` is "1" for buy, anything else
/// for sell; the optional fifth field is "1" for a liquidation.
pub fn parse_line(line: &str, notional_ceiling: f64, out: &mut ParsedLine) {
    out.clear();

    let mut fields = line.split_ascii_whitespace();
    let (ts, price, size, side) = match (fields.next(), fields.next(), fields.next(), fields.next())
    {
        (Some(a), Some(b), Some(c), Some(d)) => (a, b, c, d),
        _ => {
            out.reject = Some(RejectReason::PartsShort);
            return;
        }
    };
    let liquidation = fields.next() == Some("1");

    let ts_f: f64 = ts.parse().unwrap_or(f64::NAN);
    let price: f64 = price.parse().unwrap_or(f64::NAN);
    let size: f64 = size.parse().unwrap_or(f64::NAN);
    if !ts_f.is_finite() || !price.is_finite() || !size.is_finite() {
        out.reject = Some(RejectReason::NonFinite);
        return;
    }
    if price * size > notional_ceiling {
        out.reject = Some(RejectReason::NotionalTooLarge);
        return;
    }

    out.trade = Some(Trade {
        ts: ts_f as i64,
        price,
        size,
        side: if side == "1" { Side::Buy } else { Side::Sell },
        liquidation,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> ParsedLine {
        let mut out = ParsedLine::default();
        parse_line(line, DEFAULT_NOTIONAL_CEILING, &mut out);
        out
    }

    #[test]
    fn test_parses_tab_and_space_mix() {
        let out = parse("\t1704067200100   123.45\t0.5\t1");
        let trade = out.trade.expect("line should parse");
        assert_eq!(trade.ts, 1_704_067_200_100);
        assert_eq!(trade.price, 123.45);
        assert_eq!(trade.size, 0.5);
        assert_eq!(trade.side, Side::Buy);
        assert!(!trade.liquidation);
    }

    #[test]
    fn test_side_zero_is_sell() {
        let trade = parse("1 100 2 0").trade.unwrap();
        assert_eq!(trade.side, Side::Sell);
    }

    #[test]
    fn test_side_garbage_is_sell() {
        let trade = parse("1 100 2 x").trade.unwrap();
        assert_eq!(trade.side, Side::Sell);
    }

    #[test]
    fn test_liquidation_flag() {
        assert!(parse("1 100 2 1 1").trade.unwrap().liquidation);
        assert!(!parse("1 100 2 1 0").trade.unwrap().liquidation);
        assert!(!parse("1 100 2 1").trade.unwrap().liquidation);
    }

    #[test]
    fn test_parts_short() {
        assert_eq!(parse("1 100 2").reject, Some(RejectReason::PartsShort));
        assert_eq!(parse("").reject, Some(RejectReason::PartsShort));
        assert_eq!(parse("   \t ").reject, Some(RejectReason::PartsShort));
    }

    #[test]
    fn test_non_finite_fields() {
        assert_eq!(parse("nan 100 2 1").reject, Some(RejectReason::NonFinite));
        assert_eq!(parse("1 inf 2 1").reject, Some(RejectReason::NonFinite));
        assert_eq!(parse("1 100 bogus 1").reject, Some(RejectReason::NonFinite));
    }

    #[test]
    fn test_notional_too_large() {
        let out = parse("1704067200200 60000 20000 0 1");
        assert_eq!(out.reject, Some(RejectReason::NotionalTooLarge));
        assert!(out.trade.is_none());
    }

    #[test]
    fn test_notional_ceiling_is_configurable() {
        let mut out = ParsedLine::default();
        parse_line("1 100 2 1", 150.0, &mut out);
        assert_eq!(out.reject, Some(RejectReason::NotionalTooLarge));
        parse_line("1 100 1 1", 150.0, &mut out);
        assert!(out.trade.is_some());
    }
}
