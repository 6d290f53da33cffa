//! Timeframe strings (`1m`, `15m`, `1h`, ...) and their millisecond spans.

use anyhow::{anyhow, Result};

/// An aggregation period: the original string plus its resolved span.
///
/// The string form is kept because candle file names embed it verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeframe {
    label: String,
    ms: i64,
}

impl Timeframe {
    /// Parse `<n><s|m|h|d>` into a timeframe.
    ///
    /// `n` must be a positive integer; the unit resolves to
    /// 1e3 / 6e4 / 3.6e6 / 8.64e7 milliseconds respectively.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.len() < 2 {
            return Err(anyhow!("invalid timeframe: {}", s));
        }
        let (num, unit) = s.split_at(s.len() - 1);
        let n: i64 = num
            .parse()
            .map_err(|_| anyhow!("invalid timeframe: {}", s))?;
        if n <= 0 {
            return Err(anyhow!("timeframe must be positive: {}", s));
        }
        let unit_ms = match unit {
            "s" => 1_000,
            "m" => 60_000,
            "h" => 3_600_000,
            "d" => 86_400_000,
            _ => return Err(anyhow!("unknown timeframe unit: {}", s)),
        };
        Ok(Timeframe {
            label: s.to_string(),
            ms: n * unit_ms,
        })
    }

    /// The span in milliseconds.
    pub fn ms(&self) -> i64 {
        self.ms
    }

    /// The original string form (`1m`, `4h`, ...).
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Start of the bucket containing `ts`.
    pub fn slot(&self, ts: i64) -> i64 {
        ts.div_euclid(self.ms) * self.ms
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.label)
    }
}
