//! Adaptive gap detection.
//!
//! Tracks a time-weighted moving average of positive inter-trade deltas and
//! flags a delta as a gap when it exceeds `max(MIN_THRESHOLD_MS, GAP_FACTOR *
//! avg)`. The tracker state is serializable so a resumed run behaves exactly
//! like an uninterrupted one.

use serde::{Deserialize, Serialize};

/// Floor under the adaptive threshold. Calibrated with GAP_FACTOR so that
/// 1-minute aggregation keeps false positives low.
pub const MIN_THRESHOLD_MS: f64 = 500.0;

/// Multiplier on the running average that defines the gap threshold.
pub const GAP_FACTOR: f64 = 10.0;

/// Blend weight used when folding an over-threshold delta back into the
/// average. Capped so one enormous gap cannot pin the average.
const GAP_BLEND_CAP: f64 = 0.25;

/// Ceiling on the sample counter.
const SAMPLE_CAP: u32 = 100_000;

/// A detected gap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GapHit {
    /// Observed inter-trade delta in ms.
    pub gap_ms: i64,
    /// Estimated number of missed trades: floor((gap - avg) / avg).
    pub gap_miss: i64,
}

/// Serialized tracker state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GapSnapshot {
    pub gap_avg_ms: f64,
    pub gap_samples: u32,
    pub last_trade_ts: Option<i64>,
}

/// Time-weighted inter-trade delta tracker.
#[derive(Debug, Clone)]
pub struct GapTracker {
    avg_gap_ms: f64,
    samples: u32,
    last_trade_ts: Option<i64>,
}

impl Default for GapTracker {
    fn default() -> Self {
        GapTracker::new()
    }
}

impl GapTracker {
    pub fn new() -> GapTracker {
        GapTracker {
            avg_gap_ms: 0.0,
            samples: 0,
            last_trade_ts: None,
        }
    }

    pub fn snapshot(&self) -> GapSnapshot {
        GapSnapshot {
            gap_avg_ms: self.avg_gap_ms,
            gap_samples: self.samples,
            last_trade_ts: self.last_trade_ts,
        }
    }

    pub fn restore(snapshot: GapSnapshot) -> GapTracker {
        GapTracker {
            avg_gap_ms: snapshot.gap_avg_ms,
            samples: snapshot.gap_samples,
            last_trade_ts: snapshot.last_trade_ts,
        }
    }

    pub fn avg_gap_ms(&self) -> f64 {
        self.avg_gap_ms
    }

    pub fn samples(&self) -> u32 {
        self.samples
    }

    pub fn last_trade_ts(&self) -> Option<i64> {
        self.last_trade_ts
    }

    /// Record a trade timestamp and report whether the delta since the
    /// previous trade is a gap.
    ///
    /// Out-of-order timestamps move `last_trade_ts` backward without touching
    /// the average. Below-threshold deltas are blended in with weight
    /// `min(1, delta / window_ms)`: when the aggregation window is short,
    /// tight trades move the average faster. A zero delta is an identity
    /// update.
    pub fn record_gap(&mut self, ts: i64, window_ms: i64) -> Option<GapHit> {
        let last = match self.last_trade_ts {
            Some(last) => last,
            None => {
                self.last_trade_ts = Some(ts);
                return None;
            }
        };
        if ts < last {
            self.last_trade_ts = Some(ts);
            return None;
        }
        let delta = (ts - last) as f64;
        self.last_trade_ts = Some(ts);

        // First positive delta seeds the average; nothing to compare against.
        if self.samples == 0 {
            if delta > 0.0 {
                self.avg_gap_ms = delta;
                self.samples = 1;
            }
            return None;
        }

        let threshold = (GAP_FACTOR * self.avg_gap_ms).max(MIN_THRESHOLD_MS);
        if delta >= threshold {
            let gap_miss = if self.avg_gap_ms > 0.0 {
                ((delta - self.avg_gap_ms) / self.avg_gap_ms).floor() as i64
            } else {
                0
            };
            // Fold the threshold, not the raw delta, into the average.
            self.avg_gap_ms += (threshold - self.avg_gap_ms) * GAP_BLEND_CAP;
            self.bump_samples();
            return Some(GapHit {
                gap_ms: delta as i64,
                gap_miss,
            });
        }

        let weight = if window_ms > 0 {
            (delta / window_ms as f64).min(1.0)
        } else {
            1.0
        };
        self.avg_gap_ms += (delta - self.avg_gap_ms) * weight;
        self.bump_samples();
        None
    }

    fn bump_samples(&mut self) {
        if self.samples < SAMPLE_CAP {
            self.samples += 1;
        }
    }
}
