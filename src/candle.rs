//! Candle accumulation.
//!
//! Trades bucket into fixed-layout candles keyed by slot (`floor(ts /
//! timeframe) * timeframe`). Prices are scaled to int (x 1e4); volumes are
//! quote-volume micro-units (`round(price * size * 1e6)`) summed in i128 and
//! clamped to i64 only at serialization.

pub mod writer;

use std::collections::BTreeMap;

use crate::timeframe::Timeframe;
use crate::trade::{Side, Trade};

/// Price scale: 4 decimal places.
pub const PRICE_SCALE: f64 = 1e4;
/// Quote-volume scale: micro-units.
pub const VOLUME_SCALE: f64 = 1e6;

/// One aggregation bucket.
///
/// Only non-liquidation trades move OHLC and the trade counts; liquidation
/// trades contribute solely to `liq_buy` / `liq_sell`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Candle {
    pub open: i32,
    pub high: i32,
    pub low: i32,
    pub close: i32,
    pub buy_vol: i128,
    pub sell_vol: i128,
    pub buy_count: i32,
    pub sell_count: i32,
    pub liq_buy: i128,
    pub liq_sell: i128,
}

impl Candle {
    fn apply(&mut self, trade: &Trade) {
        let price = scale_price(trade.price);
        let notional = scale_notional(trade.price, trade.size);

        if trade.liquidation {
            match trade.side {
                Side::Buy => self.liq_buy += notional,
                Side::Sell => self.liq_sell += notional,
            }
            return;
        }

        if self.buy_count == 0 && self.sell_count == 0 {
            self.open = price;
            self.high = price;
            self.low = price;
        } else {
            self.high = self.high.max(price);
            self.low = self.low.min(price);
        }
        self.close = price;

        match trade.side {
            Side::Buy => {
                self.buy_vol += notional;
                self.buy_count += 1;
            }
            Side::Sell => {
                self.sell_vol += notional;
                self.sell_count += 1;
            }
        }
    }

    /// True when no trade of either kind has touched this candle.
    pub fn is_empty(&self) -> bool {
        *self == Candle::default()
    }
}

fn scale_price(price: f64) -> i32 {
    (price * PRICE_SCALE).round() as i32
}

fn scale_notional(price: f64, size: f64) -> i128 {
    (price * size * VOLUME_SCALE).round() as i128
}

/// Maps slots to candles for one (collector, exchange, symbol, timeframe).
#[derive(Debug)]
pub struct CandleAccumulator {
    timeframe: Timeframe,
    slots: BTreeMap<i64, Candle>,
}

impl CandleAccumulator {
    pub fn new(timeframe: Timeframe) -> CandleAccumulator {
        CandleAccumulator {
            timeframe,
            slots: BTreeMap::new(),
        }
    }

    pub fn timeframe(&self) -> &Timeframe {
        &self.timeframe
    }

    /// Fold one trade into its slot's candle.
    pub fn add(&mut self, trade: &Trade) {
        let slot = self.timeframe.slot(trade.ts);
        self.slots.entry(slot).or_default().apply(trade);
    }

    /// Slots in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = (&i64, &Candle)> {
        self.slots.iter()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// First populated slot, if any.
    pub fn min_slot(&self) -> Option<i64> {
        self.slots.keys().next().copied()
    }

    /// Last populated slot, if any.
    pub fn max_slot(&self) -> Option<i64> {
        self.slots.keys().next_back().copied()
    }
}
