//! One-minute OHLCV candles and the bounded per-symbol ring that stores them.
//!
//! Candles are keyed by their minute number (`unix_seconds.div_euclid(60)`),
//! so an open time is minute-aligned by construction.

use crate::model::noise::round4;
use chrono::{DateTime, SecondsFormat, Utc};
use market_common::payload::CandlePoint;
use std::collections::VecDeque;
use std::collections::vec_deque::Iter;

/// Seconds per candle.
pub const MINUTE_SECS: i64 = 60;

/// Minute number a timestamp falls into.
pub fn minute_key(ts: DateTime<Utc>) -> i64 {
    ts.timestamp().div_euclid(MINUTE_SECS)
}

/// Open time of a minute number.
pub fn minute_start(key: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(key * MINUTE_SECS, 0).unwrap_or_default()
}

/// Open/high/low/close/volume summary of one symbol over one minute.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candle {
    /// Minute number of the open time.
    pub minute: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl Candle {
    /// A fresh candle whose first tick is `price`.
    pub fn open_at(minute: i64, price: f64, volume: u64) -> Self {
        Self {
            minute,
            open: price,
            high: price,
            low: price,
            close: price,
            volume,
        }
    }

    /// A zero-volume bar that repeats `close`, used to fill gaps.
    pub fn flat(minute: i64, close: f64) -> Self {
        Self::open_at(minute, close, 0)
    }

    /// Fold one more tick into the candle.
    pub fn absorb(&mut self, price: f64, volume: u64) {
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.close = price;
        self.volume = self.volume.saturating_add(volume);
    }

    pub fn open_time(&self) -> DateTime<Utc> {
        minute_start(self.minute)
    }

    /// Wire form with prices rounded to four decimals.
    pub fn to_point(&self) -> CandlePoint {
        CandlePoint {
            time: self.open_time().to_rfc3339_opts(SecondsFormat::Secs, true),
            open: round4(self.open),
            high: round4(self.high),
            low: round4(self.low),
            close: round4(self.close),
            volume: self.volume,
        }
    }
}

/// Finalized candles of one symbol, oldest first, evicting the oldest at `cap`.
#[derive(Debug, Clone)]
pub struct CandleRing {
    candles: VecDeque<Candle>,
    cap: usize,
}

impl CandleRing {
    pub fn new(cap: usize) -> Self {
        let cap = cap.max(1);
        Self {
            candles: VecDeque::with_capacity(cap.min(1024)),
            cap,
        }
    }

    /// Append a finalized candle, dropping the oldest when full.
    pub fn push(&mut self, candle: Candle) {
        if self.candles.len() == self.cap {
            self.candles.pop_front();
        }
        self.candles.push_back(candle);
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn first(&self) -> Option<&Candle> {
        self.candles.front()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.back()
    }

    pub fn iter(&self) -> Iter<'_, Candle> {
        self.candles.iter()
    }
}
