//! Tick-to-candle aggregation.
//!
//! Every symbol owns a ring of finalized one-minute candles plus at most one
//! in-progress candle for the minute currently being traded. Ticks fold into
//! the in-progress candle while their minute matches; a later minute finalizes
//! it and opens a new one. Whenever the aggregator as a whole sees the wall
//! clock move into a new minute it sweeps every symbol and finalizes candles
//! whose minute has passed, so quiet symbols do not keep a stale bar open.
//!
//! Finalized candles are never rewritten. A tick stamped earlier than the
//! symbol's newest candle (a backward clock jump) folds into the in-progress
//! candle if there is one, or opens the next free minute otherwise.
//!
//! Queries return exactly `points` minutes ending at the current minute, with
//! gaps filled by flat zero-volume bars. A symbol with no candles at all gets a
//! synthetic random walk around its starting price instead.

use crate::model::candle::{Candle, CandleRing, minute_key};
use crate::model::price_store::clamp_price;
use chrono::{DateTime, Utc};
use log::{debug, trace};
use market_common::stock::StockSpec;
use market_common::{MarketError, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Default number of finalized candles kept per symbol.
pub const DEFAULT_CANDLE_CAP: usize = 10_000;

/// Half-width of the per-bar relative change of synthetic history.
const SYNTH_STEP: f64 = 0.001;
/// Maximum relative wick above/below the body of a synthetic bar.
const SYNTH_WICK: f64 = 0.001;

/// One simulated trade.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTick {
    pub symbol: String,
    pub price: f64,
    pub volume: u64,
    pub timestamp: DateTime<Utc>,
}

impl RawTick {
    pub fn new(symbol: &str, price: f64, volume: u64, timestamp: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.to_string(),
            price,
            volume,
            timestamp,
        }
    }
}

#[derive(Debug)]
struct SymbolSeries {
    finalized: CandleRing,
    current: Option<Candle>,
    starting_price: f64,
}

impl SymbolSeries {
    fn has_history(&self) -> bool {
        self.current.is_some() || !self.finalized.is_empty()
    }

    fn newest(&self) -> Option<&Candle> {
        self.current.as_ref().or_else(|| self.finalized.last())
    }

    fn record(&mut self, price: f64, volume: u64, key: i64) {
        if let Some(candle) = self.current.as_mut() {
            if key <= candle.minute {
                candle.absorb(price, volume);
                return;
            }
        }
        if let Some(done) = self.current.take() {
            self.finalized.push(done);
        }
        let minute = match self.finalized.last() {
            Some(last) if key <= last.minute => last.minute + 1,
            _ => key,
        };
        self.current = Some(Candle::open_at(minute, price, volume));
    }

    fn finalize_before(&mut self, key: i64) -> bool {
        match self.current {
            Some(candle) if candle.minute < key => {
                self.finalized.push(candle);
                self.current = None;
                true
            }
            _ => false,
        }
    }
}

#[derive(Debug)]
struct AggregatorState {
    series: HashMap<String, SymbolSeries>,
    last_minute_key: Option<i64>,
}

/// Per-symbol minute candles behind one lock.
pub struct CandleAggregator {
    state: Mutex<AggregatorState>,
    cap: usize,
    fallback_seed: u64,
    fallback_counter: AtomicU64,
}

impl CandleAggregator {
    /// Register every stock with an empty history.
    ///
    /// `fallback_seed` feeds the synthetic history used for symbols without
    /// candles; each synthesized series draws a fresh seed derived from it.
    pub fn new(stocks: &[StockSpec], cap: usize, fallback_seed: u64) -> Self {
        let series = stocks
            .iter()
            .map(|s| {
                (
                    s.id.clone(),
                    SymbolSeries {
                        finalized: CandleRing::new(cap),
                        current: None,
                        starting_price: s.starting_price,
                    },
                )
            })
            .collect();
        Self {
            state: Mutex::new(AggregatorState {
                series,
                last_minute_key: None,
            }),
            cap: cap.max(1),
            fallback_seed,
            fallback_counter: AtomicU64::new(0),
        }
    }

    /// Fill every symbol with `points` synthetic finalized candles ending the
    /// minute before `now`, so charts have something to draw at startup.
    pub fn seed_history<R: Rng + ?Sized>(
        &self,
        points: usize,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Result<()> {
        if points == 0 {
            return Ok(());
        }
        let end = minute_key(now) - 1;
        let mut state = self.state.lock()?;
        for (symbol, series) in state.series.iter_mut() {
            for candle in synthesize_history(series.starting_price, points, end, rng) {
                series.finalized.push(candle);
            }
            trace!("Seeded {} candles for {}", points, symbol);
        }
        state.last_minute_key = Some(end);
        debug!("Seeded {} history candles per symbol", points);
        Ok(())
    }

    /// Fold one tick into the symbol's candles.
    pub fn ingest(
        &self,
        symbol: &str,
        price: f64,
        volume: u64,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        let key = minute_key(timestamp);
        let mut state = self.state.lock()?;
        Self::roll_minute(&mut state, key);
        let series = state
            .series
            .get_mut(symbol)
            .ok_or_else(|| MarketError::NotFound(symbol.to_string()))?;
        series.record(price, volume, key);
        Ok(())
    }

    /// Fold a batch of ticks under a single lock acquisition.
    ///
    /// Unknown symbols are skipped; the count of ingested ticks is returned.
    pub fn ingest_all(&self, ticks: &[RawTick]) -> Result<usize> {
        let mut state = self.state.lock()?;
        let mut ingested = 0;
        for tick in ticks {
            let key = minute_key(tick.timestamp);
            Self::roll_minute(&mut state, key);
            if let Some(series) = state.series.get_mut(&tick.symbol) {
                series.record(tick.price, tick.volume, key);
                ingested += 1;
            }
        }
        Ok(ingested)
    }

    fn roll_minute(state: &mut AggregatorState, key: i64) {
        match state.last_minute_key {
            Some(last) if key <= last => {}
            Some(_) => {
                let swept = state
                    .series
                    .values_mut()
                    .map(|s| s.finalize_before(key))
                    .filter(|finalized| *finalized)
                    .count();
                trace!("Minute rollover to {}: finalized {} candles", key, swept);
                state.last_minute_key = Some(key);
            }
            None => state.last_minute_key = Some(key),
        }
    }

    /// Candles for the last `points` minutes ending now, oldest first.
    pub fn query(&self, symbol: &str, points: usize) -> Result<Vec<Candle>> {
        self.query_at(symbol, points, Utc::now())
    }

    /// Candles for the last `points` minutes ending at `now`, oldest first.
    ///
    /// `points` is capped at the ring capacity; zero is rejected.
    pub fn query_at(&self, symbol: &str, points: usize, now: DateTime<Utc>) -> Result<Vec<Candle>> {
        if points == 0 {
            return Err(MarketError::InvalidInput(
                "points must be at least 1".to_string(),
            ));
        }
        let points = points.min(self.cap);
        let end = minute_key(now);
        let start = end - (points as i64 - 1);

        let (in_window, prior_close, newest_close, starting_price) = {
            let state = self.state.lock()?;
            let series = state
                .series
                .get(symbol)
                .ok_or_else(|| MarketError::NotFound(symbol.to_string()))?;
            if !series.has_history() {
                (Vec::new(), None, None, series.starting_price)
            } else {
                let all = series.finalized.iter().chain(series.current.iter());
                let in_window: Vec<Candle> = all
                    .clone()
                    .filter(|c| c.minute >= start && c.minute <= end)
                    .copied()
                    .collect();
                let prior_close = all.filter(|c| c.minute < start).last().map(|c| c.close);
                let newest_close = series.newest().map(|c| c.close);
                (in_window, prior_close, newest_close, series.starting_price)
            }
        };

        let Some(newest_close) = newest_close else {
            let seed = self
                .fallback_seed
                .wrapping_add(self.fallback_counter.fetch_add(1, Ordering::Relaxed));
            let mut rng = StdRng::seed_from_u64(seed);
            return Ok(synthesize_history(starting_price, points, end, &mut rng));
        };

        let mut last_close = prior_close
            .or_else(|| in_window.first().map(|c| c.close))
            .unwrap_or(newest_close);
        let mut candles = in_window.into_iter().peekable();
        let mut out = Vec::with_capacity(points);
        for minute in start..=end {
            match candles.peek() {
                Some(c) if c.minute == minute => {
                    last_close = c.close;
                    out.push(*c);
                    candles.next();
                }
                _ => out.push(Candle::flat(minute, last_close)),
            }
        }
        Ok(out)
    }

    /// Number of finalized candles and whether an in-progress candle exists.
    pub fn depth(&self, symbol: &str) -> Result<(usize, bool)> {
        let state = self.state.lock()?;
        let series = state
            .series
            .get(symbol)
            .ok_or_else(|| MarketError::NotFound(symbol.to_string()))?;
        Ok((series.finalized.len(), series.current.is_some()))
    }
}

/// Low-amplitude random-walk bars ending at minute `end`, oldest first.
///
/// Each bar moves at most ±0.1% from the previous close with wicks of up to
/// 0.1% and a volume in `100..1000`.
pub fn synthesize_history<R: Rng + ?Sized>(
    start_price: f64,
    points: usize,
    end: i64,
    rng: &mut R,
) -> Vec<Candle> {
    let first = end - (points as i64 - 1);
    let mut price = clamp_price(start_price);
    (0..points as i64)
        .map(|i| {
            let change = (rng.random::<f64>() - 0.5) * 2.0 * SYNTH_STEP;
            let open = price;
            let close = clamp_price(price * (1.0 + change));
            let high = open.max(close) * (1.0 + rng.random::<f64>() * SYNTH_WICK);
            let low = clamp_price(open.min(close) * (1.0 - rng.random::<f64>() * SYNTH_WICK));
            let volume = rng.random_range(100..1000);
            price = close;
            Candle {
                minute: first + i,
                open,
                high,
                low,
                close,
                volume,
            }
        })
        .collect()
}
