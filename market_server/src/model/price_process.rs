//! Continuous price process.
//!
//! A background driver that, once per interval, moves every symbol by a
//! mean-reverting step with momentum and noise, folds the resulting ticks into
//! the candle aggregator and broadcasts the new table.
//!
//! Per symbol and tick:
//! - `pct = momentum + k * (baseline - price) / price + volatility * z`,
//!   clamped to `±max_pct_per_tick`;
//! - `price = max(price * (1 + pct), 0.01)`;
//! - `momentum = clamp(momentum * decay + pct * gain, ±momentum_band)`.
//!
//! The per-tick clamp keeps the reversion/momentum feedback from running away.

use crate::market::Market;
use crate::model::aggregator::RawTick;
use crate::model::noise::standard_normal;
use crate::model::price_store::clamp_price;
use chrono::Utc;
use crossbeam_channel::{Receiver, select, tick};
use log::{debug, error, info};
use market_common::Result;
use market_common::payload::PriceRecord;
use market_common::stock::StockSpec;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Tuning knobs shared by every symbol.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessParams {
    /// Pull toward the baseline per tick, as a fraction of the relative gap.
    pub k_reversion: f64,
    /// Momentum retained from one tick to the next.
    pub momentum_decay: f64,
    /// Share of the last move added to momentum.
    pub momentum_gain: f64,
    /// Absolute bound on momentum.
    pub momentum_band: f64,
    /// Absolute bound on one tick's relative change.
    pub max_pct_per_tick: f64,
}

impl Default for ProcessParams {
    fn default() -> Self {
        Self {
            k_reversion: 0.02,
            momentum_decay: 0.85,
            momentum_gain: 0.15,
            momentum_band: 0.003,
            max_pct_per_tick: 0.0035,
        }
    }
}

/// Result of one tick for one symbol.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickOutcome {
    pub price: f64,
    pub pct_change: f64,
    pub volume: u64,
}

/// Mutable per-symbol state of the process.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolDynamics {
    /// Anchor price the symbol reverts to.
    pub baseline: f64,
    pub momentum: f64,
    /// Standard deviation of one tick as a fraction of price.
    pub volatility: f64,
}

impl SymbolDynamics {
    pub fn new(baseline: f64, volatility: f64) -> Self {
        Self {
            baseline,
            momentum: 0.0,
            volatility: volatility.max(0.0),
        }
    }

    /// Advance one tick from `price`.
    pub fn next_tick<R: Rng + ?Sized>(
        &mut self,
        price: f64,
        params: &ProcessParams,
        rng: &mut R,
    ) -> TickOutcome {
        let z = standard_normal(rng);
        let mean_revert = params.k_reversion * (self.baseline - price) / price;
        let pct = (self.momentum + mean_revert + self.volatility * z)
            .clamp(-params.max_pct_per_tick, params.max_pct_per_tick);
        let next = clamp_price(price * (1.0 + pct));
        self.momentum = (self.momentum * params.momentum_decay + pct * params.momentum_gain)
            .clamp(-params.momentum_band, params.momentum_band);
        TickOutcome {
            price: next,
            pct_change: pct,
            volume: synth_volume(pct, rng),
        }
    }
}

/// Tick volume: a base draw in `100..500` scaled up to 6x by the size of the move.
pub fn synth_volume<R: Rng + ?Sized>(pct_change: f64, rng: &mut R) -> u64 {
    let base = rng.random_range(100..500) as f64;
    let multiplier = 1.0 + (pct_change.abs() * 120.0).min(5.0);
    (base * multiplier).round() as u64
}

/// The periodic driver, one `SymbolDynamics` per store slot.
pub struct PriceProcess<R: Rng> {
    dynamics: Vec<SymbolDynamics>,
    params: ProcessParams,
    rng: R,
}

impl<R: Rng + Send + 'static> PriceProcess<R> {
    /// Dynamics for `stocks` in load order, which must match the store's order.
    ///
    /// Symbols without their own volatility use `default_volatility`.
    pub fn new(stocks: &[StockSpec], default_volatility: f64, params: ProcessParams, rng: R) -> Self {
        let dynamics = stocks
            .iter()
            .map(|s| {
                SymbolDynamics::new(
                    s.starting_price,
                    s.volatility.unwrap_or(default_volatility),
                )
            })
            .collect();
        Self {
            dynamics,
            params,
            rng,
        }
    }

    pub fn dynamics(&self) -> &[SymbolDynamics] {
        &self.dynamics
    }

    /// One round over every symbol: update the store, ingest the ticks, broadcast.
    pub fn run_once(&mut self, market: &Market) -> Result<Vec<PriceRecord>> {
        let now = Utc::now();
        let params = self.params;
        let rng = &mut self.rng;
        let dynamics = &mut self.dynamics;
        let mut ticks = Vec::with_capacity(dynamics.len());

        let records = market.store.update_all(|slot, record| match dynamics.get_mut(slot) {
            Some(state) => {
                let outcome = state.next_tick(record.price, &params, rng);
                ticks.push(RawTick::new(&record.id, outcome.price, outcome.volume, now));
                outcome.price
            }
            None => record.price,
        })?;

        let ingested = market.aggregator.ingest_all(&ticks)?;
        let delivered = market.publish(records.clone());
        debug!(
            "Process tick: {} symbols ingested, snapshot delivered to {} subscribers",
            ingested, delivered
        );
        Ok(records)
    }

    /// Run on a background thread every `interval` until `stop_rx` fires or closes.
    ///
    /// A failed round is logged and the next one still runs.
    pub fn spawn(mut self, market: Market, interval: Duration, stop_rx: Receiver<()>) -> JoinHandle<()> {
        thread::spawn(move || {
            info!(
                "Price process started for {} symbols, interval {:?} (Thread ID: {:?})",
                self.dynamics.len(),
                interval,
                thread::current().id()
            );
            let ticker = tick(interval);
            loop {
                select! {
                    recv(stop_rx) -> _ => break,
                    recv(ticker) -> _ => {
                        if let Err(e) = self.run_once(&market) {
                            error!("Price process tick failed: {}", e);
                        }
                    }
                }
            }
            info!("Price process stopped");
        })
    }
}
