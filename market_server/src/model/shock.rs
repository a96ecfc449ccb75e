//! Shock trajectories: scripted crashes and rallies.
//!
//! A shock moves one or more symbols from their current price toward
//! `base * target_multiplier` over `step_count` steps. Each step aims at an
//! eased ideal point on the geometric path, pulls the running price toward it
//! with a factor that grows as the shock matures, and adds noise. Each step is
//! published as 1 to 3 jittered micro-ticks, clamped to a corridor around the
//! target on the side the shock moves toward. When the steps run out the
//! exact target price is forced.
//!
//! `ShockPath` is the pure price path and only needs an `Rng`.
//! `ShockRunner` plays a path against the market: store write, broadcast,
//! occasional candle tick, and a paced pause between micro-ticks.
//!
//! Overlapping shocks on the same symbol are not coordinated; whichever thread
//! writes last wins.

use crate::market::Market;
use crate::model::noise::{ease_in_out, standard_normal};
use crate::model::price_store::clamp_price;
use chrono::Utc;
use log::{debug, info};
use market_common::stock::Direction;
use market_common::{MarketError, Result};
use rand::Rng;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Largest magnitude a shock may have; larger requests are clamped.
pub const MAX_MAGNITUDE: f64 = 4.0;
const MIN_TARGET_MULTIPLIER: f64 = 0.0001;
const MIN_STEPS: f64 = 30.0;
const MAX_STEPS: f64 = 900.0;

/// Corridor half-width around the target, as a fraction of it.
const CORRIDOR: f64 = 0.06;
const JITTER_SCALE: f64 = 0.00035;
/// A last micro-tick moving more than this share of base always reaches the candles.
const SIGNIFICANT_MOVE: f64 = 0.002;
/// Minimum spacing of candle ticks that are not significant moves.
const APPEND_INTERVAL: Duration = Duration::from_millis(1200);
const FINAL_TICK_GAP: Duration = Duration::from_millis(90);

/// Number of steps a shock of `magnitude` takes: `clamp(40 + round(160|m|), 30, 900)`.
pub fn step_count_for(magnitude: f64) -> u32 {
    (40.0 + (magnitude.abs() * 160.0).round()).clamp(MIN_STEPS, MAX_STEPS) as u32
}

/// Validated shape of a shock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShockPlan {
    pub direction: Direction,
    /// Magnitude after clamping to `MAX_MAGNITUDE`.
    pub magnitude: f64,
    pub target_multiplier: f64,
    pub step_count: u32,
}

impl ShockPlan {
    /// Rejects NaN and non-positive magnitudes; clamps large ones to 4.
    pub fn new(direction: Direction, magnitude: f64) -> Result<Self> {
        if magnitude.is_nan() || magnitude <= 0.0 {
            return Err(MarketError::InvalidInput(format!(
                "magnitude must be positive, got {}",
                magnitude
            )));
        }
        let magnitude = magnitude.min(MAX_MAGNITUDE);
        Ok(Self {
            direction,
            magnitude,
            target_multiplier: (1.0 + direction.sign() * magnitude).max(MIN_TARGET_MULTIPLIER),
            step_count: step_count_for(magnitude),
        })
    }

    /// Price the shock ends at for a symbol that started at `base`.
    pub fn final_price(&self, base: f64) -> f64 {
        clamp_price(base * self.target_multiplier)
    }

    fn ideal(&self, base: f64, frac: f64) -> f64 {
        base * self.target_multiplier.powf(ease_in_out(frac))
    }

    fn noise_scale(&self) -> f64 {
        0.0006 + 0.006 * self.magnitude
    }

    /// Keep `price` inside the corridor on the side the shock heads toward.
    pub fn corridor_clamp(&self, base: f64, price: f64) -> f64 {
        let target = base * self.target_multiplier;
        let bounded = match self.direction {
            Direction::Spike => price.min(target * (1.0 + CORRIDOR)),
            Direction::Tank => price.max(target * (1.0 - CORRIDOR)),
        };
        clamp_price(bounded)
    }
}

fn move_factor(frac: f64) -> f64 {
    0.08 + 0.55 * frac.powf(1.1)
}

/// Chance of a plateau pause after a step at progress `frac`: 20% at the
/// start falling to 8% at the end.
pub fn plateau_chance(frac: f64) -> f64 {
    0.08 + 0.12 * (1.0 - frac.clamp(0.0, 1.0))
}

/// One published point of a shock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MicroTick {
    /// Index into the shock's symbol list.
    pub slot: usize,
    pub price: f64,
    /// Last micro-tick of its step and moved more than 0.2% of base.
    pub significant: bool,
}

/// Price path of one shock across all its symbols.
#[derive(Debug, Clone)]
pub struct ShockPath {
    plan: ShockPlan,
    bases: Vec<f64>,
    currents: Vec<f64>,
    step: u32,
}

impl ShockPath {
    pub fn new(plan: ShockPlan, bases: Vec<f64>) -> Self {
        let bases: Vec<f64> = bases.into_iter().map(clamp_price).collect();
        Self {
            plan,
            currents: bases.clone(),
            bases,
            step: 0,
        }
    }

    pub fn plan(&self) -> &ShockPlan {
        &self.plan
    }

    /// Progress through the steps in `[0, 1]`.
    pub fn frac(&self) -> f64 {
        f64::from(self.step) / f64::from(self.plan.step_count)
    }

    pub fn is_finished(&self) -> bool {
        self.step >= self.plan.step_count
    }

    /// Micro-ticks of the next step for every symbol in order; `None` once done.
    pub fn next_step<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<Vec<MicroTick>> {
        if self.is_finished() {
            return None;
        }
        self.step += 1;
        let frac = self.frac();
        let pull = move_factor(frac);
        let mut ticks = Vec::with_capacity(self.bases.len() * 3);

        for slot in 0..self.bases.len() {
            let base = self.bases[slot];
            let ideal = self.plan.ideal(base, frac);
            let noise = standard_normal(rng) * self.plan.noise_scale() * base;
            let aim = self.currents[slot] + (ideal - self.currents[slot]) * pull + noise;

            let micro_steps = rng.random_range(1..=3);
            for m in 0..micro_steps {
                let jitter = standard_normal(rng) * JITTER_SCALE * base;
                let price = self.plan.corridor_clamp(base, aim + jitter);
                let moved = (price - self.currents[slot]).abs();
                ticks.push(MicroTick {
                    slot,
                    price,
                    significant: m == micro_steps - 1 && moved > base * SIGNIFICANT_MOVE,
                });
                self.currents[slot] = price;
            }
        }
        Some(ticks)
    }

    /// Exact end price of every symbol.
    pub fn final_prices(&self) -> Vec<f64> {
        self.bases.iter().map(|b| self.plan.final_price(*b)).collect()
    }
}

/// Where a running shock waits between micro-ticks.
pub trait Pacer: Send + Sync {
    fn pause(&self, duration: Duration);

    /// Clock the candle-tick spacing is measured on.
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Sleeps the calling thread; used in production.
pub struct ThreadPacer;

impl Pacer for ThreadPacer {
    fn pause(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Never waits; runs a whole shock as fast as the store allows.
pub struct NoPacer;

impl Pacer for NoPacer {
    fn pause(&self, _duration: Duration) {}
}

/// Decides which micro-ticks also reach the candles: the first one, any
/// significant move, and otherwise at most one per `APPEND_INTERVAL`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CandleGate {
    last: Option<Instant>,
}

impl CandleGate {
    /// True if a tick at `now` should be ingested; records it if so.
    pub fn admit(&mut self, significant: bool, now: Instant) -> bool {
        let due = significant
            || self
                .last
                .is_none_or(|at| now.saturating_duration_since(at) > APPEND_INTERVAL);
        if due {
            self.last = Some(now);
        }
        due
    }
}

/// Plays one shock against the market.
pub struct ShockRunner<R: Rng> {
    id: u64,
    symbols: Vec<String>,
    path: ShockPath,
    market: Market,
    rng: R,
    pacer: Arc<dyn Pacer>,
}

impl<R: Rng + Send + 'static> ShockRunner<R> {
    /// Capture the current price of every symbol as the shock's base.
    ///
    /// `symbols` must all be loaded in the store.
    pub fn new(
        id: u64,
        symbols: Vec<String>,
        plan: ShockPlan,
        market: Market,
        rng: R,
        pacer: Arc<dyn Pacer>,
    ) -> Result<Self> {
        let bases = market.store.get_prices(&symbols)?;
        Ok(Self {
            id,
            symbols,
            path: ShockPath::new(plan, bases),
            market,
            rng,
            pacer,
        })
    }

    fn tick_volume(&mut self) -> u64 {
        let mag = (700.0 * self.path.plan().magnitude).round() as u64;
        400 + self.rng.random_range(0..3000) + mag
    }

    fn pause_ms(&mut self, lo: u64, hi: u64) {
        let ms = self.rng.random_range(lo..hi);
        self.pacer.pause(Duration::from_millis(ms));
    }

    /// Run every step and the final settlement on the calling thread.
    pub fn run(mut self) -> Result<()> {
        let plan = *self.path.plan();
        info!(
            "Shock {} started: {} {:?} magnitude {} over {} steps",
            self.id, plan.direction, self.symbols, plan.magnitude, plan.step_count
        );
        let mut gate = CandleGate::default();

        while let Some(ticks) = self.path.next_step(&mut self.rng) {
            for tick in ticks {
                let symbol = &self.symbols[tick.slot];
                let (applied, records) = self.market.store.set_price_and_snapshot(symbol, tick.price)?;
                self.market.publish(records);

                if gate.admit(tick.significant, self.pacer.now()) {
                    let volume = self.tick_volume();
                    let symbol = &self.symbols[tick.slot];
                    self.market.aggregator.ingest(symbol, applied, volume, Utc::now())?;
                }
                self.pause_ms(120, 640);
            }

            if self.rng.random_bool(plateau_chance(self.path.frac())) {
                self.pause_ms(400, 1800);
            }
        }

        let finals = self.path.final_prices();
        for (symbol, price) in self.symbols.iter().zip(finals) {
            let (applied, records) = self.market.store.set_price_and_snapshot(symbol, price)?;
            let volume = 1200 + self.rng.random_range(0..5200);
            self.market.aggregator.ingest(symbol, applied, volume, Utc::now())?;
            self.market.publish(records);
            debug!("Shock {} settled {} at {}", self.id, symbol, applied);
            self.pacer.pause(FINAL_TICK_GAP);
        }
        info!("Shock {} finished", self.id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn magnitude_is_clamped_and_steps_bounded() {
        let plan = ShockPlan::new(Direction::Spike, 10.0).unwrap();
        assert_eq!(plan.magnitude, 4.0);
        assert_eq!(plan.target_multiplier, 5.0);
        assert_eq!(plan.step_count, 680);

        for m in [0.0001, 0.05, 0.5, 1.0, 4.0, 100.0, f64::INFINITY] {
            let steps = ShockPlan::new(Direction::Tank, m).unwrap().step_count;
            assert!((30..=900).contains(&steps), "{} -> {}", m, steps);
        }
        assert_eq!(step_count_for(0.5), 120);
    }

    #[test]
    fn non_positive_magnitude_is_rejected() {
        for m in [0.0, -0.5, f64::NAN] {
            assert!(matches!(
                ShockPlan::new(Direction::Spike, m),
                Err(MarketError::InvalidInput(_))
            ));
        }
    }

    #[test]
    fn deep_tank_bottoms_out_at_the_floor() {
        let plan = ShockPlan::new(Direction::Tank, 2.0).unwrap();
        assert_eq!(plan.target_multiplier, 0.0001);
        assert_eq!(plan.final_price(50.0), 0.01);
    }

    #[test]
    fn spike_path_stays_in_corridor_and_trends_up() {
        let plan = ShockPlan::new(Direction::Spike, 0.5).unwrap();
        let mut path = ShockPath::new(plan, vec![100.0]);
        let mut rng = StdRng::seed_from_u64(42);
        let mut prices = Vec::new();
        while let Some(ticks) = path.next_step(&mut rng) {
            for t in ticks {
                assert!(t.price <= 159.0 + 1e-9, "{} escaped the corridor", t.price);
                assert!(t.price >= 0.01);
                prices.push(t.price);
            }
        }
        assert!(path.is_finished());
        assert_eq!(path.final_prices(), vec![150.0]);

        let quarter = prices.len() / 4;
        let mean = |s: &[f64]| s.iter().sum::<f64>() / s.len() as f64;
        let early = mean(&prices[..quarter]);
        let late = mean(&prices[prices.len() - quarter..]);
        assert!(late > early + 30.0, "early {} late {}", early, late);
    }

    #[test]
    fn every_step_emits_one_to_three_micro_ticks_per_symbol() {
        let plan = ShockPlan::new(Direction::Spike, 0.8).unwrap();
        let mut path = ShockPath::new(plan, vec![40.0, 90.0]);
        let mut rng = StdRng::seed_from_u64(5);
        let mut steps = 0;
        while let Some(ticks) = path.next_step(&mut rng) {
            steps += 1;
            for slot in 0..2 {
                let per_slot: Vec<_> = ticks.iter().filter(|t| t.slot == slot).collect();
                assert!((1..=3).contains(&per_slot.len()));
                assert!(per_slot[..per_slot.len() - 1].iter().all(|t| !t.significant));
            }
        }
        assert_eq!(steps, plan.step_count);
    }

    #[test]
    fn candle_gate_spaces_routine_ticks() {
        let t0 = Instant::now();
        let at = |ms| t0 + Duration::from_millis(ms);
        let mut gate = CandleGate::default();
        assert!(gate.admit(false, at(0)));
        assert!(!gate.admit(false, at(600)));
        assert!(!gate.admit(false, at(1200)));
        assert!(gate.admit(true, at(1300)));
        assert!(!gate.admit(false, at(2400)));
        assert!(gate.admit(false, at(2501)));
    }

    #[test]
    fn plateaus_are_likelier_early() {
        assert!((plateau_chance(0.0) - 0.2).abs() < 1e-12);
        assert!((plateau_chance(1.0) - 0.08).abs() < 1e-12);
        assert!(plateau_chance(0.25) > plateau_chance(0.75));
    }

    #[test]
    fn path_is_reproducible_from_a_seed() {
        let plan = ShockPlan::new(Direction::Tank, 0.3).unwrap();
        let run = |seed| {
            let mut path = ShockPath::new(plan, vec![20.0, 80.0]);
            let mut rng = StdRng::seed_from_u64(seed);
            let mut out = Vec::new();
            while let Some(ticks) = path.next_step(&mut rng) {
                out.extend(ticks.into_iter().map(|t| (t.slot, t.price)));
            }
            out
        };
        assert_eq!(run(9), run(9));
    }

    #[test]
    fn tank_never_drops_below_corridor() {
        let plan = ShockPlan::new(Direction::Tank, 0.4).unwrap();
        let mut path = ShockPath::new(plan, vec![10.0]);
        let mut rng = StdRng::seed_from_u64(7);
        while let Some(ticks) = path.next_step(&mut rng) {
            for t in ticks {
                assert!(t.price >= 10.0 * 0.6 * 0.94 - 1e-9);
            }
        }
    }
}
