//! Server configuration file.
//!
//! Every field has a default, so an empty object (or no file at all) gives a
//! working engine. Example:
//!
//! ```json
//! {
//!   "engine": { "tick_interval_ms": 3000, "process": { "k_reversion": 0.02 } },
//!   "competition": { "start": "03/14/25 10:00", "end": "03/14/25 16:00" }
//! }
//! ```

use crate::model::aggregator::DEFAULT_CANDLE_CAP;
use crate::model::price_process::ProcessParams;
use crate::session::{DEFAULT_UTC_OFFSET_MINUTES, SessionClock};
use market_common::{MarketError, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;

/// Engine knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub tick_interval_ms: u64,
    pub process: ProcessParams,
    /// Volatility for symbols that do not set their own.
    pub default_volatility: f64,
    pub candle_cap: usize,
    /// Synthetic minutes of history per symbol at startup.
    pub seed_history_points: usize,
    pub heartbeat_secs: u64,
    /// Silence after which a subscriber is dropped.
    pub read_deadline_secs: u64,
    pub write_deadline_ms: u64,
    /// Sleep between shock micro-ticks; off makes shocks complete instantly.
    pub shock_pacing: bool,
    /// Fixed seed for every random draw; random when absent.
    pub rng_seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 3000,
            process: ProcessParams::default(),
            default_volatility: 0.0012,
            candle_cap: DEFAULT_CANDLE_CAP,
            seed_history_points: 200,
            heartbeat_secs: 25,
            read_deadline_secs: 60,
            write_deadline_ms: 5000,
            shock_pacing: true,
            rng_seed: None,
        }
    }
}

impl EngineConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs.max(1))
    }

    pub fn read_deadline(&self) -> Duration {
        Duration::from_secs(self.read_deadline_secs.max(1))
    }

    pub fn write_deadline(&self) -> Duration {
        Duration::from_millis(self.write_deadline_ms.max(1))
    }
}

/// Optional competition window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompetitionConfig {
    pub start: Option<String>,
    pub end: Option<String>,
    /// Offset applied to bounds written without one.
    pub utc_offset_minutes: i32,
}

impl Default for CompetitionConfig {
    fn default() -> Self {
        Self {
            start: None,
            end: None,
            utc_offset_minutes: DEFAULT_UTC_OFFSET_MINUTES,
        }
    }
}

impl CompetitionConfig {
    pub fn clock(&self) -> Result<SessionClock> {
        SessionClock::parse(
            self.start.as_deref(),
            self.end.as_deref(),
            self.utc_offset_minutes,
        )
    }
}

/// Whole configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub engine: EngineConfig,
    pub competition: CompetitionConfig,
}

impl ServerConfig {
    /// Read and validate a JSON config file.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .map_err(|e| MarketError::Config(format!("{}: {}", path.display(), e)))?;
        let config: ServerConfig = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| MarketError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject knob values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        let engine = &self.engine;
        let p = &engine.process;
        let checks = [
            ("default_volatility", engine.default_volatility),
            ("k_reversion", p.k_reversion),
            ("momentum_decay", p.momentum_decay),
            ("momentum_gain", p.momentum_gain),
            ("momentum_band", p.momentum_band),
            ("max_pct_per_tick", p.max_pct_per_tick),
        ];
        for (name, value) in checks {
            if !value.is_finite() || value < 0.0 {
                return Err(MarketError::Config(format!(
                    "{} must be a finite non-negative number, got {}",
                    name, value
                )));
            }
        }
        if engine.candle_cap == 0 {
            return Err(MarketError::Config("candle_cap must be at least 1".to_string()));
        }
        if engine.seed_history_points > engine.candle_cap {
            return Err(MarketError::Config(format!(
                "seed_history_points ({}) exceeds candle_cap ({})",
                engine.seed_history_points, engine.candle_cap
            )));
        }
        self.competition.clock().map(|_| ())
    }
}
