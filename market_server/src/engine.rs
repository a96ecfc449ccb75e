//! Engine facade: owns the market handles and exposes every operation the
//! command receiver and the feed listener need.

use crate::config::EngineConfig;
use crate::hub::{BroadcastHub, SubscriberSink};
use crate::market::Market;
use crate::model::aggregator::CandleAggregator;
use crate::model::liveness::SubscriberId;
use crate::model::price_process::PriceProcess;
use crate::model::price_store::PriceStore;
use crate::model::shock::{NoPacer, Pacer, ShockPlan, ShockRunner, ThreadPacer};
use crate::session::SessionClock;
use chrono::Utc;
use crossbeam_channel::{Receiver, select, tick};
use log::{debug, error, info, warn};
use market_common::command::{SessionStatus, ShockAck};
use market_common::payload::{CandlePoint, Snapshot};
use market_common::stock::{Direction, StockSpec, normalize_symbol};
use market_common::{MarketError, Result};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

/// Largest absolute impact a news item may carry.
pub const MAX_NEWS_IMPACT: f64 = 0.4;

/// A published news item. Only the target and impact move prices.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewsItem {
    pub title: String,
    pub affected_stock: Option<String>,
    pub affected_sector: Option<String>,
    pub impact: f64,
}

/// The running market.
pub struct MarketEngine {
    market: Market,
    stocks: Vec<StockSpec>,
    config: EngineConfig,
    session: SessionClock,
    pacer: Arc<dyn Pacer>,
    next_shock_id: AtomicU64,
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

impl MarketEngine {
    /// Load `stocks` at their starting prices and seed synthetic history.
    pub fn new(stocks: Vec<StockSpec>, config: EngineConfig, session: SessionClock) -> Result<Self> {
        if stocks.is_empty() {
            return Err(MarketError::InvalidInput("stock list is empty".to_string()));
        }
        let seed = config.rng_seed.unwrap_or_else(rand::random);
        let aggregator = CandleAggregator::new(&stocks, config.candle_cap, seed);
        let mut rng = StdRng::seed_from_u64(seed);
        let seeded = config.seed_history_points.min(config.candle_cap);
        aggregator.seed_history(seeded, Utc::now(), &mut rng)?;

        let pacer: Arc<dyn Pacer> = if config.shock_pacing {
            Arc::new(ThreadPacer)
        } else {
            Arc::new(NoPacer)
        };
        let market = Market::new(
            PriceStore::new(&stocks),
            aggregator,
            BroadcastHub::new(config.read_deadline()),
        );
        info!(
            "Market loaded: {} stocks, {} seeded candles each",
            stocks.len(),
            seeded
        );
        Ok(Self {
            market,
            stocks,
            config,
            session,
            pacer,
            next_shock_id: AtomicU64::new(1),
        })
    }

    /// Replace how shocks wait between micro-ticks.
    pub fn with_pacer(mut self, pacer: Arc<dyn Pacer>) -> Self {
        self.pacer = pacer;
        self
    }

    pub fn market(&self) -> &Market {
        &self.market
    }

    pub fn stocks(&self) -> &[StockSpec] {
        &self.stocks
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn get_price(&self, symbol: &str) -> Result<f64> {
        self.market.store.get_price(&normalize_symbol(symbol))
    }

    pub fn snapshot(&self) -> Result<Snapshot> {
        Ok(Snapshot::now(self.market.store.snapshot()?))
    }

    /// The last `points` minute candles of `symbol`, oldest first.
    pub fn query_candles(&self, symbol: &str, points: usize) -> Result<Vec<CandlePoint>> {
        let candles = self.market.aggregator.query(&normalize_symbol(symbol), points)?;
        Ok(candles.iter().map(|c| c.to_point()).collect())
    }

    fn shock_rng(&self, shock_id: u64) -> StdRng {
        let seed = match self.config.rng_seed {
            Some(seed) => seed.wrapping_add(shock_id),
            None => rand::random(),
        };
        StdRng::seed_from_u64(seed)
    }

    /// Normalize, dedupe and keep only loaded symbols, preserving order.
    fn resolve_symbols(&self, symbols: &[String]) -> Result<Vec<String>> {
        if symbols.is_empty() {
            return Err(MarketError::InvalidInput("no symbols given".to_string()));
        }
        let mut seen = HashSet::new();
        let mut resolved = Vec::with_capacity(symbols.len());
        for raw in symbols {
            let symbol = normalize_symbol(raw);
            if !self.market.store.contains(&symbol) {
                warn!("Shock skips unknown symbol {:?}", raw);
                continue;
            }
            if seen.insert(symbol.clone()) {
                resolved.push(symbol);
            }
        }
        if resolved.is_empty() {
            return Err(MarketError::NotFound(format!(
                "none of {:?} is a loaded symbol",
                symbols
            )));
        }
        Ok(resolved)
    }

    /// Validate and start a shock on its own thread.
    ///
    /// Returns as soon as the thread is running; the handle is only needed by
    /// callers that want to wait for completion.
    pub fn spawn_shock(
        &self,
        symbols: &[String],
        direction: Direction,
        magnitude: f64,
    ) -> Result<(ShockAck, JoinHandle<()>)> {
        let plan = ShockPlan::new(direction, magnitude)?;
        let symbols = self.resolve_symbols(symbols)?;
        let shock_id = self.next_shock_id.fetch_add(1, Ordering::Relaxed);
        let runner = ShockRunner::new(
            shock_id,
            symbols.clone(),
            plan,
            self.market.clone(),
            self.shock_rng(shock_id),
            Arc::clone(&self.pacer),
        )?;
        let handle = thread::Builder::new()
            .name(format!("shock-{}", shock_id))
            .spawn(move || {
                if let Err(e) = runner.run() {
                    error!("Shock {} aborted: {}", shock_id, e);
                }
            })?;
        Ok((
            ShockAck {
                shock_id,
                symbols,
                target_multiplier: plan.target_multiplier,
                step_count: plan.step_count,
            },
            handle,
        ))
    }

    /// Start a shock and return its acknowledgement immediately.
    pub fn trigger_shock(&self, symbols: &[String], direction: Direction, magnitude: f64) -> Result<ShockAck> {
        self.spawn_shock(symbols, direction, magnitude).map(|(ack, _)| ack)
    }

    fn sector_symbols(&self, sector: &str) -> Vec<String> {
        self.stocks
            .iter()
            .filter(|s| s.sector.trim().eq_ignore_ascii_case(sector))
            .map(|s| s.id.clone())
            .collect()
    }

    /// Resolve a news item to a shock, if it moves anything.
    pub fn spawn_news(&self, news: &NewsItem) -> Result<Option<(ShockAck, JoinHandle<()>)>> {
        let stock = non_blank(news.affected_stock.as_deref());
        let sector = non_blank(news.affected_sector.as_deref());
        if stock.is_some() && sector.is_some() {
            return Err(MarketError::InvalidInput(
                "provide either affected_stock or affected_sector, not both".to_string(),
            ));
        }
        if news.impact.is_nan() {
            return Err(MarketError::InvalidInput("impact is not a number".to_string()));
        }
        let impact = news.impact.clamp(-MAX_NEWS_IMPACT, MAX_NEWS_IMPACT);

        let stock = stock.map(normalize_symbol);
        if let Some(id) = &stock {
            if !self.market.store.contains(id) {
                return Err(MarketError::NotFound(id.clone()));
            }
        }
        info!("News published: {:?} (impact {})", news.title, impact);

        if impact == 0.0 {
            return Ok(None);
        }
        let targets = match (stock, sector) {
            (Some(id), _) => vec![id],
            (None, Some(sector)) => {
                let ids = self.sector_symbols(sector);
                if ids.is_empty() {
                    return Err(MarketError::NotFound(format!("sector {}", sector)));
                }
                ids
            }
            (None, None) => return Ok(None),
        };
        self.spawn_shock(&targets, Direction::from_signed(impact), impact.abs())
            .map(Some)
    }

    /// Publish a news item; returns the shock it started, if any.
    pub fn publish_news(&self, news: &NewsItem) -> Result<Option<ShockAck>> {
        Ok(self.spawn_news(news)?.map(|(ack, _)| ack))
    }

    pub fn session_status(&self) -> SessionStatus {
        self.session.status()
    }

    /// Add a feed subscriber, handing it the current snapshot first.
    pub fn subscribe(&self, sink: Arc<dyn SubscriberSink>) -> Result<SubscriberId> {
        let initial = self.snapshot()?;
        self.market.hub.subscribe(sink, &initial)
    }

    /// Run the continuous price process until `stop_rx` fires or closes.
    pub fn start_price_process(&self, stop_rx: Receiver<()>) -> JoinHandle<()> {
        let seed = self.config.rng_seed.map_or_else(rand::random, |s| s ^ 0x5eed);
        PriceProcess::new(
            &self.stocks,
            self.config.default_volatility,
            self.config.process,
            StdRng::seed_from_u64(seed),
        )
        .spawn(self.market.clone(), self.config.tick_interval(), stop_rx)
    }

    /// Probe subscribers and expire silent ones every heartbeat period.
    pub fn start_heartbeat(&self, stop_rx: Receiver<()>) -> JoinHandle<()> {
        let hub = Arc::clone(&self.market.hub);
        let interval = self.config.heartbeat_interval();
        thread::spawn(move || {
            info!("Heartbeat started, interval {:?}", interval);
            let ticker = tick(interval);
            loop {
                select! {
                    recv(stop_rx) -> _ => break,
                    recv(ticker) -> _ => {
                        let report = hub.heartbeat();
                        debug!("Heartbeat: probed {}, dropped {}", report.probed, report.dropped);
                    }
                }
            }
            info!("Heartbeat stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;
    use std::time::{Duration, Instant};

    fn engine() -> MarketEngine {
        let config = EngineConfig {
            seed_history_points: 5,
            shock_pacing: false,
            rng_seed: Some(11),
            ..EngineConfig::default()
        };
        MarketEngine::new(
            vec![
                StockSpec::new("ACME", "Acme", 100.0, "Tech"),
                StockSpec::new("BOLT", "Bolt", 20.0, "Energy"),
                StockSpec::new("CRUX", "Crux", 50.0, "tech "),
            ],
            config,
            SessionClock::unbounded(),
        )
        .unwrap()
    }

    fn news(stock: Option<&str>, sector: Option<&str>, impact: f64) -> NewsItem {
        NewsItem {
            title: "headline".to_string(),
            affected_stock: stock.map(String::from),
            affected_sector: sector.map(String::from),
            impact,
        }
    }

    #[derive(Default)]
    struct CountingSink {
        frames: AtomicUsize,
    }

    impl SubscriberSink for CountingSink {
        fn send(&self, _frame: &[u8]) -> io::Result<()> {
            self.frames.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn close(&self) {}
        fn describe(&self) -> String {
            "counting".to_string()
        }
    }

    /// What the market looked like when a shock asked to wait.
    #[derive(Debug, Clone, Copy)]
    struct Wait {
        at: Instant,
        duration: Duration,
        frames: usize,
        volume: u64,
    }

    /// Virtual-time pacer that records every wait instead of sleeping.
    struct RecordingPacer {
        clock: Mutex<Instant>,
        waits: Mutex<Vec<Wait>>,
        sink: Arc<CountingSink>,
        market: Market,
        symbol: String,
    }

    impl Pacer for RecordingPacer {
        fn pause(&self, duration: Duration) {
            let volume = self
                .market
                .aggregator
                .query(&self.symbol, 5)
                .map(|candles| candles.iter().map(|c| c.volume).sum::<u64>())
                .unwrap_or(0);
            let mut clock = self.clock.lock().unwrap();
            self.waits.lock().unwrap().push(Wait {
                at: *clock,
                duration,
                frames: self.sink.frames.load(Ordering::SeqCst),
                volume,
            });
            *clock += duration;
        }

        fn now(&self) -> Instant {
            *self.clock.lock().unwrap()
        }
    }

    #[test]
    fn paced_shock_keeps_its_timing_and_candle_spacing() {
        let config = EngineConfig {
            seed_history_points: 0,
            rng_seed: Some(17),
            ..EngineConfig::default()
        };
        let stocks = vec![
            StockSpec::new("ACME", "Acme", 100.0, "Tech"),
            StockSpec::new("BOLT", "Bolt", 20.0, "Energy"),
        ];
        let engine = MarketEngine::new(stocks, config, SessionClock::unbounded()).unwrap();
        let sink = Arc::new(CountingSink::default());
        let pacer = Arc::new(RecordingPacer {
            clock: Mutex::new(Instant::now()),
            waits: Mutex::new(Vec::new()),
            sink: Arc::clone(&sink),
            market: engine.market().clone(),
            symbol: "ACME".to_string(),
        });
        let engine = engine.with_pacer(pacer.clone());
        engine.subscribe(sink.clone()).unwrap();

        let (ack, handle) = engine.spawn_shock(&["ACME".into()], Direction::Spike, 0.5).unwrap();
        handle.join().unwrap();
        assert_eq!(engine.get_price("ACME").unwrap(), 150.0);

        let waits = pacer.waits.lock().unwrap();
        let (mut frames, mut volume) = (1, 0);
        let (mut micro, mut plateaus, mut appends, mut held_back) = (0, 0, 0, 0);
        let mut last_append: Option<Instant> = None;
        let settle = waits.last().copied().unwrap();

        for wait in &waits[..waits.len() - 1] {
            let ms = wait.duration.as_millis();
            if wait.frames == frames {
                plateaus += 1;
                assert!((400..1800).contains(&ms), "plateau of {}ms", ms);
                assert_eq!(wait.volume, volume);
                continue;
            }
            micro += 1;
            assert_eq!(wait.frames, frames + 1);
            assert!((120..640).contains(&ms), "micro-tick pause of {}ms", ms);
            if wait.volume > volume {
                appends += 1;
                // 400 + [0, 3000) + 700 * 0.5
                assert!((750..3750).contains(&(wait.volume - volume)));
                last_append = Some(wait.at);
            } else {
                held_back += 1;
                let since = wait.at.duration_since(last_append.unwrap());
                assert!(since <= Duration::from_millis(1200), "tick held back after {:?}", since);
            }
            frames = wait.frames;
            volume = wait.volume;
        }

        let steps = ack.step_count as usize;
        assert!((steps..=3 * steps).contains(&micro));
        assert!(plateaus > 0 && plateaus < steps);
        assert!(appends > 0 && held_back > 0);
        assert_eq!(appends + held_back, micro);

        assert_eq!(settle.duration, Duration::from_millis(90));
        assert_eq!(settle.frames, frames + 1);
        assert!((1200..6400).contains(&(settle.volume - volume)));
        assert_eq!(sink.frames.load(Ordering::SeqCst), micro + 2);
    }

    #[test]
    fn empty_stock_list_is_rejected() {
        let result = MarketEngine::new(Vec::new(), EngineConfig::default(), SessionClock::unbounded());
        assert!(matches!(result, Err(MarketError::InvalidInput(_))));
    }

    #[test]
    fn unknown_symbols_are_filtered_from_shocks() {
        let engine = engine();
        let (ack, handle) = engine
            .spawn_shock(&["acme".into(), "NOPE".into(), "ACME".into()], Direction::Spike, 0.2)
            .unwrap();
        assert_eq!(ack.symbols, vec!["ACME".to_string()]);
        handle.join().unwrap();
        assert!((engine.get_price("ACME").unwrap() - 120.0).abs() < 1e-9);

        let err = engine.trigger_shock(&["NOPE".into()], Direction::Tank, 0.2).unwrap_err();
        assert!(matches!(err, MarketError::NotFound(_)));
        let err = engine.trigger_shock(&[], Direction::Tank, 0.2).unwrap_err();
        assert!(matches!(err, MarketError::InvalidInput(_)));
    }

    #[test]
    fn news_resolves_sector_case_insensitively() {
        let engine = engine();
        let (ack, handle) = engine.spawn_news(&news(None, Some(" TECH "), -0.9)).unwrap().unwrap();
        assert_eq!(ack.symbols, vec!["ACME".to_string(), "CRUX".to_string()]);
        assert_eq!(ack.target_multiplier, 0.6);
        handle.join().unwrap();
        assert!((engine.get_price("CRUX").unwrap() - 30.0).abs() < 1e-9);
        assert_eq!(engine.get_price("BOLT").unwrap(), 20.0);
    }

    #[test]
    fn news_validation() {
        let engine = engine();
        assert!(matches!(
            engine.publish_news(&news(Some("ACME"), Some("Tech"), 0.1)),
            Err(MarketError::InvalidInput(_))
        ));
        assert!(matches!(
            engine.publish_news(&news(Some("ZZZ"), None, 0.1)),
            Err(MarketError::NotFound(_))
        ));
        assert!(matches!(
            engine.publish_news(&news(None, Some("Mining"), 0.1)),
            Err(MarketError::NotFound(_))
        ));
        assert_eq!(engine.publish_news(&news(Some("ACME"), None, 0.0)).unwrap(), None);
        assert_eq!(engine.publish_news(&news(None, None, 0.3)).unwrap(), None);
    }

    #[test]
    fn candles_are_seeded_at_startup() {
        let engine = engine();
        let candles = engine.query_candles("acme", 5).unwrap();
        assert_eq!(candles.len(), 5);
        assert!(candles.iter().all(|c| c.volume > 0 || c.open == c.close));
        assert!(matches!(engine.query_candles("ZZZ", 5), Err(MarketError::NotFound(_))));
    }

    #[test]
    fn seeded_history_is_capped_by_the_ring() {
        let config = EngineConfig {
            candle_cap: 8,
            seed_history_points: 50,
            rng_seed: Some(3),
            ..EngineConfig::default()
        };
        let stocks = vec![StockSpec::new("ACME", "Acme", 100.0, "Tech")];
        let engine = MarketEngine::new(stocks, config, SessionClock::unbounded()).unwrap();
        assert_eq!(engine.market().aggregator.depth("ACME").unwrap(), (8, false));
    }
}
