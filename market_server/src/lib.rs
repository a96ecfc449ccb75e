//! Classroom market feed engine.
//!
//! Simulated prices for a fixed list of stocks, moved by a continuous
//! mean-reverting process and by scripted shocks, aggregated into one-minute
//! candles and pushed as full snapshots to every connected subscriber.
//!
//! - `model`: price store, candle aggregation, price process, shocks.
//! - `hub`: subscriber registry and broadcast.
//! - `engine`: facade tying the pieces together.
//! - `receiver` / `feed_listener`: TCP command and feed endpoints.
//! - `config` / `args` / `session`: configuration and the competition window.
pub mod args;
pub mod config;
pub mod engine;
pub mod feed_listener;
pub mod hub;
pub mod market;
pub mod model;
pub mod receiver;
pub mod session;

pub use engine::{MarketEngine, NewsItem};
