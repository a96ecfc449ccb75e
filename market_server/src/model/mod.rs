//! Domain models of the market engine.
//!
//! - `price_store`: mutex-guarded table of latest prices, snapshot source.
//! - `candle` / `aggregator`: one-minute OHLCV candles built from ticks.
//! - `price_process`: background mean-reverting price driver.
//! - `shock`: scripted crash/rally trajectories.
//! - `liveness`: keep-alive tracker for feed subscribers.
//! - `noise`: random draws and curve helpers.

pub mod aggregator;
pub mod candle;
pub mod liveness;
pub mod noise;
pub mod price_process;
pub mod price_store;
pub mod shock;
