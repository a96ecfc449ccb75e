//! Feed and query payloads.
//!
//! `Snapshot` is what every subscriber receives on connect and after every
//! price mutation. `CandlePoint` is the wire form of one minute candle.
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Current price and last delta of one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    /// Symbol.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Latest price, never below the price floor.
    pub price: f64,
    /// `price - previous price` of the last mutation.
    pub change: f64,
}

/// Atomically consistent copy of every symbol's price, stamped with a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// All symbols, in load order.
    pub stocks: Vec<PriceRecord>,
    /// RFC3339 timestamp of the snapshot.
    pub time: String,
}

impl Snapshot {
    /// Wraps `stocks` with the given timestamp.
    pub fn at(stocks: Vec<PriceRecord>, time: DateTime<Utc>) -> Self {
        Snapshot {
            stocks,
            time: time.to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }

    /// Wraps `stocks` with the current time.
    pub fn now(stocks: Vec<PriceRecord>) -> Self {
        Self::at(stocks, Utc::now())
    }
}

/// One minute candle as returned by a history query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandlePoint {
    /// RFC3339 open time of the minute.
    pub time: String,
    #[allow(missing_docs)]
    pub open: f64,
    #[allow(missing_docs)]
    pub high: f64,
    #[allow(missing_docs)]
    pub low: f64,
    #[allow(missing_docs)]
    pub close: f64,
    /// Summed tick volume; zero for filled gaps.
    pub volume: u64,
}
