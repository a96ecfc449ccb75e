//! Shared handles every price producer works against.

use crate::hub::BroadcastHub;
use crate::model::aggregator::CandleAggregator;
use crate::model::price_store::PriceStore;
use market_common::payload::{PriceRecord, Snapshot};
use std::sync::Arc;

/// Price store, candle aggregator and broadcast hub, cheap to clone into threads.
#[derive(Clone)]
pub struct Market {
    pub store: Arc<PriceStore>,
    pub aggregator: Arc<CandleAggregator>,
    pub hub: Arc<BroadcastHub>,
}

impl Market {
    pub fn new(store: PriceStore, aggregator: CandleAggregator, hub: BroadcastHub) -> Self {
        Self {
            store: Arc::new(store),
            aggregator: Arc::new(aggregator),
            hub: Arc::new(hub),
        }
    }

    /// Stamp a table copy taken by the store and push it to every subscriber.
    pub fn publish(&self, records: Vec<PriceRecord>) -> usize {
        self.hub.broadcast(&Snapshot::now(records))
    }
}
