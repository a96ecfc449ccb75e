//! Single source of truth for the latest price of every symbol.
//!
//! The table is a `Vec<PriceRecord>` in load order behind one `Mutex`. The
//! symbol → slot index is built once at construction and never changes, so
//! lookups need no lock. Every mutation and every snapshot copy happens inside
//! the same critical section, which is what keeps broadcast snapshots from
//! tearing across symbols.

use market_common::payload::PriceRecord;
use market_common::stock::StockSpec;
use market_common::{MarketError, Result};
use std::collections::HashMap;
use std::sync::Mutex;

/// Lowest price any symbol may take.
pub const PRICE_FLOOR: f64 = 0.01;

/// Clamp a candidate price to the floor; NaN collapses to the floor as well.
pub fn clamp_price(price: f64) -> f64 {
    if price.is_nan() || price < PRICE_FLOOR {
        PRICE_FLOOR
    } else {
        price
    }
}

/// Mutex-guarded price table.
pub struct PriceStore {
    records: Mutex<Vec<PriceRecord>>,
    index: HashMap<String, usize>,
}

impl PriceStore {
    /// One record per stock, initialised at its starting price with zero change.
    pub fn new(stocks: &[StockSpec]) -> Self {
        let records = stocks
            .iter()
            .map(|s| PriceRecord {
                id: s.id.clone(),
                name: s.name.clone(),
                price: clamp_price(s.starting_price),
                change: 0.0,
            })
            .collect();
        let index = stocks
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id.clone(), i))
            .collect();
        Self {
            records: Mutex::new(records),
            index,
        }
    }

    /// Number of symbols.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// True when no symbol is loaded.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Whether `symbol` is loaded.
    pub fn contains(&self, symbol: &str) -> bool {
        self.index.contains_key(symbol)
    }

    fn slot(&self, symbol: &str) -> Result<usize> {
        self.index
            .get(symbol)
            .copied()
            .ok_or_else(|| MarketError::NotFound(symbol.to_string()))
    }

    /// Latest price of `symbol`.
    pub fn get_price(&self, symbol: &str) -> Result<f64> {
        let slot = self.slot(symbol)?;
        let records = self.records.lock()?;
        Ok(records[slot].price)
    }

    /// Prices of several symbols read in one critical section.
    pub fn get_prices(&self, symbols: &[String]) -> Result<Vec<f64>> {
        let slots = symbols
            .iter()
            .map(|s| self.slot(s))
            .collect::<Result<Vec<_>>>()?;
        let records = self.records.lock()?;
        Ok(slots.into_iter().map(|i| records[i].price).collect())
    }

    /// Set a new price (floor clamped) and return the previous one.
    pub fn set_price(&self, symbol: &str, new_price: f64) -> Result<f64> {
        let slot = self.slot(symbol)?;
        let mut records = self.records.lock()?;
        Ok(apply(&mut records[slot], new_price))
    }

    /// Set a new price and copy out the whole table in the same critical section.
    ///
    /// Returns the price actually stored (after clamping) and the snapshot.
    pub fn set_price_and_snapshot(
        &self,
        symbol: &str,
        new_price: f64,
    ) -> Result<(f64, Vec<PriceRecord>)> {
        let slot = self.slot(symbol)?;
        let mut records = self.records.lock()?;
        apply(&mut records[slot], new_price);
        Ok((records[slot].price, records.clone()))
    }

    /// Recompute every record in one critical section and copy out the result.
    ///
    /// `next` receives the slot index and the current record and returns the
    /// candidate price; clamping and `change` bookkeeping happen here.
    pub fn update_all<F>(&self, mut next: F) -> Result<Vec<PriceRecord>>
    where
        F: FnMut(usize, &PriceRecord) -> f64,
    {
        let mut records = self.records.lock()?;
        for (slot, record) in records.iter_mut().enumerate() {
            let candidate = next(slot, record);
            apply(record, candidate);
        }
        Ok(records.clone())
    }

    /// Copy of every record in load order.
    pub fn snapshot(&self) -> Result<Vec<PriceRecord>> {
        Ok(self.records.lock()?.clone())
    }
}

fn apply(record: &mut PriceRecord, new_price: f64) -> f64 {
    let previous = record.price;
    let clamped = clamp_price(new_price);
    record.price = clamped;
    record.change = clamped - previous;
    previous
}
