//! Stock list model and helpers shared between client and server.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::Read;
use strum_macros::{Display, EnumString};

use crate::error::MarketError;

/// Trait providing file parsing for the initial stock list.
pub trait StockListParser {
    /// Parses an ordered stock list from a JSON reader.
    ///
    /// The input is a JSON array of objects. Ids are trimmed and upper-cased,
    /// and the list order is preserved since it becomes the snapshot order.
    /// Returns an error on duplicate ids, empty ids or non-positive prices.
    fn parse_from_reader<R: Read>(reader: R) -> Result<Vec<StockSpec>, MarketError>;
}

/// One entry of the initial stock list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockSpec {
    /// Symbol, e.g. `ACME`.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Price the symbol starts at; also its mean-reversion baseline.
    #[serde(alias = "price", alias = "startingPrice")]
    pub starting_price: f64,
    /// Sector the symbol belongs to.
    #[serde(default)]
    pub sector: String,
    /// Per-symbol volatility override (stddev of one tick as a fraction of price).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volatility: Option<f64>,
}

impl StockSpec {
    /// Creates a spec without a volatility override.
    pub fn new(id: &str, name: &str, starting_price: f64, sector: &str) -> Self {
        StockSpec {
            id: normalize_symbol(id),
            name: name.to_string(),
            starting_price,
            sector: sector.trim().to_string(),
            volatility: None,
        }
    }
}

impl StockListParser for StockSpec {
    fn parse_from_reader<R: Read>(reader: R) -> Result<Vec<Self>, MarketError> {
        let raw: Vec<StockSpec> = serde_json::from_reader(reader)
            .map_err(|e| MarketError::ParseStocksFile(e.to_string()))?;

        let mut seen = HashSet::new();
        let mut stocks = Vec::with_capacity(raw.len());
        for mut spec in raw {
            spec.id = normalize_symbol(&spec.id);
            spec.sector = spec.sector.trim().to_string();
            if spec.id.is_empty() {
                return Err(MarketError::ParseStocksFile("empty stock id".to_string()));
            }
            if !spec.starting_price.is_finite() || spec.starting_price <= 0.0 {
                return Err(MarketError::ParseStocksFile(format!(
                    "{}: starting price must be positive, got {}",
                    spec.id, spec.starting_price
                )));
            }
            if !seen.insert(spec.id.clone()) {
                return Err(MarketError::ParseStocksFile(format!(
                    "duplicate stock id {}",
                    spec.id
                )));
            }
            stocks.push(spec);
        }
        Ok(stocks)
    }
}

/// Canonical form of a symbol: trimmed and upper-cased.
pub fn normalize_symbol(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Direction of a shock.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, ValueEnum, Display, EnumString, Hash, Eq, PartialEq,
)]
#[serde(rename_all = "lowercase")]
#[clap(rename_all = "lower")]
#[strum(ascii_case_insensitive, serialize_all = "lowercase")]
pub enum Direction {
    /// Push prices down.
    Tank,
    /// Push prices up.
    Spike,
}

impl Direction {
    /// `-1.0` for a tank, `+1.0` for a spike.
    pub fn sign(self) -> f64 {
        match self {
            Direction::Tank => -1.0,
            Direction::Spike => 1.0,
        }
    }

    /// Direction implied by the sign of a signed impact.
    pub fn from_signed(impact: f64) -> Self {
        if impact < 0.0 {
            Direction::Tank
        } else {
            Direction::Spike
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn parses_all_price_aliases_and_normalizes_ids() {
        let json = r#"[
            {"id": " acme ", "name": "Acme Corp", "price": 100.0, "sector": "Tech "},
            {"id": "BOLT", "name": "Bolt", "startingPrice": 42.5, "sector": "Energy"},
            {"id": "CRUX", "name": "Crux", "starting_price": 7.0, "volatility": 0.002}
        ]"#;
        let stocks = StockSpec::parse_from_reader(json.as_bytes()).unwrap();
        assert_eq!(stocks.len(), 3);
        assert_eq!(stocks[0].id, "ACME");
        assert_eq!(stocks[0].sector, "Tech");
        assert_eq!(stocks[1].starting_price, 42.5);
        assert_eq!(stocks[2].sector, "");
        assert_eq!(stocks[2].volatility, Some(0.002));
    }

    #[test]
    fn rejects_duplicates_and_bad_prices() {
        let dup = r#"[{"id":"A","name":"a","price":1.0},{"id":"a","name":"b","price":2.0}]"#;
        assert!(matches!(
            StockSpec::parse_from_reader(dup.as_bytes()),
            Err(MarketError::ParseStocksFile(_))
        ));

        let zero = r#"[{"id":"A","name":"a","price":0.0}]"#;
        assert!(StockSpec::parse_from_reader(zero.as_bytes()).is_err());
    }

    #[test]
    fn direction_parses_case_insensitively() {
        assert_eq!(<Direction as FromStr>::from_str("TANK").unwrap(), Direction::Tank);
        assert_eq!(<Direction as FromStr>::from_str("spike").unwrap(), Direction::Spike);
        assert_eq!(Direction::Spike.to_string(), "spike");
        assert_eq!(Direction::from_signed(-0.2), Direction::Tank);
        assert_eq!(Direction::Tank.sign(), -1.0);
    }
}
