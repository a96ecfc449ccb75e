//! Shared protocol types used by client and server on the command port.
//!
//! Every request is one JSON object on its own line, tagged by `command`;
//! the server answers with one `Response` line tagged by `status`.
use serde::{Deserialize, Serialize};

use crate::error::MarketError;
use crate::payload::{CandlePoint, Snapshot};
use crate::stock::Direction;

/// Request sent by a collaborator (admin panel, chart page, trading layer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    /// Animate the given symbols toward `1 + sign * magnitude` times their price.
    Shock {
        /// Target symbols; unknown ones are skipped.
        symbols: Vec<String>,
        /// Tank or spike.
        direction: Direction,
        /// Size of the move, `> 0`, clamped to 4.0.
        magnitude: f64,
    },
    /// Publish a news item that moves one stock or a whole sector.
    News {
        /// Headline, logged only.
        #[serde(default)]
        title: String,
        /// Single affected stock.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        affected_stock: Option<String>,
        /// Affected sector (case-insensitive).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        affected_sector: Option<String>,
        /// Signed impact, clamped to ±0.4.
        impact: f64,
    },
    /// Minute candles for one symbol, oldest first.
    History {
        /// Symbol to query.
        symbol: String,
        /// Number of minutes to return.
        points: usize,
    },
    /// Latest price of one symbol.
    Price {
        /// Symbol to query.
        symbol: String,
    },
    /// Full snapshot of every symbol.
    Prices,
    /// Competition session window.
    Status,
}

impl Command {
    /// Encode as a single newline-terminated JSON line.
    pub fn to_line(&self) -> Result<String, MarketError> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// Acknowledgement returned as soon as a shock has been started.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShockAck {
    /// Process-unique id of the shock, used in logs.
    pub shock_id: u64,
    /// Symbols actually being animated.
    pub symbols: Vec<String>,
    /// Final price = base * target_multiplier.
    pub target_multiplier: f64,
    /// Number of animation steps.
    pub step_count: u32,
}

/// Session window of the competition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStatus {
    /// RFC3339 start, if configured.
    pub start: Option<String>,
    /// RFC3339 end, if configured.
    pub end: Option<String>,
    /// RFC3339 server time.
    pub now: String,
    /// Whether `start < now < end`; always true without a configured window.
    pub open: bool,
}

/// Answer to a `Command`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    /// Shock started.
    ShockAccepted(ShockAck),
    /// News accepted; `shock` is empty when the item moves no price.
    NewsAccepted {
        /// The shock the news item started, if any.
        shock: Option<ShockAck>,
    },
    /// Candle history.
    History {
        /// Queried symbol.
        symbol: String,
        /// Candles oldest to newest.
        candles: Vec<CandlePoint>,
    },
    /// Latest price.
    Price {
        /// Queried symbol.
        symbol: String,
        /// Latest price.
        price: f64,
    },
    /// Full snapshot.
    Prices(Snapshot),
    /// Session window.
    Session(SessionStatus),
    /// The command failed.
    Error {
        /// `not_found`, `invalid_input` or `internal`.
        kind: String,
        /// Human-readable reason.
        message: String,
    },
}

impl From<&MarketError> for Response {
    fn from(err: &MarketError) -> Self {
        let kind = match err {
            MarketError::NotFound(_) => "not_found",
            MarketError::InvalidInput(_) | MarketError::SerdeJson(_) | MarketError::Format(_) => {
                "invalid_input"
            }
            MarketError::Io(_)
            | MarketError::ParseStocksFile(_)
            | MarketError::Config(_)
            | MarketError::MutexLock(_)
            | MarketError::SubscriberWrite(_) => "internal",
        };
        Response::Error {
            kind: kind.to_string(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shock_command_wire_format() {
        let line = r#"{"command":"shock","symbols":["ACME"],"direction":"tank","magnitude":0.3}"#;
        let cmd: Command = serde_json::from_str(line).unwrap();
        assert_eq!(
            cmd,
            Command::Shock {
                symbols: vec!["ACME".to_string()],
                direction: Direction::Tank,
                magnitude: 0.3,
            }
        );
    }

    #[test]
    fn unit_commands_and_lines() {
        let cmd: Command = serde_json::from_str(r#"{"command":"prices"}"#).unwrap();
        assert_eq!(cmd, Command::Prices);
        let line = Command::Status.to_line().unwrap();
        assert_eq!(line, "{\"command\":\"status\"}\n");
    }

    #[test]
    fn errors_map_to_kinds() {
        let resp = Response::from(&MarketError::NotFound("ZZZ".into()));
        match resp {
            Response::Error { kind, message } => {
                assert_eq!(kind, "not_found");
                assert!(message.contains("ZZZ"));
            }
            other => panic!("unexpected {:?}", other),
        }

        let kind_of = |err: MarketError| match Response::from(&err) {
            Response::Error { kind, .. } => kind,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(kind_of(MarketError::InvalidInput("x".into())), "invalid_input");
        assert_eq!(kind_of(MarketError::Format("x".into())), "invalid_input");
        assert_eq!(kind_of(MarketError::MutexLock("x".into())), "internal");
        assert_eq!(kind_of(MarketError::SubscriberWrite("x".into())), "internal");
    }
}
