//! Command-line arguments for the market client.
//!
//! This module defines the CLI interface using `clap`. See `main` for end-to-end usage.
use clap::{Parser, Subcommand};
use market_common::command::Command;
use market_common::net::{COMMAND_PORT, FEED_PORT};
use market_common::stock::Direction;

/// Parsed command-line arguments.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Server IP address (IPv4 or IPv6) where the market server is running.
    #[clap(long, default_value = "127.0.0.1")]
    pub server_ip: String,

    /// Server command port.
    #[clap(long, default_value_t = COMMAND_PORT)]
    pub command_port: u16,

    /// Server feed port.
    #[clap(long, default_value_t = FEED_PORT)]
    pub feed_port: u16,

    /// What to do.
    #[command(subcommand)]
    pub action: Action,
}

/// Client actions.
#[derive(Debug, Subcommand)]
pub enum Action {
    /// Stream live snapshots until Ctrl+C, answering heartbeats.
    Watch {
        /// Only print these symbols (comma separated); all when empty.
        #[clap(long, value_delimiter = ',')]
        symbols: Vec<String>,
    },
    /// Crash or rally one or more symbols.
    Shock {
        /// Target symbols, comma separated.
        #[clap(long, value_delimiter = ',', required = true)]
        symbols: Vec<String>,
        /// `tank` or `spike`.
        #[clap(long, value_enum)]
        direction: Direction,
        /// Size of the move; 0.5 means +50% for a spike, -50% for a tank.
        #[clap(long, default_value_t = 0.5)]
        magnitude: f64,
    },
    /// Publish a news item that moves a stock or a whole sector.
    News {
        /// Headline.
        #[clap(long, default_value = "")]
        title: String,
        /// Affected stock.
        #[clap(long, conflicts_with = "sector")]
        stock: Option<String>,
        /// Affected sector.
        #[clap(long)]
        sector: Option<String>,
        /// Signed impact in [-0.4, 0.4].
        #[clap(long, allow_hyphen_values = true)]
        impact: f64,
    },
    /// Print minute candles for a symbol.
    History {
        /// Symbol to query.
        symbol: String,
        /// Number of minutes.
        #[clap(long, default_value_t = 30)]
        points: usize,
    },
    /// Print the latest price of a symbol.
    Price {
        /// Symbol to query.
        symbol: String,
    },
    /// Print a full snapshot.
    Prices,
    /// Print the competition session window.
    Status,
}

impl Action {
    /// The command-port request for this action; `None` for `watch`.
    pub fn into_command(self) -> Option<Command> {
        let command = match self {
            Action::Watch { .. } => return None,
            Action::Shock {
                symbols,
                direction,
                magnitude,
            } => Command::Shock {
                symbols,
                direction,
                magnitude,
            },
            Action::News {
                title,
                stock,
                sector,
                impact,
            } => Command::News {
                title,
                affected_stock: stock,
                affected_sector: sector,
                impact,
            },
            Action::History { symbol, points } => Command::History { symbol, points },
            Action::Price { symbol } => Command::Price { symbol },
            Action::Prices => Command::Prices,
            Action::Status => Command::Status,
        };
        Some(command)
    }
}
