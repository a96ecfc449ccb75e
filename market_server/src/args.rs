//! Command-line arguments for the market server.
use clap::Parser;
use market_common::net::{COMMAND_PORT, FEED_PORT};
use std::path::PathBuf;

/// Parsed command-line arguments.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// JSON array of `{id, name, price, sector}` objects to load at startup.
    #[clap(long, default_value = "data/stocks.json")]
    pub stocks: PathBuf,

    /// Optional JSON config file with engine knobs and the competition window.
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// Address both listeners bind to.
    #[clap(long, default_value = "0.0.0.0")]
    pub host: String,

    /// TCP port for command lines.
    #[clap(long, default_value_t = COMMAND_PORT)]
    pub command_port: u16,

    /// TCP port for the price feed.
    #[clap(long, default_value_t = FEED_PORT)]
    pub feed_port: u16,

    /// Seed every random draw; overrides the config file.
    #[clap(long)]
    pub seed: Option<u64>,
}
