//! Market feed server.
//!
//! Loads the stock list, seeds candle history, and then runs:
//!
//! - the continuous price process on its own thread;
//! - the heartbeat thread that probes and expires feed subscribers;
//! - the feed listener on `FEED_PORT`, one reader thread per subscriber;
//! - the command receiver on `COMMAND_PORT` in the foreground.
//!
//! Shocks and news each run on a thread of their own as they arrive.
//!
//! Feed protocol: every line the server writes is either a JSON snapshot
//! `{"stocks":[{id,name,price,change}],"time":...}` or `PING`. Subscribers
//! should answer `PING` with `PONG`; a subscriber silent for the read deadline
//! is dropped.
#![warn(missing_docs)]
use clap::Parser;
use crossbeam_channel::unbounded;
use log::{error, info};
use market_common::net::addr;
use market_common::stock::{StockListParser, StockSpec};
use market_common::{MarketError, Result};
use market_server::args::Args;
use market_server::config::ServerConfig;
use market_server::feed_listener::FeedListener;
use market_server::receiver::CommandReceiver;
use market_server::MarketEngine;
use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

fn main() -> Result<(), MarketError> {
    init_logger();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if args.seed.is_some() {
        config.engine.rng_seed = args.seed;
    }
    let session = config.competition.clock()?;
    if let (Some(start), Some(end)) = (session.start(), session.end()) {
        info!("Competition window (UTC): {} .. {}", start, end);
    }

    let file = File::open(&args.stocks).map_err(|e| {
        MarketError::ParseStocksFile(format!("{}: {}", args.stocks.display(), e))
    })?;
    let stocks = StockSpec::parse_from_reader(BufReader::new(file))?;
    info!("Loaded {} stocks from {}", stocks.len(), args.stocks.display());

    let engine = Arc::new(MarketEngine::new(stocks, config.engine, session)?);

    // Held for the life of the process; dropping it would stop both threads.
    let (_stop_tx, stop_rx) = unbounded::<()>();
    let _process = engine.start_price_process(stop_rx.clone());
    let _heartbeat = engine.start_heartbeat(stop_rx);

    let feed = FeedListener::new(&addr(&args.host, args.feed_port))?;
    let _feed = feed.start(Arc::clone(&engine));

    let receiver = CommandReceiver::new(&addr(&args.host, args.command_port))?;
    if let Err(e) = receiver.receive_loop(engine) {
        error!("Receiver loop failed: {}", e);
        return Err(e);
    }
    Ok(())
}

fn init_logger() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();
}
