//! Market Client, a TCP client for the market feed server.
//!
//! `watch` subscribes to the feed port, prints every snapshot and answers the
//! server's `PING` heartbeats with `PONG` until Ctrl+C. Every other subcommand
//! sends one command line to the command port and prints the JSON response.
//!
//! Usage examples (CLI):
//! ```bash
//! market_client --server-ip 192.168.0.10 watch --symbols ACME,BOLT
//! market_client shock --symbols ACME --direction spike --magnitude 0.3
//! market_client news --sector Tech --impact -0.2 --title "Chip shortage"
//! market_client history ACME --points 60
//! ```
#![warn(missing_docs)]
mod args;
mod sender;

use crate::args::{Action, Args};
use crate::sender::{CommandSender, FeedWatcher};
use clap::Parser;
use log::{error, info};
use market_common::command::Response;
use market_common::net::addr;
use market_common::{MarketError, Result};
use std::net::TcpStream;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

fn main() -> Result<(), MarketError> {
    init_logger();
    let args = Args::parse();
    let server_ip = args.server_ip.trim().replace('"', "");

    if let Action::Watch { symbols } = args.action {
        let shutdown = Arc::new(AtomicBool::new(false));
        {
            let shutdown = shutdown.clone();
            ctrlc::set_handler(move || {
                info!("Ctrl+C received. Shutting down client...");
                shutdown.store(true, Ordering::SeqCst);
            })
            .map_err(|e| MarketError::Format(format!("Error setting Ctrl+C handler: {}", e)))?;
        }
        let feed_address = addr(&server_ip, args.feed_port);
        info!("Connecting to feed at {}", feed_address);
        let stream = TcpStream::connect(&feed_address)
            .map_err(|e| MarketError::Format(format!("Failed to connect to server: {}", e)))?;
        info!("Client is running. Press Ctrl+C to exit.");
        return FeedWatcher::new(stream, symbols)?.run(shutdown);
    }

    let Some(command) = args.action.into_command() else {
        return Ok(());
    };
    let command_address = addr(&server_ip, args.command_port);
    let mut stream = TcpStream::connect(&command_address)
        .map_err(|e| MarketError::Format(format!("Failed to connect to server: {}", e)))?;

    let response = CommandSender::send_command(&mut stream, &command)?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    if let Response::Error { kind, message } = response {
        error!("Server rejected the command ({}): {}", kind, message);
        return Err(MarketError::Format(message));
    }
    Ok(())
}

fn init_logger() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();
}
