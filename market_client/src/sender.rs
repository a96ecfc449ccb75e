//! Talking to the market server.
//!
//! `CommandSender` writes one `Command` line to the command port and reads the
//! single `Response` line back. `FeedWatcher` streams snapshots from the feed
//! port and answers heartbeat probes so the server keeps the subscription.
use log::{debug, info, warn};
use market_common::command::{Command, Response};
use market_common::net::{PING, PONG};
use market_common::payload::Snapshot;
use market_common::stock::normalize_symbol;
use market_common::{MarketError, Result};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::net::TcpStream;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::Duration;

/// How often the watcher wakes up to check for shutdown.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Helper type for sending commands to the server.
pub struct CommandSender;

impl CommandSender {
    /// Send `command` and wait for its response line.
    pub fn send_command(stream: &mut TcpStream, command: &Command) -> Result<Response> {
        let line = command.to_line()?;
        info!("Sending command: {}", line.trim());
        stream.write_all(line.as_bytes())?;
        stream.flush()?;

        let mut reply = String::new();
        let read = BufReader::new(&*stream).read_line(&mut reply)?;
        if read == 0 {
            return Err(MarketError::Format(
                "server closed the connection without a response".to_string(),
            ));
        }
        Ok(serde_json::from_str(reply.trim())?)
    }
}

/// Live feed reader.
pub struct FeedWatcher {
    stream: TcpStream,
    symbols: Vec<String>,
}

impl FeedWatcher {
    /// Wrap a connected feed stream; `symbols` filters what gets printed.
    pub fn new(stream: TcpStream, symbols: Vec<String>) -> Result<Self> {
        stream.set_read_timeout(Some(POLL_INTERVAL))?;
        let symbols = symbols.iter().map(|s| normalize_symbol(s)).collect();
        Ok(Self { stream, symbols })
    }

    fn wants(&self, id: &str) -> bool {
        self.symbols.is_empty() || self.symbols.iter().any(|s| s == id)
    }

    fn print_snapshot(&self, snapshot: &Snapshot) {
        for stock in snapshot.stocks.iter().filter(|s| self.wants(&s.id)) {
            info!(
                "PRICE: {} ({}) Price={:.4} Change={:+.4} Time={}",
                stock.id, stock.name, stock.price, stock.change, snapshot.time
            );
        }
    }

    /// Block reading the feed until `shutdown` is set or the server hangs up.
    pub fn run(mut self, shutdown: Arc<AtomicBool>) -> Result<()> {
        info!("Watching feed from {}", self.stream.peer_addr()?);
        let mut reader = BufReader::new(self.stream.try_clone()?);
        let mut line = String::new();

        while !shutdown.load(Ordering::Relaxed) {
            match reader.read_line(&mut line) {
                Ok(0) => {
                    warn!("Feed closed by server");
                    break;
                }
                Ok(_) => {
                    let text = line.trim();
                    if text == PING {
                        debug!("PING received, answering");
                        self.stream.write_all(format!("{}\n", PONG).as_bytes())?;
                    } else if !text.is_empty() {
                        match serde_json::from_str::<Snapshot>(text) {
                            Ok(snapshot) => self.print_snapshot(&snapshot),
                            Err(_) => debug!("Received non-snapshot line: {}", text),
                        }
                    }
                    line.clear();
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }
        info!("Feed watcher stopping...");
        Ok(())
    }
}
