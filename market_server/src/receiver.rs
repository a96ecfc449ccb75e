use crate::engine::{MarketEngine, NewsItem};
use log::{debug, error, info, warn};
use market_common::command::{Command, Response};
use market_common::{MarketError, Result};
use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

/// TCP command receiver.
///
/// Each connection gets its own thread reading newline-delimited JSON
/// `Command`s and answering every line with one `Response` line. A bad line
/// gets an error response; a broken connection only ends that connection.
pub struct CommandReceiver {
    /// The underlying TCP listening socket.
    pub(crate) socket: TcpListener,
}

/// Run one command against the engine.
pub fn dispatch(engine: &MarketEngine, command: Command) -> Response {
    let result = match command {
        Command::Shock {
            symbols,
            direction,
            magnitude,
        } => engine
            .trigger_shock(&symbols, direction, magnitude)
            .map(Response::ShockAccepted),
        Command::News {
            title,
            affected_stock,
            affected_sector,
            impact,
        } => engine
            .publish_news(&NewsItem {
                title,
                affected_stock,
                affected_sector,
                impact,
            })
            .map(|shock| Response::NewsAccepted { shock }),
        Command::History { symbol, points } => engine
            .query_candles(&symbol, points)
            .map(|candles| Response::History { symbol, candles }),
        Command::Price { symbol } => engine
            .get_price(&symbol)
            .map(|price| Response::Price { symbol, price }),
        Command::Prices => engine.snapshot().map(Response::Prices),
        Command::Status => Ok(Response::Session(engine.session_status())),
    };
    result.unwrap_or_else(|e| {
        warn!("Command failed: {}", e);
        Response::from(&e)
    })
}

/// Decode one line and dispatch it; undecodable lines become error responses.
pub fn handle_line(engine: &MarketEngine, line: &str) -> Response {
    match serde_json::from_str::<Command>(line) {
        Ok(command) => {
            debug!("Received command {:?}", command);
            dispatch(engine, command)
        }
        Err(e) => Response::from(&MarketError::SerdeJson(e)),
    }
}

fn write_response(stream: &mut TcpStream, response: &Response) -> Result<()> {
    let mut line = serde_json::to_vec(response)?;
    line.push(b'\n');
    stream.write_all(&line)?;
    Ok(())
}

fn serve_connection(engine: &MarketEngine, stream: TcpStream) -> Result<()> {
    let mut writer = stream.try_clone()?;
    let reader = BufReader::new(stream);
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let response = handle_line(engine, &line);
        write_response(&mut writer, &response)?;
    }
    Ok(())
}

impl CommandReceiver {
    /// Bind a new TCP receiver to the provided `bind_addr` (e.g., `0.0.0.0:8080`).
    pub fn new(bind_addr: &str) -> Result<Self> {
        let socket = TcpListener::bind(bind_addr)?;
        Ok(Self { socket })
    }

    /// Address the listener actually bound, useful with port 0.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Blocking accept loop; never returns while the listener is healthy.
    pub fn receive_loop(self, engine: Arc<MarketEngine>) -> Result<()> {
        info!("Command TCP server is started on {}", self.socket.local_addr()?);

        for stream in self.socket.incoming() {
            match stream {
                Ok(stream) => {
                    let peer = stream
                        .peer_addr()
                        .map(|a| a.to_string())
                        .unwrap_or_else(|_| "unknown".to_string());
                    debug!("Command connection from {}", peer);
                    let engine = Arc::clone(&engine);
                    thread::spawn(move || {
                        if let Err(e) = serve_connection(&engine, stream) {
                            error!("Command connection {} failed: {}", peer, e);
                        }
                        debug!("Command connection {} closed", peer);
                    });
                }
                Err(e) => error!("TCP connection error: {}", e),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::session::SessionClock;
    use market_common::stock::StockSpec;

    fn engine() -> MarketEngine {
        let config = EngineConfig {
            seed_history_points: 3,
            shock_pacing: false,
            rng_seed: Some(3),
            ..EngineConfig::default()
        };
        MarketEngine::new(
            vec![StockSpec::new("ACME", "Acme", 100.0, "Tech")],
            config,
            SessionClock::unbounded(),
        )
        .unwrap()
    }

    fn error_kind(response: Response) -> String {
        match response {
            Response::Error { kind, .. } => kind,
            other => panic!("expected an error, got {:?}", other),
        }
    }

    #[test]
    fn malformed_line_is_invalid_input() {
        let engine = engine();
        assert_eq!(error_kind(handle_line(&engine, "not json")), "invalid_input");
        assert_eq!(error_kind(handle_line(&engine, r#"{"command":"explode"}"#)), "invalid_input");
    }

    #[test]
    fn price_and_prices() {
        let engine = engine();
        let resp = handle_line(&engine, r#"{"command":"price","symbol":"acme"}"#);
        assert_eq!(
            resp,
            Response::Price {
                symbol: "acme".to_string(),
                price: 100.0
            }
        );
        match handle_line(&engine, r#"{"command":"prices"}"#) {
            Response::Prices(snapshot) => assert_eq!(snapshot.stocks.len(), 1),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn unknown_symbol_is_not_found() {
        let engine = engine();
        let resp = dispatch(&engine, Command::Price { symbol: "ZZZ".into() });
        assert_eq!(error_kind(resp), "not_found");
    }

    #[test]
    fn history_and_status() {
        let engine = engine();
        match dispatch(&engine, Command::History { symbol: "ACME".into(), points: 4 }) {
            Response::History { candles, .. } => assert_eq!(candles.len(), 4),
            other => panic!("unexpected {:?}", other),
        }
        let resp = dispatch(&engine, Command::History { symbol: "ACME".into(), points: 0 });
        assert_eq!(error_kind(resp), "invalid_input");
        match dispatch(&engine, Command::Status) {
            Response::Session(status) => assert!(status.open),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn shock_is_acknowledged() {
        let engine = engine();
        let line = r#"{"command":"shock","symbols":["ACME"],"direction":"spike","magnitude":0.5}"#;
        match handle_line(&engine, line) {
            Response::ShockAccepted(ack) => {
                assert_eq!(ack.symbols, vec!["ACME".to_string()]);
                assert_eq!(ack.step_count, 120);
            }
            other => panic!("unexpected {:?}", other),
        }
        let line = r#"{"command":"shock","symbols":["ACME"],"direction":"spike","magnitude":-1}"#;
        assert_eq!(error_kind(handle_line(&engine, line)), "invalid_input");
    }
}
