//! Shared networking constants and helpers used by client and server.

/// TCP port for the command channel (client -> server, one JSON line per request).
pub const COMMAND_PORT: u16 = 8080;
/// TCP port for the price feed (server -> subscribers).
pub const FEED_PORT: u16 = 8081;

/// Heartbeat probe line written to idle subscribers.
pub const PING: &str = "PING";
/// Reply a subscriber sends back to a heartbeat probe.
pub const PONG: &str = "PONG";

/// Helper to format an address with a port like "ip:port".
pub fn addr(ip: &str, port: u16) -> String {
    format!("{}:{}", ip, port)
}
