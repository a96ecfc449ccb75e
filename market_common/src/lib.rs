//!
//! Common types and utilities shared by the market server and client.
//!
//! This crate aggregates:
//! - `error`: unified error type `MarketError` used across the workspace.
//! - `result`: handy `Result<T, MarketError>` alias.
//! - `stock`: initial stock list model, its parser, and the shock `Direction`.
//! - `payload`: snapshot and candle payloads pushed to and queried by clients.
//! - `command`: command/response lines exchanged on the command port.
//! - `net`: networking constants and small helpers.
#![warn(missing_docs)]
pub mod command;
pub mod error;
pub mod net;
pub mod payload;
pub mod result;
pub mod stock;

pub use command::{Command, Response};
pub use error::MarketError;
pub use result::Result;
