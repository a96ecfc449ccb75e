//! Error types shared between the market server and client.
//!
//! The `MarketError` enum unifies I/O, serialization, config and locking
//! failures with the engine's own domain errors (`NotFound`, `InvalidInput`,
//! subscriber write failures), so every crate in the workspace can propagate a
//! single error type with `?`.
use std::io;
use std::sync::PoisonError;

use thiserror::Error;

/// Unified error type shared by client and server.
#[derive(Error, Debug)]
pub enum MarketError {
    /// I/O error originating from the standard library or sockets/files.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Generic formatting/validation error with a human-readable message.
    #[error("Format error: {0}")]
    Format(String),

    /// Error while parsing the stock list file into `StockSpec` values.
    #[error("Parse stocks file error: {0}")]
    ParseStocksFile(String),

    /// Invalid or unreadable configuration.
    #[error("Config error: {0}")]
    Config(String),

    /// Failure while encoding/decoding JSON via serde_json.
    #[error("JSON serialization/deserialization error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    /// Error indicating a poisoned mutex/lock was encountered.
    #[error("Mutex Lock Poisoned: {0}")]
    MutexLock(String),

    /// A symbol (or sector) named by the caller is not loaded.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Request rejected before any work started.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Writing to a subscriber failed or timed out; the subscriber is dropped.
    #[error("Subscriber write failed: {0}")]
    SubscriberWrite(String),
}

impl<T> From<PoisonError<T>> for MarketError {
    fn from(err: PoisonError<T>) -> Self {
        MarketError::MutexLock(err.to_string())
    }
}
