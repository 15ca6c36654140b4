//! Typed error kinds for the bridge (spec §7).
//!
//! `Protocol` and `Framing` are recoverable by construction — the codec and
//! envelope layers absorb them locally and never let them surface here.
//! Only `Config`, `Io`, and `Logic` are expected to reach a `main`.

use std::io;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("messaging fabric error: {0}")]
    Messaging(#[from] zmq::Error),

    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// Decoder detected a malformed escape or oversize packet. Recovered by
    /// resynchronising on the next FEND; constructed only for logging, never
    /// propagated past `kiss`.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Envelope label missing its trailing delimiter, or target mismatch.
    /// Recovered by draining the message; constructed only for logging.
    #[error("framing error: {0}")]
    Framing(String),

    /// Codec operation sequence violation (e.g. `close` without `open`).
    /// Indicates an implementation bug — always fatal.
    #[error("logic error: {0}")]
    Logic(String),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
