//! `bridgekit` — a KISS-framed serial bridge and the envelope-addressed
//! messaging fabric it carries.
//!
//! See the module docs for the component each one implements: [`kiss`]
//! (C1), [`envelope`] (C2), [`signal_fanout`] (C3), [`reactor`] (C4),
//! [`bridge`] (C5), [`chat`] and [`echo`] (C6).

pub mod bridge;
pub mod chat;
pub mod config;
pub mod echo;
pub mod envelope;
pub mod error;
pub mod kiss;
pub mod reactor;
pub mod serial;
pub mod signal_fanout;

pub use error::{BridgeError, Result};
