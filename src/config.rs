//! CLI option structs for the four binaries (spec §6), plus the baud
//! validation `serial` enforces again at the termios layer.

use clap::Parser;

use crate::error::{BridgeError, Result};
use crate::serial::is_supported_baud;

pub const DEFAULT_MAX_PACKET_SIZE: usize = 0x10000;

/// `bridge` — splices a serial device (or loopback) to a ROUTER/DEALER pair.
#[derive(Debug, Clone, Parser)]
#[command(name = "bridge", about = "KISS-framed serial bridge")]
pub struct BridgeArgs {
    /// Serial device path. Omit for loopback mode (spec §3, §6).
    #[arg(long)]
    pub device: Option<String>,

    #[arg(long, default_value_t = 9600)]
    pub baud: u32,

    /// ROUTER bind address, faces clients (variant B, spec §6).
    #[arg(long, default_value = "ipc:///var/tmp/serial_bridge_client")]
    pub client_url: String,

    /// DEALER bind address, faces the server.
    #[arg(long, default_value = "ipc:///var/tmp/serial_bridge_server")]
    pub server_url: String,

    #[arg(long, default_value_t = DEFAULT_MAX_PACKET_SIZE)]
    pub max_packet_size: usize,

    #[arg(short, long)]
    pub verbose: bool,
}

impl BridgeArgs {
    pub fn validate(&self) -> Result<()> {
        if !is_supported_baud(self.baud) {
            return Err(BridgeError::Config(format!("unsupported baud rate: {}", self.baud)));
        }
        if self.max_packet_size == 0 {
            return Err(BridgeError::Config("max_packet_size must be nonzero".into()));
        }
        Ok(())
    }
}

fn default_host(name: &str) -> String {
    name.to_string()
}

/// `chat` — interactive line-buffered chat client over the envelope protocol.
#[derive(Debug, Clone, Parser)]
#[command(name = "chat", about = "Line-buffered chat over the envelope protocol")]
pub struct ChatArgs {
    /// This endpoint's own identity (the envelope `host` / subscription target).
    #[arg(long, default_value = "chat")]
    pub host: String,

    #[arg(long)]
    pub username: String,

    /// DEALER connect address (client-facing bridge socket).
    #[arg(long, default_value = "ipc:///var/tmp/serial_bridge_client")]
    pub client_url: String,

    #[arg(short, long)]
    pub verbose: bool,
}

impl ChatArgs {
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(BridgeError::Config("host must not be empty".into()));
        }
        if self.username.is_empty() {
            return Err(BridgeError::Config("username must not be empty".into()));
        }
        Ok(())
    }
}

/// `echo-client` — sends stdin lines to the echo server and prints replies.
#[derive(Debug, Clone, Parser)]
#[command(name = "echo-client")]
pub struct EchoClientArgs {
    #[arg(long, default_value_t = default_host("echo_client"))]
    pub host: String,

    #[arg(long, default_value = "echo_server")]
    pub remote: String,

    #[arg(long, default_value = "ipc:///var/tmp/serial_bridge_client")]
    pub client_url: String,

    #[arg(short, long)]
    pub verbose: bool,
}

impl EchoClientArgs {
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(BridgeError::Config("host must not be empty".into()));
        }
        if self.remote.is_empty() {
            return Err(BridgeError::Config("remote must not be empty".into()));
        }
        Ok(())
    }
}

/// `echo-server` — echoes back whatever it receives.
#[derive(Debug, Clone, Parser)]
#[command(name = "echo-server")]
pub struct EchoServerArgs {
    #[arg(long, default_value_t = default_host("echo_server"))]
    pub host: String,

    #[arg(long, default_value = "ipc:///var/tmp/serial_bridge_server")]
    pub server_url: String,

    #[arg(short, long)]
    pub verbose: bool,
}

impl EchoServerArgs {
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(BridgeError::Config("host must not be empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bridge_rejects_bad_baud() {
        let mut args = BridgeArgs {
            device: None,
            baud: 31250,
            client_url: "ipc://x".into(),
            server_url: "ipc://y".into(),
            max_packet_size: 1024,
            verbose: false,
        };
        assert!(args.validate().is_err());
        args.baud = 9600;
        assert!(args.validate().is_ok());
    }

    #[test]
    fn bridge_rejects_zero_max_packet_size() {
        let args = BridgeArgs {
            device: None,
            baud: 9600,
            client_url: "ipc://x".into(),
            server_url: "ipc://y".into(),
            max_packet_size: 0,
            verbose: false,
        };
        assert!(args.validate().is_err());
    }

    #[test]
    fn chat_requires_nonempty_username() {
        let args = ChatArgs {
            host: "chat".into(),
            username: "".into(),
            client_url: "ipc://x".into(),
            verbose: false,
        };
        assert!(args.validate().is_err());
    }
}
