//! C1's transport: opens and configures the UART (spec §6).
//!
//! Wraps [`serialport::TTYPort`] in raw, non-blocking, 8-N-1 mode with no
//! flow control, matching `Posix::Serial`'s termios configuration.

use std::io::{Read, Write};
use std::time::Duration;

use serialport::{ClearBuffer, SerialPort, StopBits};

use crate::error::{BridgeError, Result};

/// The POSIX baud set this bridge accepts (spec §6). Anything else is a
/// `ConfigError` at parse time and a `serialport::Error` if it somehow slips
/// through to `open`.
pub const BAUD_RATES: &[u32] = &[
    50, 75, 110, 134, 150, 200, 300, 600, 1200, 1800, 2400, 4800, 9600, 19200, 38400, 57600,
    115200, 230400, 460800, 500000, 921600, 1_000_000, 1_152_000, 1_500_000, 2_000_000,
    2_500_000, 3_000_000, 3_500_000, 4_000_000,
];

pub fn is_supported_baud(baud: u32) -> bool {
    BAUD_RATES.contains(&baud)
}

/// A UART opened for the bridge. `None` (the caller never constructs one)
/// means loopback mode (spec §3: "no serial device configured").
pub struct Serial {
    port: Box<dyn SerialPort>,
}

impl Serial {
    pub fn open(device: &str, baud: u32) -> Result<Self> {
        if !is_supported_baud(baud) {
            return Err(BridgeError::Config(format!("unsupported baud rate: {baud}")));
        }
        let mut port = serialport::new(device, baud)
            .stop_bits(StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(Duration::from_millis(0))
            .open()?;
        port.clear(ClearBuffer::All)?;
        port.set_timeout(Duration::from_millis(0))?;
        Ok(Self { port })
    }

    /// Non-blocking read, up to `buf.len()` bytes. `Ok(0)` means "nothing
    /// available right now", not EOF — callers retry next readiness.
    pub fn read_nonblocking(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    pub fn write_nonblocking(&mut self, buf: &[u8]) -> Result<usize> {
        match self.port.write(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    pub fn as_raw_fd(&self) -> std::os::unix::io::RawFd {
        use std::os::unix::io::AsRawFd;
        self.port.as_raw_fd()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unsupported_baud() {
        assert!(!is_supported_baud(31250));
        assert!(is_supported_baud(115200));
        assert!(is_supported_baud(4_000_000));
    }
}
