//! Signal fanout (C3, spec §4.3): a process-singleton listener thread that
//! turns POSIX signals into messages on a fixed in-process PUB address, so
//! every reactor observes termination uniformly.

use std::thread;

use signal_hook::consts::{SIGINT, SIGQUIT, SIGTERM, SIGUSR1};
use signal_hook::iterator::Signals;

use crate::error::Result;

pub const SIGNAL_ADDRESS: &str = "inproc://signal";

const HANDLED_SIGNALS: &[i32] = &[SIGINT, SIGQUIT, SIGTERM, SIGUSR1];

/// What a reactor should do in response to a decoded signal record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    /// SIGINT, SIGTERM — stop immediately.
    Terminate,
    /// SIGQUIT — drain pending work, then stop.
    Exit,
    /// Anything else this process listens for but doesn't act on.
    Ignore,
}

pub fn classify(signum: i32) -> SignalAction {
    match signum {
        SIGINT | SIGTERM => SignalAction::Terminate,
        SIGQUIT => SignalAction::Exit,
        _ => SignalAction::Ignore,
    }
}

/// Decode a published signal record (spec §4.3: "raw signal record" —
/// reduced here to its 4-byte native-endian signal number, the only field
/// any reactor actually inspects).
pub fn decode_signal(payload: &[u8]) -> Option<i32> {
    let bytes: [u8; 4] = payload.get(0..4)?.try_into().ok()?;
    Some(i32::from_ne_bytes(bytes))
}

fn encode_signal(signum: i32) -> [u8; 4] {
    signum.to_ne_bytes()
}

/// Binds the PUB side and owns the listener thread. Must outlive every
/// worker reactor (spec §3: "its publisher socket is bound before any
/// worker subscribes").
pub struct SignalFanout {
    handle: Option<thread::JoinHandle<()>>,
}

impl SignalFanout {
    pub fn spawn(ctx: zmq::Context) -> Result<Self> {
        let publisher = ctx.socket(zmq::PUB)?;
        publisher.set_linger(0)?;
        publisher.bind(SIGNAL_ADDRESS)?;

        let mut signals = Signals::new(HANDLED_SIGNALS)?;
        let handle = thread::Builder::new()
            .name("signal-fanout".into())
            .spawn(move || {
                for signum in signals.forever() {
                    log::debug!("signal fanout observed signal {signum}");
                    if let Err(e) = publisher.send(&encode_signal(signum)[..], 0) {
                        log::warn!("signal fanout failed to publish: {e}");
                    }
                }
            })
            .map_err(std::io::Error::from)?;

        Ok(Self { handle: Some(handle) })
    }
}

impl Drop for SignalFanout {
    fn drop(&mut self) {
        // The listener thread runs `Signals::forever()`, which never returns
        // on its own; there is nothing to join from here. The OS reclaims it
        // at process exit, which is the only time this type is dropped.
        self.handle.take();
    }
}

/// A reactor's read side: subscribe with an empty filter, as every reactor
/// does (spec §4.3).
pub fn subscribe(ctx: &zmq::Context) -> Result<zmq::Socket> {
    let sub = ctx.socket(zmq::SUB)?;
    sub.set_linger(0)?;
    sub.connect(SIGNAL_ADDRESS)?;
    sub.set_subscribe(b"")?;
    Ok(sub)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_signals() {
        assert_eq!(classify(SIGINT), SignalAction::Terminate);
        assert_eq!(classify(SIGTERM), SignalAction::Terminate);
        assert_eq!(classify(SIGQUIT), SignalAction::Exit);
        assert_eq!(classify(SIGUSR1), SignalAction::Ignore);
    }

    #[test]
    fn signal_record_round_trips() {
        let encoded = encode_signal(SIGTERM);
        assert_eq!(decode_signal(&encoded), Some(SIGTERM));
    }

    #[test]
    fn truncated_record_fails_to_decode() {
        assert_eq!(decode_signal(&[1, 2]), None);
    }
}
