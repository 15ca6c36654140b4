//! Envelope protocol (C2, spec §4.2): four NUL-terminated labels plus one or
//! more data parts, carried as ordinary multipart messages over a DEALER
//! socket connected to the bridge's ROUTER/DEALER fabric (spec §6 variant B).
//!
//! `target` addresses the remote; `host` identifies the sender. Subscription
//! filtering (spec's PUB/SUB framing of this same protocol) degenerates to
//! an explicit equality check here because ROUTER/DEALER already does
//! point-to-point delivery — kept anyway so the wire shape matches spec.

use crate::error::{BridgeError, Result};

pub const LABEL_DELIMITER: u8 = 0u8;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    pub remote: String,
    pub session: String,
    pub command: String,
}

impl Envelope {
    pub fn new(remote: impl Into<String>, session: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            remote: remote.into(),
            session: session.into(),
            command: command.into(),
        }
    }
}

fn encode_label(label: &str) -> Result<Vec<u8>> {
    if label.is_empty() {
        // User-visible misconfiguration (spec §7), not a recoverable wire
        // condition — an empty label never reaches the other side at all.
        return Err(BridgeError::Config("empty label".into()));
    }
    let mut bytes = Vec::with_capacity(label.len() + 1);
    bytes.extend_from_slice(label.as_bytes());
    bytes.push(LABEL_DELIMITER);
    Ok(bytes)
}

fn decode_label(bytes: &[u8]) -> Option<String> {
    let (&last, rest) = bytes.split_last()?;
    if last != LABEL_DELIMITER {
        return None;
    }
    std::str::from_utf8(rest).ok().map(str::to_string)
}

/// One connected endpoint of the envelope protocol. Wraps a `zmq::DEALER`
/// socket so it works uniformly whether the peer is the bridge's ROUTER
/// (client-facing) or its DEALER (server-facing).
pub struct Socket {
    host: String,
    socket: zmq::Socket,
}

impl Socket {
    pub fn connect(ctx: &zmq::Context, host: impl Into<String>, url: &str) -> Result<Self> {
        let socket = ctx.socket(zmq::DEALER)?;
        socket.set_linger(0)?;
        socket.connect(url)?;
        Ok(Self { host: host.into(), socket })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn raw(&self) -> &zmq::Socket {
        &self.socket
    }

    /// Single-part send: the common case.
    pub fn send(&self, envelope: &Envelope, data: &[u8]) -> Result<()> {
        self.send_stream(envelope, std::iter::once((data, false)))
    }

    /// Streaming send: every yielded `(part, more)` pair is sent in order,
    /// MORE set on every part but the last.
    pub fn send_stream<'a>(&self, envelope: &Envelope, parts: impl IntoIterator<Item = (&'a [u8], bool)>) -> Result<()> {
        self.socket.send(encode_label(&envelope.remote)?, zmq::SNDMORE)?;
        self.socket.send(encode_label(&self.host)?, zmq::SNDMORE)?;
        self.socket.send(encode_label(&envelope.session)?, zmq::SNDMORE)?;
        self.socket.send(encode_label(&envelope.command)?, zmq::SNDMORE)?;

        let mut iter = parts.into_iter().peekable();
        if iter.peek().is_none() {
            self.socket.send(&[][..], 0)?;
            return Ok(());
        }
        while let Some((part, more)) = iter.next() {
            let flags = if more { zmq::SNDMORE } else { 0 };
            self.socket.send(part, flags)?;
        }
        Ok(())
    }

    /// Single-part recv. Returns `Ok(None)` if the message was malformed or
    /// not addressed to this host (spec §4.2: "drain and return false").
    pub fn recv(&self) -> Result<Option<(Envelope, Vec<u8>)>> {
        let mut data = Vec::new();
        let envelope = match self.recv_stream(|part, _more| data = part)? {
            Some(e) => e,
            None => return Ok(None),
        };
        Ok(Some((envelope, data)))
    }

    /// Streaming recv: `consumer` is invoked once per data part with
    /// `(bytes, more)`. Returns `Ok(None)` on a target mismatch or malformed
    /// envelope, having drained the rest of the message first.
    pub fn recv_stream(&self, mut consumer: impl FnMut(Vec<u8>, bool)) -> Result<Option<Envelope>> {
        let target = match self.recv_label()? {
            Some(l) => l,
            None => {
                self.drain();
                return Ok(None);
            }
        };
        if target != self.host {
            log::debug!("envelope addressed to \"{target}\", not \"{}\" — dropping", self.host);
            self.drain();
            return Ok(None);
        }

        let remote = match self.recv_label()? {
            Some(l) => l,
            None => {
                self.drain();
                return Ok(None);
            }
        };
        let session = match self.recv_label()? {
            Some(l) => l,
            None => {
                self.drain();
                return Ok(None);
            }
        };
        let command = match self.recv_label()? {
            Some(l) => l,
            None => {
                self.drain();
                return Ok(None);
            }
        };

        loop {
            let msg = self.socket.recv_msg(0)?;
            let more = self.socket.get_rcvmore()?;
            consumer(msg.to_vec(), more);
            if !more {
                break;
            }
        }

        Ok(Some(Envelope::new(remote, session, command)))
    }

    fn recv_label(&self) -> Result<Option<String>> {
        let msg = self.socket.recv_msg(0)?;
        let more = self.socket.get_rcvmore()?;
        if !more {
            return Ok(None);
        }
        Ok(decode_label(&msg))
    }

    fn drain(&self) {
        while self.socket.get_rcvmore().unwrap_or(false) {
            if self.socket.recv_msg(0).is_err() {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_round_trips() {
        let encoded = encode_label("hello").unwrap();
        assert_eq!(encoded, b"hello\0");
        assert_eq!(decode_label(&encoded), Some("hello".to_string()));
    }

    #[test]
    fn empty_label_is_illegal() {
        assert!(encode_label("").is_err());
    }

    #[test]
    fn label_without_trailing_delimiter_is_rejected() {
        assert_eq!(decode_label(b"hello"), None);
    }

    #[test]
    fn envelope_construction() {
        let e = Envelope::new("srv", "s1", "msg");
        assert_eq!(e.remote, "srv");
        assert_eq!(e.session, "s1");
        assert_eq!(e.command, "msg");
    }
}
