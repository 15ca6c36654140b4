//! Bridge reactor (C5, spec §4.5): splices a serial device (or loopback) to
//! a ROUTER/DEALER pair, preserving MORE and REPLY flags across the KISS
//! framing on the wire.
//!
//! Only one client identity is tracked for ROUTER replies — the bridge
//! serves a single serial link, so "the last client to send us something"
//! is the only sensible reply target. See `DESIGN.md` for the trade-off
//! this implies for multiple simultaneous clients.

use std::collections::VecDeque;

use bytes::BytesMut;

use crate::config::BridgeArgs;
use crate::error::Result;
use crate::kiss::{KissDecoder, KissEncoder};
use crate::reactor::{ReactorCore, ReadyFlags};
use crate::serial::Serial;

const SERIAL_CHUNK: usize = 64 * 1024;

const MORE: u8 = 0x01;
const REPLY: u8 = 0x02;

fn tag(payload: &[u8], more: bool, reply: bool) -> Vec<u8> {
    let mut framed = Vec::with_capacity(payload.len() + 1);
    let mut flag = 0u8;
    if more {
        flag |= MORE;
    }
    if reply {
        flag |= REPLY;
    }
    framed.push(flag);
    framed.extend_from_slice(payload);
    framed
}

fn untag(frame: &[u8]) -> (bool, bool, &[u8]) {
    let flag = frame.first().copied().unwrap_or(0);
    (flag & MORE != 0, flag & REPLY != 0, frame.get(1..).unwrap_or(&[]))
}

struct OutboundQueue {
    packets: VecDeque<(Vec<u8>, bool)>,
}

impl OutboundQueue {
    fn new() -> Self {
        Self { packets: VecDeque::new() }
    }

    fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }
}

pub struct BridgeReactor {
    serial: Option<Serial>,
    router: zmq::Socket,
    dealer: zmq::Socket,
    encoder: KissEncoder,
    decoder: KissDecoder,
    serial_tx: BytesMut,
    serial_rx: BytesMut,
    client_out: OutboundQueue,
    server_out: OutboundQueue,
    last_client_identity: Option<Vec<u8>>,
    client_tx_mid_message: bool,
}

impl BridgeReactor {
    pub fn new(ctx: &zmq::Context, args: &BridgeArgs) -> Result<Self> {
        let router = ctx.socket(zmq::ROUTER)?;
        router.set_linger(0)?;
        router.bind(&args.client_url)?;

        let dealer = ctx.socket(zmq::DEALER)?;
        dealer.set_linger(0)?;
        dealer.bind(&args.server_url)?;

        let serial = match &args.device {
            Some(device) if !device.is_empty() => {
                log::info!("opening serial device {device} at {} baud", args.baud);
                Some(Serial::open(device, args.baud)?)
            }
            _ => {
                log::info!("no device configured, running in loopback mode");
                None
            }
        };

        Ok(Self {
            serial,
            router,
            dealer,
            encoder: KissEncoder::new(),
            decoder: KissDecoder::new(args.max_packet_size),
            serial_tx: BytesMut::new(),
            serial_rx: BytesMut::new(),
            client_out: OutboundQueue::new(),
            server_out: OutboundQueue::new(),
            last_client_identity: None,
            client_tx_mid_message: false,
        })
    }

    /// Pull one multipart message from `socket` (identity frame already
    /// stripped by the caller for ROUTER), tag each remaining frame with
    /// MORE (from the wire) and `reply` (fixed per direction), KISS-encode,
    /// append to the serial TX buffer.
    fn forward_message_to_serial(&mut self, frames: Vec<Vec<u8>>, reply: bool) -> Result<()> {
        let last = frames.len().saturating_sub(1);
        for (i, frame) in frames.into_iter().enumerate() {
            let framed = tag(&frame, i != last, reply);
            self.encoder.encode_packet(&framed, &mut self.serial_tx)?;
        }
        Ok(())
    }

    /// One message per iteration (spec §4.5 edge cases: client-facing is
    /// drained first, one message at a time, for fairness).
    fn drain_router(&mut self) -> Result<()> {
        let identity = match self.router.recv_bytes(zmq::DONTWAIT) {
            Ok(bytes) => bytes,
            Err(zmq::Error::EAGAIN) => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        self.last_client_identity = Some(identity);

        let mut frames = Vec::new();
        while self.router.get_rcvmore()? {
            frames.push(self.router.recv_bytes(0)?);
        }
        self.forward_message_to_serial(frames, false)
    }

    fn drain_dealer(&mut self) -> Result<()> {
        let first = match self.dealer.recv_bytes(zmq::DONTWAIT) {
            Ok(bytes) => bytes,
            Err(zmq::Error::EAGAIN) => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        let mut frames = vec![first];
        while self.dealer.get_rcvmore()? {
            frames.push(self.dealer.recv_bytes(0)?);
        }
        self.forward_message_to_serial(frames, true)
    }

    fn write_serial(&mut self) -> Result<()> {
        let Some(serial) = self.serial.as_mut() else {
            return Ok(());
        };
        if self.serial_tx.is_empty() {
            return Ok(());
        }
        let chunk_len = self.serial_tx.len().min(SERIAL_CHUNK);
        let written = serial.write_nonblocking(&self.serial_tx[..chunk_len])?;
        if written > 0 {
            let _ = self.serial_tx.split_to(written);
        }
        Ok(())
    }

    fn read_serial_or_loopback(&mut self) -> Result<()> {
        match self.serial.as_mut() {
            None => {
                // Loopback (spec §3): TX deque is moved into the RX buffer.
                if !self.serial_tx.is_empty() {
                    let looped = self.serial_tx.split();
                    self.serial_rx.extend_from_slice(&looped);
                }
            }
            Some(serial) => {
                let mut chunk = [0u8; SERIAL_CHUNK];
                let n = serial.read_nonblocking(&mut chunk)?;
                if n > 0 {
                    self.serial_rx.extend_from_slice(&chunk[..n]);
                }
            }
        }

        let client_out = &mut self.client_out;
        let server_out = &mut self.server_out;
        crate::kiss::decode_all(&mut self.decoder, &mut self.serial_rx, |packet| {
            let (more, reply, payload) = untag(&packet);
            if reply {
                client_out.packets.push_back((payload.to_vec(), more));
            } else {
                server_out.packets.push_back((payload.to_vec(), more));
            }
        })
    }

    fn write_router(&mut self) -> Result<()> {
        let Some((payload, more)) = self.client_out.packets.pop_front() else {
            return Ok(());
        };
        let Some(identity) = self.last_client_identity.clone() else {
            log::warn!("dropping reply: no client has connected yet");
            return Ok(());
        };
        if !self.client_tx_mid_message {
            self.router.send(identity, zmq::SNDMORE)?;
        }
        let flags = if more { zmq::SNDMORE } else { 0 };
        self.router.send(payload, flags)?;
        self.client_tx_mid_message = more;
        Ok(())
    }

    fn write_dealer(&mut self) -> Result<()> {
        let Some((payload, more)) = self.server_out.packets.pop_front() else {
            return Ok(());
        };
        let flags = if more { zmq::SNDMORE } else { 0 };
        self.dealer.send(payload, flags)?;
        Ok(())
    }
}

impl crate::reactor::Reactor for BridgeReactor {
    fn poll_items(&self) -> Vec<zmq::PollItem<'_>> {
        let mut items = Vec::with_capacity(3);

        let mut router_events = zmq::POLLIN;
        if !self.client_out.is_empty() {
            router_events |= zmq::POLLOUT;
        }
        items.push(self.router.as_poll_item(router_events));

        let mut dealer_events = zmq::POLLIN;
        if !self.server_out.is_empty() {
            dealer_events |= zmq::POLLOUT;
        }
        items.push(self.dealer.as_poll_item(dealer_events));

        if let Some(serial) = &self.serial {
            let mut serial_events = zmq::POLLIN;
            if !self.serial_tx.is_empty() {
                serial_events |= zmq::POLLOUT;
            }
            items.push(zmq::PollItem::from_fd(serial.as_raw_fd(), serial_events));
        }

        items
    }

    fn handle_events(&mut self, revents: &[ReadyFlags]) -> Result<()> {
        let router_ready = revents.first().copied().unwrap_or_default();
        let dealer_ready = revents.get(1).copied().unwrap_or_default();
        let serial_ready = revents.get(2).copied();

        if router_ready.readable {
            self.drain_router()?;
        }
        if dealer_ready.readable {
            self.drain_dealer()?;
        }

        if self.serial.is_some() {
            if serial_ready.map(|r| r.writable).unwrap_or(false) {
                self.write_serial()?;
            }
            if serial_ready.map(|r| r.readable).unwrap_or(false) {
                self.read_serial_or_loopback()?;
            }
        } else {
            // Loopback has no fd to wait on; drive it every iteration.
            self.read_serial_or_loopback()?;
        }

        if router_ready.writable {
            self.write_router()?;
        }
        if dealer_ready.writable {
            self.write_dealer()?;
        }

        Ok(())
    }

    fn drained(&self) -> bool {
        self.serial_tx.is_empty()
            && self.serial_rx.is_empty()
            && self.client_out.is_empty()
            && self.server_out.is_empty()
    }
}

pub fn run(ctx: zmq::Context, args: &BridgeArgs) -> Result<bool> {
    args.validate()?;
    let mut core = ReactorCore::new(&ctx)?;
    let mut reactor = BridgeReactor::new(&ctx, args)?;
    core.run(&mut reactor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_untag_round_trip() {
        let framed = tag(b"hello", true, false);
        assert_eq!(framed[0], MORE);
        let (more, reply, payload) = untag(&framed);
        assert!(more);
        assert!(!reply);
        assert_eq!(payload, b"hello");
    }

    #[test]
    fn reply_direction_is_fixed_by_flag_bit() {
        let from_server = tag(b"x", false, true);
        let (_, reply, _) = untag(&from_server);
        assert!(reply);
        let from_client = tag(b"x", false, false);
        let (_, reply, _) = untag(&from_client);
        assert!(!reply);
    }

    #[test]
    fn empty_payload_is_a_valid_flag_only_frame() {
        let framed = tag(&[], false, true);
        assert_eq!(framed.len(), 1);
        let (more, reply, payload) = untag(&framed);
        assert!(!more);
        assert!(reply);
        assert!(payload.is_empty());
    }
}
