//! KISS framing (spec §3, §4.1, §8): a streaming encoder/decoder that turns
//! arbitrary byte payloads into self-delimiting frames over a lossy octet
//! stream, with a resynchronising decoder.
//!
//! Implemented as a [`tokio_util::codec`] `Encoder`/`Decoder` pair so the
//! same state machine runs both inside the bridge reactor's manual buffers
//! and (if ever needed) behind a `Framed` adapter.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{BridgeError, Result};

pub const FEND: u8 = 0xC0;
pub const FESC: u8 = 0xDB;
pub const TFEND: u8 = 0xDC;
pub const TFESC: u8 = 0xDD;

/// Stateful encoder. `open`/`close`/`write` mirror the low-level operations
/// from spec §4.1; `encode_packet` is the common case.
#[derive(Debug, Default)]
pub struct KissEncoder {
    open: bool,
}

impl KissEncoder {
    pub fn new() -> Self {
        Self { open: false }
    }

    pub fn open(&mut self, sink: &mut BytesMut) -> Result<()> {
        if self.open {
            return Err(BridgeError::Logic("KissEncoder::open called while already open".into()));
        }
        sink.put_u8(FEND);
        self.open = true;
        Ok(())
    }

    pub fn close(&mut self, sink: &mut BytesMut) -> Result<()> {
        if !self.open {
            return Err(BridgeError::Logic("KissEncoder::close called while not open".into()));
        }
        sink.put_u8(FEND);
        self.open = false;
        Ok(())
    }

    pub fn write(&mut self, byte: u8, sink: &mut BytesMut) {
        match byte {
            FEND => {
                sink.put_u8(FESC);
                sink.put_u8(TFEND);
            }
            FESC => {
                sink.put_u8(FESC);
                sink.put_u8(TFESC);
            }
            other => sink.put_u8(other),
        }
    }

    pub fn write_range(&mut self, bytes: &[u8], sink: &mut BytesMut) {
        for &b in bytes {
            self.write(b, sink);
        }
    }

    /// `open`; `write_range`; `close` — the common case of emitting one
    /// complete packet.
    pub fn encode_packet(&mut self, packet: &[u8], sink: &mut BytesMut) -> Result<()> {
        self.open(sink)?;
        self.write_range(packet, sink);
        self.close(sink)?;
        Ok(())
    }
}

impl Encoder<&[u8]> for KissEncoder {
    type Error = BridgeError;

    fn encode(&mut self, item: &[u8], dst: &mut BytesMut) -> Result<()> {
        self.encode_packet(item, dst)
    }
}

impl Encoder<Vec<u8>> for KissEncoder {
    type Error = BridgeError;

    fn encode(&mut self, item: Vec<u8>, dst: &mut BytesMut) -> Result<()> {
        self.encode_packet(&item, dst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Active,
    ActiveEscape,
    Error,
}

/// Four-state decoder (spec §4.1). `max_packet_length` bounds the packet
/// buffer; overflow transitions to `Error` and discards silently.
#[derive(Debug)]
pub struct KissDecoder {
    max_packet_length: usize,
    state: State,
    packet: Vec<u8>,
}

impl KissDecoder {
    pub fn new(max_packet_length: usize) -> Self {
        Self {
            max_packet_length,
            state: State::Idle,
            packet: Vec::new(),
        }
    }

    fn push_byte(&mut self, byte: u8) {
        if self.packet.len() == self.max_packet_length {
            log::debug!("KISS packet exceeded max_packet_length={}, discarding", self.max_packet_length);
            self.state = State::Error;
            self.packet.clear();
        } else {
            self.packet.push(byte);
        }
    }
}

impl Decoder for KissDecoder {
    type Item = Vec<u8>;
    type Error = BridgeError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Vec<u8>>> {
        let mut consumed = 0usize;
        let mut emitted = None;

        for &byte in src.iter() {
            consumed += 1;

            if self.state == State::Error && byte == FEND {
                self.state = State::Idle;
            }

            if self.state == State::Idle {
                if byte != FEND {
                    self.state = State::Active;
                    self.packet.clear();
                } else {
                    continue;
                }
            }

            if self.state == State::Active {
                if byte == FESC {
                    self.state = State::ActiveEscape;
                } else if byte == FEND {
                    self.state = State::Idle;
                    emitted = Some(std::mem::take(&mut self.packet));
                    break;
                } else {
                    self.push_byte(byte);
                }
            } else if self.state == State::ActiveEscape {
                match byte {
                    TFEND => {
                        self.state = State::Active;
                        self.push_byte(FEND);
                    }
                    TFESC => {
                        self.state = State::Active;
                        self.push_byte(FESC);
                    }
                    _ => {
                        log::debug!("KISS decoder saw invalid escape sequence, resynchronising");
                        self.state = State::Error;
                        self.packet.clear();
                    }
                }
            }
        }

        src.advance(consumed);
        Ok(emitted)
    }

    /// A partial frame still assembling at end-of-stream is simply dropped —
    /// the serial link is lossy by design (spec §9 Non-goals), there is no
    /// "unexpected EOF" error to raise.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Vec<u8>>> {
        self.decode(src)
    }
}

/// Feed every available byte through `decoder`, calling `emit` for each
/// completed packet. Mirrors spec §4.1's `decode_all`.
pub fn decode_all(decoder: &mut KissDecoder, src: &mut BytesMut, mut emit: impl FnMut(Vec<u8>)) -> Result<()> {
    while !src.is_empty() {
        match decoder.decode(src)? {
            Some(packet) => emit(packet),
            None => break,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_one(packet: &[u8]) -> BytesMut {
        let mut sink = BytesMut::new();
        let mut enc = KissEncoder::new();
        enc.encode_packet(packet, &mut sink).unwrap();
        sink
    }

    fn decode_all_owned(max: usize, bytes: &[u8]) -> Vec<Vec<u8>> {
        let mut dec = KissDecoder::new(max);
        let mut buf = BytesMut::from(bytes);
        let mut out = Vec::new();
        decode_all(&mut dec, &mut buf, |p| out.push(p)).unwrap();
        out
    }

    #[test]
    fn single_small_packet_round_trip() {
        let packet = [0x00u8, 0xC0, 0xDB, 0xFF];
        let encoded = encode_one(&packet);
        assert_eq!(&encoded[..], &[0xC0, 0x00, 0xDB, 0xDC, 0xDB, 0xDD, 0xFF, 0xC0]);
        let decoded = decode_all_owned(1024, &encoded);
        assert_eq!(decoded, vec![packet.to_vec()]);
    }

    #[test]
    fn empty_packet_round_trip() {
        let encoded = encode_one(&[]);
        assert_eq!(&encoded[..], &[0xC0, 0xC0]);
        let decoded = decode_all_owned(1024, &encoded);
        assert_eq!(decoded, vec![Vec::<u8>::new()]);
    }

    #[test]
    fn oversize_packet_is_dropped_and_resyncs() {
        // max = 4; the first frame is 5 bytes and must be discarded, the
        // second is a single 0x0A byte that must still be delivered.
        let bytes = [0xC0, 0x01, 0x02, 0x03, 0x04, 0x05, 0xC0, 0xC0, 0x0A, 0xC0];
        let decoded = decode_all_owned(4, &bytes);
        assert_eq!(decoded, vec![vec![0x0Au8]]);
    }

    #[test]
    fn escape_byte_neutrality_for_every_value() {
        for b in 0u16..=255 {
            let b = b as u8;
            let packet = vec![b, b, b];
            let encoded = encode_one(&packet);
            let decoded = decode_all_owned(1024, &encoded);
            assert_eq!(decoded, vec![packet], "byte {b:#x} did not round-trip");
        }
    }

    #[test]
    fn multiple_packets_concatenated() {
        let mut sink = BytesMut::new();
        let mut enc = KissEncoder::new();
        enc.encode_packet(b"abc", &mut sink).unwrap();
        enc.encode_packet(b"de", &mut sink).unwrap();
        enc.encode_packet(b"", &mut sink).unwrap();
        let decoded = decode_all_owned(1024, &sink);
        assert_eq!(decoded, vec![b"abc".to_vec(), b"de".to_vec(), b"".to_vec()]);
    }

    #[test]
    fn fend_runs_are_idempotent_at_boundaries() {
        let one = decode_all_owned(1024, &[0xC0, 0x01, 0xC0]);
        for n in 1..8 {
            let mut bytes = vec![0xC0u8; n];
            bytes.push(0x01);
            bytes.extend(std::iter::repeat(0xC0u8).take(n));
            assert_eq!(decode_all_owned(1024, &bytes), one, "N={n} FEND run changed output");
        }
    }

    #[test]
    fn feeding_byte_at_a_time_still_decodes() {
        let encoded = encode_one(b"hello");
        let mut dec = KissDecoder::new(1024);
        let mut out = Vec::new();
        for &b in encoded.iter() {
            let mut one = BytesMut::from(&[b][..]);
            if let Some(p) = dec.decode(&mut one).unwrap() {
                out.push(p);
            }
        }
        assert_eq!(out, vec![b"hello".to_vec()]);
    }

    #[test]
    fn malformed_escape_discards_and_resyncs() {
        // FESC followed by a byte that is neither TFEND nor TFESC.
        let bytes = [0xC0, 0x01, 0xDB, 0xFF, 0xC0, 0xC0, 0x02, 0xC0];
        let decoded = decode_all_owned(1024, &bytes);
        assert_eq!(decoded, vec![vec![0x02u8]]);
    }

    #[test]
    fn flag_byte_only_packet_is_valid() {
        // A single-byte payload (just the flag byte) must still decode.
        let decoded = decode_all_owned(1024, &encode_one(&[0x00]));
        assert_eq!(decoded, vec![vec![0u8]]);
    }
}
