//! Streaming reassembler for accumulating partial socket reads.
//!
//! A socket delivers bytes at arbitrary chunk boundaries - one read may hold
//! less than one packet, exactly one, or parts of several. [`PacketBuffer`]
//! is the state machine that turns that stream back into packets:
//! `AwaitingPrefix` until 3 bytes reveal the declared length, then
//! `AwaitingBody` until the accumulation buffer reaches it, at which point
//! one packet is sliced off and the cycle restarts on whatever remains.
//!
//! ```
//! use obex_client::protocol::PacketBuffer;
//!
//! let mut buffer = PacketBuffer::new();
//! assert!(buffer.push(&[0x82, 0x00]).unwrap().is_empty());
//! let packets = buffer.push(&[0x06, 0x61, 0x62, 0x63]).unwrap();
//! assert_eq!(packets.len(), 1);
//! assert_eq!(packets[0].body(), b"abc");
//! ```

use bytes::BytesMut;

use crate::error::{ObexError, Result};
use crate::protocol::packet::Packet;
use crate::protocol::wire_format::{split_opcode, MAX_PACKET_SIZE, PACKET_PREFIX_SIZE};

/// Reassembly state.
#[derive(Debug, Clone, Copy)]
enum State {
    /// Waiting for the 3-byte opcode + length prefix.
    AwaitingPrefix,
    /// Prefix consumed; waiting for the rest of the declared length.
    AwaitingBody { raw_opcode: u8, declared: usize },
}

/// Buffer for accumulating incoming bytes and extracting complete packets.
///
/// The accumulation buffer is owned exclusively by this instance and never
/// aliases transport-layer buffers; bodies are handed out as frozen `Bytes`.
pub struct PacketBuffer {
    buffer: BytesMut,
    state: State,
    max_packet_size: usize,
}

impl PacketBuffer {
    /// Create a reassembler accepting any length the 16-bit field can
    /// declare.
    pub fn new() -> Self {
        Self::with_max_packet_size(MAX_PACKET_SIZE)
    }

    /// Create a reassembler that rejects packets declaring more than
    /// `max_packet_size` bytes, e.g. the maximum packet length advertised to
    /// the peer during Connect.
    pub fn with_max_packet_size(max_packet_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(4 * 1024),
            state: State::AwaitingPrefix,
            max_packet_size,
        }
    }

    /// Append a chunk and extract every packet it completes.
    ///
    /// Returns an empty vector while more data is needed. Fails with
    /// [`ObexError::MalformedPacket`] when a prefix declares a length below
    /// the 3-byte minimum or above the configured ceiling; bytes not yet
    /// consumed are left in place.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Packet>> {
        self.buffer.extend_from_slice(data);

        let mut packets = Vec::new();
        while let Some(packet) = self.try_extract_one()? {
            packets.push(packet);
        }
        Ok(packets)
    }

    /// Try to slice one complete packet off the front of the buffer.
    fn try_extract_one(&mut self) -> Result<Option<Packet>> {
        match self.state {
            State::AwaitingPrefix => {
                if self.buffer.len() < PACKET_PREFIX_SIZE {
                    return Ok(None);
                }

                let raw_opcode = self.buffer[0];
                let declared = u16::from_be_bytes([self.buffer[1], self.buffer[2]]) as usize;
                if declared < PACKET_PREFIX_SIZE {
                    return Err(ObexError::MalformedPacket(format!(
                        "declared packet length {declared} is below the 3-byte minimum"
                    )));
                }
                if declared > self.max_packet_size {
                    return Err(ObexError::MalformedPacket(format!(
                        "declared packet length {declared} exceeds the {} byte ceiling",
                        self.max_packet_size
                    )));
                }

                let _ = self.buffer.split_to(PACKET_PREFIX_SIZE);
                self.state = State::AwaitingBody {
                    raw_opcode,
                    declared,
                };
                self.try_extract_one()
            }

            State::AwaitingBody {
                raw_opcode,
                declared,
            } => {
                let body_len = declared - PACKET_PREFIX_SIZE;
                if self.buffer.len() < body_len {
                    return Ok(None);
                }

                let body = self.buffer.split_to(body_len).freeze();
                self.state = State::AwaitingPrefix;

                let (opcode, is_final) = split_opcode(raw_opcode);
                Ok(Some(Packet::from_parts(opcode, is_final, body)))
            }
        }
    }

    /// Number of buffered, not-yet-consumed bytes.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Whether nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty() && matches!(self.state, State::AwaitingPrefix)
    }

    /// Discard all buffered bytes and return to `AwaitingPrefix`.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::AwaitingPrefix;
    }
}

impl Default for PacketBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn make_packet_bytes(raw_opcode: u8, body: &[u8]) -> Vec<u8> {
        let (opcode, is_final) = split_opcode(raw_opcode);
        Packet::new(opcode, is_final, Bytes::copy_from_slice(body))
            .unwrap()
            .encode()
    }

    #[test]
    fn test_single_complete_packet() {
        let mut buffer = PacketBuffer::new();
        let bytes = make_packet_bytes(0xA0, &[0x10, 0x00, 0xFF, 0xFF]);

        let packets = buffer.push(&bytes).unwrap();

        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].raw_opcode(), 0xA0);
        assert_eq!(packets[0].body(), &[0x10, 0x00, 0xFF, 0xFF]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_multiple_packets_in_one_push() {
        let mut buffer = PacketBuffer::new();
        let mut combined = make_packet_bytes(0x90, b"first");
        combined.extend(make_packet_bytes(0x90, b"second"));
        combined.extend(make_packet_bytes(0xA0, b""));

        let packets = buffer.push(&combined).unwrap();

        assert_eq!(packets.len(), 3);
        assert_eq!(packets[0].body(), b"first");
        assert_eq!(packets[1].body(), b"second");
        assert!(packets[2].body().is_empty());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_fragmented_prefix() {
        let mut buffer = PacketBuffer::new();
        let bytes = make_packet_bytes(0xA0, b"test");

        assert!(buffer.push(&bytes[..2]).unwrap().is_empty());
        let packets = buffer.push(&bytes[2..]).unwrap();

        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].body(), b"test");
    }

    #[test]
    fn test_fragmented_body() {
        let mut buffer = PacketBuffer::new();
        let bytes = make_packet_bytes(0xA0, b"a longer body that arrives in pieces");

        assert!(buffer.push(&bytes[..PACKET_PREFIX_SIZE + 5]).unwrap().is_empty());
        let packets = buffer.push(&bytes[PACKET_PREFIX_SIZE + 5..]).unwrap();

        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].body(), b"a longer body that arrives in pieces");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_three_chunk_connect_response() {
        // One 10-byte packet delivered as chunks of 1, 2, and the remainder.
        let mut buffer = PacketBuffer::new();
        let bytes = make_packet_bytes(0xA0, &[0x10, 0x00, 0xFF, 0xFF, 0x05, 0x00, 0x03]);
        assert_eq!(bytes.len(), 10);

        assert!(buffer.push(&bytes[..1]).unwrap().is_empty());
        assert!(buffer.push(&bytes[1..3]).unwrap().is_empty());
        let packets = buffer.push(&bytes[3..]).unwrap();

        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].raw_opcode(), 0xA0);
        assert_eq!(packets[0].wire_len(), 10);
        assert_eq!(packets[0].body(), &[0x10, 0x00, 0xFF, 0xFF, 0x05, 0x00, 0x03]);
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut buffer = PacketBuffer::new();
        let bytes = make_packet_bytes(0x82, b"hi");

        let mut all = Vec::new();
        for byte in &bytes {
            all.extend(buffer.push(&[*byte]).unwrap());
        }

        assert_eq!(all.len(), 1);
        assert_eq!(all[0].raw_opcode(), 0x82);
        assert_eq!(all[0].body(), b"hi");
    }

    #[test]
    fn test_empty_body_packet() {
        let mut buffer = PacketBuffer::new();
        let packets = buffer.push(&[0x81, 0x00, 0x03]).unwrap();

        assert_eq!(packets.len(), 1);
        assert!(packets[0].body().is_empty());
        assert!(packets[0].is_final());
    }

    #[test]
    fn test_mixed_complete_and_partial() {
        let mut buffer = PacketBuffer::new();
        let first = make_packet_bytes(0x90, b"one");
        let second = make_packet_bytes(0xA0, b"two");

        let mut data = first;
        data.extend_from_slice(&second[..4]);

        let packets = buffer.push(&data).unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].body(), b"one");
        assert!(!buffer.is_empty());

        let packets = buffer.push(&second[4..]).unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].body(), b"two");
    }

    #[test]
    fn test_declared_length_below_minimum_fails() {
        let mut buffer = PacketBuffer::new();
        let err = buffer.push(&[0xA0, 0x00, 0x02]).unwrap_err();
        assert!(matches!(err, ObexError::MalformedPacket(_)));
        // The offending bytes were not consumed.
        assert_eq!(buffer.buffered(), 3);
    }

    #[test]
    fn test_declared_length_above_ceiling_fails() {
        let mut buffer = PacketBuffer::with_max_packet_size(16);
        let err = buffer.push(&[0xA0, 0x00, 0x20]).unwrap_err();
        assert!(matches!(err, ObexError::MalformedPacket(_)));
    }

    #[test]
    fn test_clear_resets_state() {
        let mut buffer = PacketBuffer::new();
        let bytes = make_packet_bytes(0xA0, b"payload");

        // Stop inside the body so the state machine is mid-packet.
        buffer.push(&bytes[..5]).unwrap();
        assert!(!buffer.is_empty());

        buffer.clear();
        assert!(buffer.is_empty());

        // A fresh packet parses cleanly after the reset.
        let packets = buffer.push(&bytes).unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].body(), b"payload");
    }

    #[test]
    fn test_fragmentation_invariance() {
        // Splitting the byte stream at every boundary yields the same packets
        // as one contiguous push.
        let mut stream = make_packet_bytes(0x90, b"alpha");
        stream.extend(make_packet_bytes(0xA0, &[0x10, 0x00, 0x20, 0x00]));

        let expected = PacketBuffer::new().push(&stream).unwrap();
        assert_eq!(expected.len(), 2);

        for split in 0..=stream.len() {
            let mut buffer = PacketBuffer::new();
            let mut packets = buffer.push(&stream[..split]).unwrap();
            packets.extend(buffer.push(&stream[split..]).unwrap());
            assert_eq!(packets, expected, "split at {split}");
            assert!(buffer.is_empty());
        }
    }
}
