//! The framed unit of the wire protocol.
//!
//! A [`Packet`] is one opcode + length + body frame. The final flag lives in
//! bit 7 of the opcode byte and the length field is derived from the body at
//! encode time, never stored: `wire_len() == 3 + body.len()` always holds.
//!
//! ```
//! use bytes::Bytes;
//! use obex_client::protocol::Packet;
//! use obex_client::protocol::wire_format::opcode;
//!
//! let packet = Packet::new(opcode::PUT, true, Bytes::from_static(b"abc")).unwrap();
//! let encoded = packet.encode();
//! assert_eq!(encoded, [0x82, 0x00, 0x06, 0x61, 0x62, 0x63]);
//! assert_eq!(Packet::decode(&encoded).unwrap(), packet);
//! ```

use bytes::Bytes;

use crate::buffer::ByteBuffer;
use crate::error::{ObexError, Result};
use crate::protocol::header::HeaderList;
use crate::protocol::wire_format::{
    merge_opcode, split_opcode, FINAL_BIT, MAX_PACKET_SIZE, PACKET_PREFIX_SIZE,
};

/// A complete OBEX packet.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    /// 7-bit operation code, final bit stripped.
    opcode: u8,
    /// The final-packet flag, bit 7 of the raw opcode byte.
    is_final: bool,
    /// Packet body (zero-copy via `bytes::Bytes`).
    body: Bytes,
}

impl Packet {
    /// Create a packet. Fails with [`ObexError::MalformedPacket`] if the body
    /// would overflow the 16-bit packet length field.
    pub fn new(opcode: u8, is_final: bool, body: Bytes) -> Result<Self> {
        if PACKET_PREFIX_SIZE + body.len() > MAX_PACKET_SIZE {
            return Err(ObexError::MalformedPacket(format!(
                "body of {} bytes overflows the 16-bit packet length field",
                body.len()
            )));
        }
        Ok(Self {
            opcode: opcode & !FINAL_BIT,
            is_final,
            body,
        })
    }

    /// Construct from parts the reassembler has already validated.
    pub(crate) fn from_parts(opcode: u8, is_final: bool, body: Bytes) -> Self {
        Self {
            opcode,
            is_final,
            body,
        }
    }

    /// The 7-bit operation code.
    #[inline]
    pub fn opcode(&self) -> u8 {
        self.opcode
    }

    /// Whether the final-packet flag is set.
    #[inline]
    pub fn is_final(&self) -> bool {
        self.is_final
    }

    /// The raw opcode byte as it appears on the wire.
    #[inline]
    pub fn raw_opcode(&self) -> u8 {
        merge_opcode(self.opcode, self.is_final)
    }

    /// Total packet size including the 3-byte prefix.
    #[inline]
    pub fn wire_len(&self) -> u16 {
        (PACKET_PREFIX_SIZE + self.body.len()) as u16
    }

    /// Borrow the body bytes.
    #[inline]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Cheap clone of the body.
    #[inline]
    pub fn body_bytes(&self) -> Bytes {
        self.body.clone()
    }

    /// Decode the entire body as a header list. Only valid for packets whose
    /// body carries no fixed data prefix (everything except Connect).
    pub fn headers(&self) -> Result<HeaderList> {
        HeaderList::decode(&self.body)
    }

    /// Serialize to wire bytes: raw opcode, big-endian length, body.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(PACKET_PREFIX_SIZE + self.body.len());
        buf.push(self.raw_opcode());
        buf.extend_from_slice(&self.wire_len().to_be_bytes());
        buf.extend_from_slice(&self.body);
        buf
    }

    /// Parse one packet from an already-assembled byte run.
    ///
    /// Bytes past the declared length are ignored; use
    /// [`PacketBuffer`](crate::protocol::PacketBuffer) to split a stream into
    /// consecutive packets.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let view = ByteBuffer::new(buf);
        if view.capacity() < PACKET_PREFIX_SIZE {
            return Err(ObexError::MalformedPacket(format!(
                "{} bytes is shorter than the 3-byte packet prefix",
                view.capacity()
            )));
        }
        let raw = view.u8_at(0)?;
        let declared = view.u16_be_at(1)? as usize;
        if declared < PACKET_PREFIX_SIZE {
            return Err(ObexError::MalformedPacket(format!(
                "declared packet length {declared} is below the 3-byte minimum"
            )));
        }
        if declared > view.capacity() {
            return Err(ObexError::MalformedPacket(format!(
                "declared packet length {declared} with only {} bytes available",
                view.capacity()
            )));
        }
        let body = Bytes::copy_from_slice(view.slice(PACKET_PREFIX_SIZE, declared)?);
        let (opcode, is_final) = split_opcode(raw);
        Ok(Self {
            opcode,
            is_final,
            body,
        })
    }
}
