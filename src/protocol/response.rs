//! Response decoding.
//!
//! Response opcodes live in a range distinct from requests and always carry
//! the final bit; beyond that they are decoded opaquely as a raw code. The
//! one response with structure of its own is the Connect response, which
//! prefixes its header list with the negotiated connection parameters.

use crate::buffer::ByteBuffer;
use crate::error::{ObexError, Result};
use crate::protocol::header::HeaderList;
use crate::protocol::packet::Packet;
use crate::protocol::wire_format::{response, CONNECT_PREFIX_SIZE};

/// Validate that `packet` belongs to the response opcode family and return
/// its raw response code.
///
/// Request packets (final bit unset, or a raw opcode below the response
/// range) fail with [`ObexError::UnexpectedOpcode`].
pub fn response_code(packet: &Packet) -> Result<u8> {
    let raw = packet.raw_opcode();
    if !packet.is_final() || raw < response::CONTINUE {
        return Err(ObexError::UnexpectedOpcode(raw));
    }
    Ok(raw)
}

/// Decoded view of a Connect response body.
///
/// Body layout: version, flags, 2-byte big-endian negotiated maximum packet
/// length, then a header list. The negotiated value is the ceiling for every
/// packet sent on the connection from here on.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectResponse {
    code: u8,
    version: u8,
    flags: u8,
    max_packet_length: u16,
    headers: HeaderList,
}

impl ConnectResponse {
    /// Decode `packet` as a Connect response.
    pub fn decode(packet: &Packet) -> Result<Self> {
        let code = response_code(packet)?;
        let body = ByteBuffer::new(packet.body());
        if body.capacity() < CONNECT_PREFIX_SIZE {
            return Err(ObexError::MalformedPacket(format!(
                "connect response body of {} bytes is missing the 4-byte prefix",
                body.capacity()
            )));
        }
        let version = body.u8_at(0)?;
        let flags = body.u8_at(1)?;
        let max_packet_length = body.u16_be_at(2)?;
        let headers = HeaderList::decode(body.slice(CONNECT_PREFIX_SIZE, body.capacity())?)?;
        Ok(Self {
            code,
            version,
            flags,
            max_packet_length,
            headers,
        })
    }

    /// Raw response code, final bit included.
    #[inline]
    pub fn code(&self) -> u8 {
        self.code
    }

    /// Whether the peer accepted the connection.
    #[inline]
    pub fn is_success(&self) -> bool {
        self.code == response::SUCCESS
    }

    /// OBEX protocol version advertised by the peer.
    #[inline]
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Connect flags advertised by the peer.
    #[inline]
    pub fn flags(&self) -> u8 {
        self.flags
    }

    /// Negotiated maximum packet length.
    #[inline]
    pub fn max_packet_length(&self) -> u16 {
        self.max_packet_length
    }

    /// Headers trailing the fixed prefix.
    #[inline]
    pub fn headers(&self) -> &HeaderList {
        &self.headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::header::id;

    #[test]
    fn test_decode_connect_response() {
        let packet = Packet::decode(&[
            0xA0, 0x00, 0x0C, // Success, length 12
            0x10, 0x00, 0x12, 0x34, // version 1.0, flags 0, max length 0x1234
            0xCB, 0x00, 0x00, 0x00, 0x01, // ConnectionId = 1
        ])
        .unwrap();

        let response = ConnectResponse::decode(&packet).unwrap();
        assert!(response.is_success());
        assert_eq!(response.code(), 0xA0);
        assert_eq!(response.version(), 0x10);
        assert_eq!(response.flags(), 0x00);
        assert_eq!(response.max_packet_length(), 0x1234);
        assert_eq!(response.headers().u32(id::CONNECTION_ID), Some(1));
    }

    #[test]
    fn test_decode_connect_response_without_headers() {
        let packet = Packet::decode(&[0xA2, 0x00, 0x07, 0x10, 0x00, 0x00, 0xFF]).unwrap();
        let response = ConnectResponse::decode(&packet).unwrap();

        assert!(!response.is_success()); // Accepted, not Success
        assert_eq!(response.max_packet_length(), 0xFF);
        assert!(response.headers().is_empty());
    }

    #[test]
    fn test_non_final_packet_is_unexpected() {
        // A Put request is not in the response family.
        let packet = Packet::decode(&[0x02, 0x00, 0x03]).unwrap();
        assert!(matches!(
            ConnectResponse::decode(&packet),
            Err(ObexError::UnexpectedOpcode(0x02))
        ));
    }

    #[test]
    fn test_request_opcode_is_unexpected() {
        // A Connect request carries the final bit but sits below the
        // response range.
        let packet = Packet::decode(&[0x80, 0x00, 0x07, 0x10, 0x00, 0xFF, 0xFF]).unwrap();
        assert!(matches!(
            ConnectResponse::decode(&packet),
            Err(ObexError::UnexpectedOpcode(0x80))
        ));
    }

    #[test]
    fn test_short_body_is_malformed() {
        let packet = Packet::decode(&[0xA0, 0x00, 0x05, 0x10, 0x00]).unwrap();
        assert!(matches!(
            ConnectResponse::decode(&packet),
            Err(ObexError::MalformedPacket(_))
        ));
    }

    #[test]
    fn test_response_code_passthrough() {
        let packet = Packet::decode(&[0xC3, 0x00, 0x03]).unwrap();
        assert_eq!(response_code(&packet).unwrap(), 0xC3);

        let packet = Packet::decode(&[0x90, 0x00, 0x03]).unwrap();
        assert_eq!(response_code(&packet).unwrap(), response::CONTINUE);
    }
}
