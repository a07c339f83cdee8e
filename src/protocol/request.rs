//! Request packet builders.
//!
//! Each builder turns semantic fields into exactly one well-formed wire
//! [`Packet`]. The length field is always derived from the assembled body at
//! build time. None of the builders chunk: splitting an object across
//! multiple Put packets is the transfer driver's job
//! ([`PutTransfer`](crate::session::PutTransfer)), which invokes
//! [`PutRequestBuilder`] once per chunk.

use bytes::Bytes;

use crate::buffer::ByteBuffer;
use crate::error::Result;
use crate::protocol::header::{Header, HeaderList};
use crate::protocol::packet::Packet;
use crate::protocol::wire_format::{
    opcode, CONNECT_PREFIX_SIZE, OBEX_PROTOCOL_VERSION,
};

/// Builds a Connect request: opcode `0x80`, body
/// `[version, flags, max_len_hi, max_len_lo]` followed by optional headers.
/// Connect is inherently a single-packet exchange, so the final bit is
/// always set.
///
/// ```
/// use obex_client::protocol::ConnectRequestBuilder;
///
/// let packet = ConnectRequestBuilder::new()
///     .max_packet_length(0x2000)
///     .build()
///     .unwrap();
/// assert_eq!(packet.encode(), [0x80, 0x00, 0x07, 0x10, 0x00, 0x20, 0x00]);
/// ```
#[derive(Debug, Clone)]
pub struct ConnectRequestBuilder {
    max_packet_length: u16,
    headers: HeaderList,
}

impl ConnectRequestBuilder {
    pub fn new() -> Self {
        Self {
            max_packet_length: u16::MAX,
            headers: HeaderList::new(),
        }
    }

    /// Largest packet this side is willing to receive.
    pub fn max_packet_length(mut self, max_packet_length: u16) -> Self {
        self.max_packet_length = max_packet_length;
        self
    }

    /// Add a Count header (number of objects the connection will transfer).
    pub fn count(mut self, count: u32) -> Self {
        self.headers.push(Header::count(count));
        self
    }

    /// Add an arbitrary header.
    pub fn header(mut self, header: Header) -> Self {
        self.headers.push(header);
        self
    }

    /// Append every header from `headers`, preserving order.
    pub fn headers(mut self, headers: HeaderList) -> Self {
        for header in headers {
            self.headers.push(header);
        }
        self
    }

    pub fn build(self) -> Result<Packet> {
        let headers = self.headers.encode()?;
        let mut body = ByteBuffer::zeroed(CONNECT_PREFIX_SIZE + headers.len());
        body.put_u8(0, OBEX_PROTOCOL_VERSION)?;
        // All Connect flags are reserved.
        body.put_u8(1, 0x00)?;
        body.put_u16_be(2, self.max_packet_length)?;
        body.put_slice(CONNECT_PREFIX_SIZE, &headers)?;
        Packet::new(opcode::CONNECT, true, Bytes::from(body.into_inner()))
    }
}

impl Default for ConnectRequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds one Put request packet.
///
/// Body headers are emitted in protocol-significant order: Name, Length, any
/// informational headers, then the chunk - a Body header on a non-final
/// packet ([`Self::body`]) or an End-of-Body header on the final one
/// ([`Self::end_of_body`]). The final flag follows from which of the two was
/// supplied; with neither, the builder produces a final packet with no body
/// chunk (a delete in OBEX terms).
#[derive(Debug, Clone, Default)]
pub struct PutRequestBuilder {
    name: Option<String>,
    object_length: Option<u32>,
    headers: HeaderList,
    chunk: Option<(Vec<u8>, bool)>,
}

impl PutRequestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name of the object being transferred. Sent in the first packet of a
    /// transfer only.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Total object size in bytes, independent of chunking.
    pub fn object_length(mut self, length: u32) -> Self {
        self.object_length = Some(length);
        self
    }

    /// Add an informational header (e.g. Type), emitted after Name/Length.
    pub fn header(mut self, header: Header) -> Self {
        self.headers.push(header);
        self
    }

    /// Append every header from `headers`, preserving order.
    pub fn headers(mut self, headers: HeaderList) -> Self {
        for header in headers {
            self.headers.push(header);
        }
        self
    }

    /// Carry a partial chunk in a Body header; the packet is non-final.
    pub fn body(mut self, chunk: impl Into<Vec<u8>>) -> Self {
        self.chunk = Some((chunk.into(), false));
        self
    }

    /// Carry the last chunk in an End-of-Body header; the packet is final.
    pub fn end_of_body(mut self, chunk: impl Into<Vec<u8>>) -> Self {
        self.chunk = Some((chunk.into(), true));
        self
    }

    pub fn build(self) -> Result<Packet> {
        let is_final = self.chunk.as_ref().map_or(true, |(_, is_final)| *is_final);

        let mut list = HeaderList::new();
        if let Some(name) = self.name {
            list.push(Header::name(name));
        }
        if let Some(length) = self.object_length {
            list.push(Header::length(length));
        }
        for header in self.headers {
            list.push(header);
        }
        if let Some((chunk, end)) = self.chunk {
            list.push(if end {
                Header::end_of_body(chunk)
            } else {
                Header::body(chunk)
            });
        }

        let body = list.encode()?;
        Packet::new(opcode::PUT, is_final, Bytes::from(body))
    }
}

/// Builds a Disconnect request: opcode `0x81`, empty body unless trailing
/// headers are supplied, always final.
#[derive(Debug, Clone, Default)]
pub struct DisconnectRequestBuilder {
    headers: HeaderList,
}

impl DisconnectRequestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a trailing header (e.g. ConnectionId).
    pub fn header(mut self, header: Header) -> Self {
        self.headers.push(header);
        self
    }

    pub fn build(self) -> Result<Packet> {
        let body = self.headers.encode()?;
        Packet::new(opcode::DISCONNECT, true, Bytes::from(body))
    }
}
