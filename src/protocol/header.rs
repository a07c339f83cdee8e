//! Tagged header codec.
//!
//! OBEX packet bodies carry a list of headers. Each header starts with a
//! one-byte identifier whose top two bits select the value encoding:
//!
//! - `0b00` - null-terminated UTF-16BE text, prefixed with a 2-byte
//!   big-endian length that counts the full header (id + length + payload),
//! - `0b01` - byte sequence with the same length-prefix rule,
//! - `0b10` - a single byte, no prefix,
//! - `0b11` - a 4-byte big-endian unsigned integer, no prefix.
//!
//! [`HeaderList`] preserves order and duplicate identifiers: Put requests
//! depend on Name/Length/Body appearing in protocol-significant order.

use tracing::trace;

use crate::buffer::ByteBuffer;
use crate::error::{ObexError, Result};

/// Value-encoding tag, the upper two bits of a header identifier.
pub mod encoding {
    /// Mask selecting the tag bits.
    pub const MASK: u8 = 0xC0;
    /// Null-terminated UTF-16BE text, length-prefixed.
    pub const TEXT: u8 = 0x00;
    /// Raw byte sequence, length-prefixed.
    pub const BYTES: u8 = 0x40;
    /// Single byte value.
    pub const ONE_BYTE: u8 = 0x80;
    /// 4-byte big-endian unsigned integer.
    pub const FOUR_BYTES: u8 = 0xC0;
}

/// Well-known header identifiers used by this client.
pub mod id {
    /// Number of objects in the operation.
    pub const COUNT: u8 = 0xC0;
    /// Object name, typically a file name.
    pub const NAME: u8 = 0x01;
    /// Object type, e.g. a MIME type.
    pub const TYPE: u8 = 0x42;
    /// Total object length in bytes.
    pub const LENGTH: u8 = 0xC3;
    /// Text description of the object.
    pub const DESCRIPTION: u8 = 0x05;
    /// Service the operation is targeting.
    pub const TARGET: u8 = 0x46;
    /// A chunk of the object body.
    pub const BODY: u8 = 0x48;
    /// The final chunk of the object body.
    pub const END_OF_BODY: u8 = 0x49;
    /// Identifies the responding service.
    pub const WHO: u8 = 0x4A;
    /// Connection multiplexing identifier.
    pub const CONNECTION_ID: u8 = 0xCB;
}

/// A length-prefixed header (text or byte sequence) spends 3 bytes on its
/// id + length prefix, so 3 is also the smallest legal declared length.
pub(crate) const LENGTH_PREFIX_SIZE: usize = 3;

/// A header value, one variant per encoding tag.
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    /// UTF-16BE null-terminated text on the wire.
    Text(String),
    /// Length-prefixed byte sequence.
    Bytes(Vec<u8>),
    /// Single byte.
    U8(u8),
    /// 4-byte big-endian unsigned integer.
    U32(u32),
}

impl HeaderValue {
    /// The encoding tag this value serializes under.
    pub fn encoding(&self) -> u8 {
        match self {
            HeaderValue::Text(_) => encoding::TEXT,
            HeaderValue::Bytes(_) => encoding::BYTES,
            HeaderValue::U8(_) => encoding::ONE_BYTE,
            HeaderValue::U32(_) => encoding::FOUR_BYTES,
        }
    }
}

/// A single tagged header.
///
/// The value variant always matches the identifier's tag bits; [`Header::new`]
/// rejects mismatches and the decoder picks the variant from the tag.
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    id: u8,
    value: HeaderValue,
}

impl Header {
    /// Create a header, validating that the value variant matches the
    /// identifier's encoding tag.
    pub fn new(id: u8, value: HeaderValue) -> Result<Self> {
        if id & encoding::MASK != value.encoding() {
            return Err(ObexError::MalformedHeader(format!(
                "value kind does not match the tag bits of id 0x{id:02x}"
            )));
        }
        Ok(Self { id, value })
    }

    /// Count header (number of objects).
    pub fn count(count: u32) -> Self {
        Self {
            id: id::COUNT,
            value: HeaderValue::U32(count),
        }
    }

    /// Name header.
    pub fn name(name: impl Into<String>) -> Self {
        Self {
            id: id::NAME,
            value: HeaderValue::Text(name.into()),
        }
    }

    /// Type header.
    pub fn object_type(mime: impl Into<String>) -> Self {
        Self {
            id: id::TYPE,
            value: HeaderValue::Text(mime.into()),
        }
    }

    /// Length header (total object size in bytes).
    pub fn length(length: u32) -> Self {
        Self {
            id: id::LENGTH,
            value: HeaderValue::U32(length),
        }
    }

    /// Description header.
    pub fn description(text: impl Into<String>) -> Self {
        Self {
            id: id::DESCRIPTION,
            value: HeaderValue::Text(text.into()),
        }
    }

    /// Target header.
    pub fn target(service: impl Into<Vec<u8>>) -> Self {
        Self {
            id: id::TARGET,
            value: HeaderValue::Bytes(service.into()),
        }
    }

    /// Body header (partial object chunk).
    pub fn body(chunk: impl Into<Vec<u8>>) -> Self {
        Self {
            id: id::BODY,
            value: HeaderValue::Bytes(chunk.into()),
        }
    }

    /// End-of-Body header (final object chunk).
    pub fn end_of_body(chunk: impl Into<Vec<u8>>) -> Self {
        Self {
            id: id::END_OF_BODY,
            value: HeaderValue::Bytes(chunk.into()),
        }
    }

    /// ConnectionId header.
    pub fn connection_id(connection: u32) -> Self {
        Self {
            id: id::CONNECTION_ID,
            value: HeaderValue::U32(connection),
        }
    }

    /// The header identifier byte.
    #[inline]
    pub fn id(&self) -> u8 {
        self.id
    }

    /// The decoded value.
    #[inline]
    pub fn value(&self) -> &HeaderValue {
        &self.value
    }

    /// Number of bytes this header occupies on the wire.
    pub fn encoded_len(&self) -> usize {
        1 + match &self.value {
            HeaderValue::Text(text) => 2 + utf16_wire_len(text),
            HeaderValue::Bytes(bytes) => 2 + bytes.len(),
            HeaderValue::U8(_) => 1,
            HeaderValue::U32(_) => 4,
        }
    }

    /// Encode this header into `buf` at `at`, returning the bytes written.
    fn encode_into(&self, buf: &mut ByteBuffer<Vec<u8>>, at: usize) -> Result<usize> {
        buf.put_u8(at, self.id)?;
        match &self.value {
            HeaderValue::U8(value) => buf.put_u8(at + 1, *value)?,
            HeaderValue::U32(value) => buf.put_u32_be(at + 1, *value)?,
            HeaderValue::Bytes(bytes) => {
                let total = LENGTH_PREFIX_SIZE + bytes.len();
                if total > u16::MAX as usize {
                    return Err(ObexError::MalformedHeader(format!(
                        "payload of {} bytes overflows the header length field",
                        bytes.len()
                    )));
                }
                buf.put_u16_be(at + 1, total as u16)?;
                buf.put_slice(at + LENGTH_PREFIX_SIZE, bytes)?;
            }
            HeaderValue::Text(text) => {
                let payload = utf16_be_bytes(text);
                let total = LENGTH_PREFIX_SIZE + payload.len();
                if total > u16::MAX as usize {
                    return Err(ObexError::MalformedHeader(format!(
                        "text of {} wire bytes overflows the header length field",
                        payload.len()
                    )));
                }
                buf.put_u16_be(at + 1, total as u16)?;
                buf.put_slice(at + LENGTH_PREFIX_SIZE, &payload)?;
            }
        }
        Ok(self.encoded_len())
    }
}

/// Ordered sequence of headers. Duplicate identifiers are legal and
/// preserved, as is insertion order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HeaderList(Vec<Header>);

impl HeaderList {
    /// An empty list.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Build a list from headers in the given order.
    pub fn from_headers(headers: Vec<Header>) -> Self {
        Self(headers)
    }

    /// Append a header, keeping insertion order.
    pub fn push(&mut self, header: Header) {
        self.0.push(header);
    }

    /// Number of headers in the list.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the list holds no headers.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate the headers in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Header> {
        self.0.iter()
    }

    /// First header with the given identifier, if any.
    pub fn find(&self, id: u8) -> Option<&Header> {
        self.0.iter().find(|header| header.id == id)
    }

    /// First text value under `id`.
    pub fn text(&self, id: u8) -> Option<&str> {
        match self.find(id)?.value() {
            HeaderValue::Text(text) => Some(text),
            _ => None,
        }
    }

    /// First byte-sequence value under `id`.
    pub fn bytes(&self, id: u8) -> Option<&[u8]> {
        match self.find(id)?.value() {
            HeaderValue::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// First 4-byte integer value under `id`.
    pub fn u32(&self, id: u8) -> Option<u32> {
        match self.find(id)?.value() {
            HeaderValue::U32(value) => Some(*value),
            _ => None,
        }
    }

    /// Total wire size of the encoded list.
    pub fn encoded_len(&self) -> usize {
        self.0.iter().map(Header::encoded_len).sum()
    }

    /// Serialize every header in order.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = ByteBuffer::zeroed(self.encoded_len());
        let mut at = 0;
        for header in &self.0 {
            at += header.encode_into(&mut buf, at)?;
        }
        Ok(buf.into_inner())
    }

    /// Decode a header list from a packet body slice.
    ///
    /// Decoding branches on each identifier's tag bits, so unknown ids are
    /// fine. It never reads past `buf`, and fails with
    /// [`ObexError::MalformedHeader`] when a declared length is below the
    /// 3-byte minimum, overruns the input, or leaves a truncated payload.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let view = ByteBuffer::new(buf);
        let mut headers = Vec::new();
        let mut at = 0;
        while at < view.capacity() {
            let id = view.u8_at(at)?;
            let remaining = view.capacity() - at;
            let (value, advance) = match id & encoding::MASK {
                encoding::FOUR_BYTES => {
                    if remaining < 5 {
                        return Err(truncated(id, remaining));
                    }
                    (HeaderValue::U32(view.u32_be_at(at + 1)?), 5)
                }
                encoding::ONE_BYTE => {
                    if remaining < 2 {
                        return Err(truncated(id, remaining));
                    }
                    (HeaderValue::U8(view.u8_at(at + 1)?), 2)
                }
                tag => {
                    if remaining < LENGTH_PREFIX_SIZE {
                        return Err(truncated(id, remaining));
                    }
                    let total = view.u16_be_at(at + 1)? as usize;
                    if total < LENGTH_PREFIX_SIZE {
                        return Err(ObexError::MalformedHeader(format!(
                            "header 0x{id:02x} declares length {total}, below the 3-byte minimum"
                        )));
                    }
                    if total > remaining {
                        return Err(ObexError::MalformedHeader(format!(
                            "header 0x{id:02x} declares length {total} with only {remaining} bytes left"
                        )));
                    }
                    let payload = view.slice(at + LENGTH_PREFIX_SIZE, at + total)?;
                    let value = if tag == encoding::TEXT {
                        HeaderValue::Text(utf16_be_to_string(payload)?)
                    } else {
                        HeaderValue::Bytes(payload.to_vec())
                    };
                    (value, total)
                }
            };
            trace!(id, advance, "decoded header");
            headers.push(Header { id, value });
            at += advance;
        }
        Ok(Self(headers))
    }
}

impl IntoIterator for HeaderList {
    type Item = Header;
    type IntoIter = std::vec::IntoIter<Header>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a HeaderList {
    type Item = &'a Header;
    type IntoIter = std::slice::Iter<'a, Header>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

fn truncated(id: u8, remaining: usize) -> ObexError {
    ObexError::MalformedHeader(format!(
        "header 0x{id:02x} payload truncated after {remaining} bytes"
    ))
}

/// Wire size of `text` as UTF-16BE including the null terminator.
fn utf16_wire_len(text: &str) -> usize {
    (text.encode_utf16().count() + 1) * 2
}

/// Encode `text` as null-terminated UTF-16BE.
fn utf16_be_bytes(text: &str) -> Vec<u8> {
    text.encode_utf16()
        .chain(std::iter::once(0))
        .flat_map(|unit| unit.to_be_bytes())
        .collect()
}

/// Decode a null-terminated UTF-16BE payload. An empty payload decodes to
/// the empty string.
fn utf16_be_to_string(buf: &[u8]) -> Result<String> {
    if buf.is_empty() {
        return Ok(String::new());
    }
    if buf.len() % 2 != 0 {
        return Err(ObexError::MalformedHeader(
            "unicode payload has odd byte length".into(),
        ));
    }
    let units: Vec<u16> = buf
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    let mut text = String::from_utf16(&units)
        .map_err(|e| ObexError::MalformedHeader(format!("invalid utf-16 text: {e}")))?;
    if !text.ends_with('\0') {
        return Err(ObexError::MalformedHeader(
            "unicode text missing null terminator".into(),
        ));
    }
    text.pop();
    Ok(text)
}
