//! Protocol module - wire format, tagged header codec, packet framing and
//! streaming reassembly.
//!
//! Layering, leaves first: [`wire_format`] holds the constants,
//! [`header`] the tagged header codec, [`packet`] the framed unit,
//! [`packet_buffer`] the chunk-boundary-agnostic reassembler, and
//! [`request`]/[`response`] the per-operation builders and decoders on top.

pub mod header;
pub mod packet;
pub mod packet_buffer;
pub mod request;
pub mod response;
pub mod wire_format;

pub use header::{Header, HeaderList, HeaderValue};
pub use packet::Packet;
pub use packet_buffer::PacketBuffer;
pub use request::{ConnectRequestBuilder, DisconnectRequestBuilder, PutRequestBuilder};
pub use response::ConnectResponse;
