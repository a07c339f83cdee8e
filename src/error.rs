//! Error types for obex-client.

use thiserror::Error;

/// Main error type for all OBEX client operations.
#[derive(Debug, Error)]
pub enum ObexError {
    /// Bounds-checked buffer access beyond the region's capacity.
    #[error("access of {width} bytes at offset {offset} exceeds capacity {capacity}")]
    OutOfRange {
        offset: usize,
        width: usize,
        capacity: usize,
    },

    /// Header length prefix inconsistent with the remaining input.
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    /// Declared packet length below the minimum frame size, or framing
    /// otherwise inconsistent.
    #[error("malformed packet: {0}")]
    MalformedPacket(String),

    /// A request is already awaiting its response on this processor.
    #[error("request already in flight")]
    RequestInFlight,

    /// A response decoder received a packet outside the opcode family it
    /// expects.
    #[error("unexpected opcode 0x{0:02x}")]
    UnexpectedOpcode(u8),

    /// Underlying socket failure.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// The peer closed the connection while a response was pending.
    #[error("connection closed")]
    ConnectionClosed,

    /// The configured per-request timeout expired before a response arrived.
    #[error("timed out waiting for response")]
    ResponseTimeout,

    /// Operation issued in a session state that does not permit it.
    #[error("invalid session state: {0}")]
    InvalidState(&'static str),

    /// The peer answered with a well-formed response carrying a non-success
    /// code.
    #[error("peer rejected request with response code 0x{0:02x}")]
    PeerRejected(u8),
}

/// Result type alias using ObexError.
pub type Result<T> = std::result::Result<T, ObexError>;
