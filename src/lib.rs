//! # obex-client
//!
//! Client implementation of the OBEX (Object Exchange) session protocol
//! over a reliable, ordered byte-stream transport, typically a Bluetooth
//! RFCOMM or L2CAP socket.
//!
//! This crate is the protocol engine only. Obtaining a connected socket -
//! discovery, pairing, profile registration, channel establishment - is the
//! caller's concern; anything implementing `AsyncRead + AsyncWrite` works.
//!
//! ## Architecture
//!
//! - **protocol**: the wire codec - tagged headers, packet framing, request
//!   builders, response decoders, and a streaming reassembler that is
//!   indifferent to socket read chunk boundaries.
//! - **processor**: one request/response exchange at a time over the
//!   socket, enforcing OBEX's single-request-in-flight discipline.
//! - **session**: the connect / put / disconnect lifecycle state machine,
//!   including chunked transfers of objects larger than the negotiated
//!   maximum packet length.
//!
//! ## Example
//!
//! ```ignore
//! use obex_client::{ObexClient, protocol::HeaderList};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), obex_client::ObexError> {
//!     let socket = connect_rfcomm_somehow().await;
//!
//!     let mut client = ObexClient::new(socket);
//!     client.connect(HeaderList::new()).await?;
//!     client.put("hello.txt", b"abc").await?;
//!     let socket = client.disconnect().await?;
//!     Ok(())
//! }
//! ```

pub mod buffer;
pub mod error;
pub mod processor;
pub mod protocol;
pub mod session;

pub use error::ObexError;
pub use processor::{ProcessorConfig, RequestProcessor};
pub use session::{ObexClient, PutTransfer, SessionConfig};
