//! Request/response exchange over a connected socket.
//!
//! [`RequestProcessor`] owns the pending-request state for exactly one
//! duplex stream and enforces OBEX's single-request-in-flight discipline:
//! it is either `Idle` or `AwaitingResponse`, and a send issued while a
//! response is pending fails with [`ObexError::RequestInFlight`] before any
//! byte touches the socket.
//!
//! The processor never closes the stream - the connection lifecycle belongs
//! to whoever opened the socket. [`RequestProcessor::into_inner`] hands the
//! stream back untouched.
//!
//! # Cancellation
//!
//! Dropping an in-flight [`send_request`](RequestProcessor::send_request)
//! future (e.g. through `tokio::select!` or an outer timeout) leaves the
//! processor in `AwaitingResponse`, since response bytes may still be in
//! transit; call [`reset`](RequestProcessor::reset) to discard the partial
//! reassembly and return to `Idle`. Completed calls - success, transport
//! error, peer EOF, or the configured response timeout - always resolve with
//! exactly one outcome and leave the processor `Idle`.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::warn;

use crate::error::{ObexError, Result};
use crate::protocol::wire_format::MAX_PACKET_SIZE;
use crate::protocol::{Packet, PacketBuffer};

/// Default socket read buffer size.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 4 * 1024;

/// Configuration for a [`RequestProcessor`].
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Per-request response deadline. On expiry the pending exchange fails
    /// with [`ObexError::ResponseTimeout`], exactly as a socket error would.
    /// `None` waits indefinitely, which is what the protocol itself assumes.
    pub response_timeout: Option<Duration>,
    /// Size of the scratch buffer used for socket reads.
    pub read_buffer_size: usize,
    /// Largest inbound packet the reassembler will accept.
    pub max_packet_size: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            response_timeout: None,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            max_packet_size: MAX_PACKET_SIZE,
        }
    }
}

/// Pending-request state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProcessorState {
    Idle,
    AwaitingResponse,
}

/// Serializes one request/response exchange at a time over a duplex stream.
pub struct RequestProcessor<S> {
    stream: S,
    state: ProcessorState,
    assembler: PacketBuffer,
    config: ProcessorConfig,
}

impl<S: AsyncRead + AsyncWrite + Unpin> RequestProcessor<S> {
    /// Wrap a connected stream with default configuration.
    pub fn new(stream: S) -> Self {
        Self::with_config(stream, ProcessorConfig::default())
    }

    /// Wrap a connected stream.
    pub fn with_config(stream: S, config: ProcessorConfig) -> Self {
        let assembler = PacketBuffer::with_max_packet_size(config.max_packet_size);
        Self {
            stream,
            state: ProcessorState::Idle,
            assembler,
            config,
        }
    }

    /// Whether no exchange is pending.
    pub fn is_idle(&self) -> bool {
        self.state == ProcessorState::Idle
    }

    /// Discard any partial reassembly and return to `Idle`. Recovery hook
    /// for a cancelled in-flight exchange.
    pub fn reset(&mut self) {
        self.assembler.clear();
        self.state = ProcessorState::Idle;
    }

    /// Give the stream back to its owner. The processor never shuts the
    /// stream down on its own.
    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Write `request` to the socket and wait for the single response packet.
    ///
    /// Valid only while `Idle`; otherwise fails with
    /// [`ObexError::RequestInFlight`] without performing any socket I/O.
    pub async fn send_request(&mut self, request: &Packet) -> Result<Packet> {
        if self.state != ProcessorState::Idle {
            return Err(ObexError::RequestInFlight);
        }
        self.state = ProcessorState::AwaitingResponse;
        self.assembler.clear();

        let result = self.exchange(request).await;
        if result.is_err() {
            // The exchange is resolved; partial reassembly is meaningless.
            self.assembler.clear();
        }
        self.state = ProcessorState::Idle;
        result
    }

    async fn exchange(&mut self, request: &Packet) -> Result<Packet> {
        let bytes = request.encode();
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;

        match self.config.response_timeout {
            Some(deadline) => match tokio::time::timeout(deadline, self.read_response()).await {
                Ok(result) => result,
                Err(_) => Err(ObexError::ResponseTimeout),
            },
            None => self.read_response().await,
        }
    }

    /// Feed socket reads into the reassembler until it emits a packet.
    async fn read_response(&mut self) -> Result<Packet> {
        let mut buf = vec![0u8; self.config.read_buffer_size];
        loop {
            let n = self.stream.read(&mut buf).await?;
            if n == 0 {
                return Err(ObexError::ConnectionClosed);
            }

            let mut packets = self.assembler.push(&buf[..n])?.into_iter();
            if let Some(response) = packets.next() {
                // One response per request; anything beyond it is a peer
                // protocol violation.
                for stray in packets {
                    warn!(
                        opcode = stray.raw_opcode(),
                        "discarding packet received beyond the awaited response"
                    );
                }
                return Ok(response);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ConnectRequestBuilder, DisconnectRequestBuilder};
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_send_request_roundtrip() {
        let (client, mut server) = duplex(1024);
        let mut processor = RequestProcessor::new(client);
        let request = ConnectRequestBuilder::new()
            .max_packet_length(0x2000)
            .build()
            .unwrap();
        let encoded = request.encode();

        let server_task = tokio::spawn(async move {
            let mut buf = vec![0u8; 64];
            let n = server.read(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], &[0x80, 0x00, 0x07, 0x10, 0x00, 0x20, 0x00]);
            server
                .write_all(&[0xA0, 0x00, 0x07, 0x10, 0x00, 0x01, 0x00])
                .await
                .unwrap();
            server
        });

        assert_eq!(encoded, [0x80, 0x00, 0x07, 0x10, 0x00, 0x20, 0x00]);
        let response = processor.send_request(&request).await.unwrap();
        assert_eq!(response.raw_opcode(), 0xA0);
        assert_eq!(response.body(), &[0x10, 0x00, 0x01, 0x00]);
        assert!(processor.is_idle());

        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_fragmented_response_is_reassembled() {
        let (client, mut server) = duplex(1024);
        let mut processor = RequestProcessor::new(client);
        let request = DisconnectRequestBuilder::new().build().unwrap();

        let server_task = tokio::spawn(async move {
            let mut buf = vec![0u8; 16];
            let _ = server.read(&mut buf).await.unwrap();
            // Deliver one packet in three writes.
            server.write_all(&[0xA0]).await.unwrap();
            server.flush().await.unwrap();
            tokio::task::yield_now().await;
            server.write_all(&[0x00, 0x05]).await.unwrap();
            server.flush().await.unwrap();
            tokio::task::yield_now().await;
            server.write_all(&[0x01, 0x02]).await.unwrap();
        });

        let response = processor.send_request(&request).await.unwrap();
        assert_eq!(response.raw_opcode(), 0xA0);
        assert_eq!(response.body(), &[0x01, 0x02]);

        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_second_request_while_awaiting_fails_without_writing() {
        let (client, mut server) = duplex(1024);
        let mut processor = RequestProcessor::new(client);
        let request = DisconnectRequestBuilder::new().build().unwrap();
        let encoded = request.encode();

        // Start an exchange and cancel it mid-flight; the server never
        // responds, so the future is dropped while awaiting.
        let cancelled =
            tokio::time::timeout(Duration::from_millis(20), processor.send_request(&request))
                .await;
        assert!(cancelled.is_err());
        assert!(!processor.is_idle());

        // The guard rejects a second send before any socket write.
        let err = processor.send_request(&request).await.unwrap_err();
        assert!(matches!(err, ObexError::RequestInFlight));

        // Exactly one request reached the wire.
        let mut buf = vec![0u8; encoded.len()];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, encoded);
        let mut one = [0u8; 1];
        let no_more = tokio::time::timeout(Duration::from_millis(20), server.read(&mut one)).await;
        assert!(no_more.is_err());

        // reset() recovers the processor.
        processor.reset();
        assert!(processor.is_idle());
    }

    #[tokio::test]
    async fn test_peer_close_while_awaiting_fails_once() {
        let (client, server) = duplex(1024);
        let mut processor = RequestProcessor::new(client);
        let request = DisconnectRequestBuilder::new().build().unwrap();

        let (result, _) = tokio::join!(processor.send_request(&request), async move {
            // Drop the peer end so the pending read sees EOF.
            drop(server);
        });

        assert!(matches!(result, Err(ObexError::ConnectionClosed)));
        assert!(processor.is_idle());
    }

    #[tokio::test]
    async fn test_malformed_response_fails_and_processor_recovers() {
        let (client, mut server) = duplex(1024);
        let mut processor = RequestProcessor::new(client);
        let request = DisconnectRequestBuilder::new().build().unwrap();

        let server_task = tokio::spawn(async move {
            let mut buf = vec![0u8; 16];
            let _ = server.read(&mut buf).await.unwrap();
            // Declared length 2 is below the 3-byte minimum.
            server.write_all(&[0xA0, 0x00, 0x02]).await.unwrap();
            let _ = server.read(&mut buf).await.unwrap();
            server.write_all(&[0xA0, 0x00, 0x03]).await.unwrap();
        });

        let err = processor.send_request(&request).await.unwrap_err();
        assert!(matches!(err, ObexError::MalformedPacket(_)));
        assert!(processor.is_idle());

        // The failure resolved the exchange; a new request succeeds.
        let response = processor.send_request(&request).await.unwrap();
        assert_eq!(response.raw_opcode(), 0xA0);

        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_response_timeout_behaves_like_socket_error() {
        let (client, mut server) = duplex(1024);
        let config = ProcessorConfig {
            response_timeout: Some(Duration::from_millis(30)),
            ..Default::default()
        };
        let mut processor = RequestProcessor::with_config(client, config);
        let request = DisconnectRequestBuilder::new().build().unwrap();

        let server_task = tokio::spawn(async move {
            let mut buf = vec![0u8; 16];
            // Swallow the request, never respond to it.
            let _ = server.read(&mut buf).await.unwrap();
            let _ = server.read(&mut buf).await.unwrap();
            server.write_all(&[0xA0, 0x00, 0x03]).await.unwrap();
        });

        let err = processor.send_request(&request).await.unwrap_err();
        assert!(matches!(err, ObexError::ResponseTimeout));
        assert!(processor.is_idle());

        // Back to Idle; the next exchange completes normally.
        let response = processor.send_request(&request).await.unwrap();
        assert_eq!(response.raw_opcode(), 0xA0);

        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_into_inner_returns_the_stream() {
        let (client, mut server) = duplex(64);
        let processor = RequestProcessor::new(client);

        let mut stream = processor.into_inner();
        stream.write_all(b"ok").await.unwrap();
        let mut buf = [0u8; 2];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ok");
    }
}
