//! Session lifecycle over one OBEX connection.
//!
//! [`ObexClient`] drives the connect / transfer / disconnect sequence as an
//! explicit state machine rather than nested callbacks; every transition is
//! triggered by exactly one [`RequestProcessor`] exchange:
//!
//! ```text
//! Disconnected ──connect──► Connecting ──► Connected
//!                                          │      ▲
//!                                        put      │ (per transfer)
//!                                          ▼      │
//!                                        Transferring
//!      Closed ◄── Disconnecting ◄──disconnect── Connected
//! ```
//!
//! Objects larger than the negotiated maximum packet length are split by
//! [`PutTransfer`], which builds one wire packet per chunk: the first
//! carries Name, Length and a Body header, middle packets carry Body only,
//! and the last carries End-of-Body with the final bit set. Non-final
//! chunks expect a Continue response, the final one expects Success.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use crate::error::{ObexError, Result};
use crate::processor::{ProcessorConfig, RequestProcessor};
use crate::protocol::header::{Header, HeaderList, LENGTH_PREFIX_SIZE};
use crate::protocol::request::{
    ConnectRequestBuilder, DisconnectRequestBuilder, PutRequestBuilder,
};
use crate::protocol::response::{response_code, ConnectResponse};
use crate::protocol::wire_format::{response, MIN_MAX_PACKET_SIZE, PACKET_PREFIX_SIZE};
use crate::protocol::Packet;

/// Configuration for an [`ObexClient`] session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Largest packet this side is willing to receive, advertised in the
    /// Connect request.
    pub max_packet_length: u16,
    /// Per-request response deadline, forwarded to the processor.
    pub response_timeout: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_packet_length: u16::MAX,
            response_timeout: None,
        }
    }
}

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Transferring,
    Disconnecting,
    Closed,
}

/// An OBEX client session over one connected duplex stream.
pub struct ObexClient<S> {
    processor: RequestProcessor<S>,
    state: SessionState,
    /// Peer-negotiated ceiling for outgoing packets; meaningful once
    /// connected.
    max_packet_length: u16,
}

impl<S: AsyncRead + AsyncWrite + Unpin> ObexClient<S> {
    /// Wrap a connected stream with default configuration.
    pub fn new(stream: S) -> Self {
        Self::with_config(stream, SessionConfig::default())
    }

    /// Wrap a connected stream.
    pub fn with_config(stream: S, config: SessionConfig) -> Self {
        let processor_config = ProcessorConfig {
            response_timeout: config.response_timeout,
            max_packet_size: config.max_packet_length as usize,
            ..ProcessorConfig::default()
        };
        Self {
            processor: RequestProcessor::with_config(stream, processor_config),
            state: SessionState::Disconnected,
            max_packet_length: config.max_packet_length,
        }
    }

    /// Whether the session is connected and ready for transfers.
    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    /// The ceiling for outgoing packets, negotiated during Connect.
    pub fn max_packet_length(&self) -> u16 {
        self.max_packet_length
    }

    /// Establish the OBEX session.
    ///
    /// Sends a Connect request advertising this side's maximum packet
    /// length plus any caller-supplied `headers` (e.g. Count), decodes the
    /// Connect response, and adopts the peer's maximum packet length as the
    /// ceiling for the rest of the connection.
    pub async fn connect(&mut self, headers: HeaderList) -> Result<ConnectResponse> {
        if self.state != SessionState::Disconnected {
            return Err(ObexError::InvalidState("connect requires a disconnected session"));
        }
        self.state = SessionState::Connecting;

        match self.exchange_connect(headers).await {
            Ok(connect) => {
                self.max_packet_length = connect.max_packet_length();
                self.state = SessionState::Connected;
                debug!(max_packet_length = self.max_packet_length, "session connected");
                Ok(connect)
            }
            Err(e) => {
                self.state = SessionState::Disconnected;
                Err(e)
            }
        }
    }

    async fn exchange_connect(&mut self, headers: HeaderList) -> Result<ConnectResponse> {
        let request = ConnectRequestBuilder::new()
            .max_packet_length(self.max_packet_length)
            .headers(headers)
            .build()?;
        let packet = self.processor.send_request(&request).await?;
        let connect = ConnectResponse::decode(&packet)?;
        if !connect.is_success() {
            return Err(ObexError::PeerRejected(connect.code()));
        }
        if connect.max_packet_length() < MIN_MAX_PACKET_SIZE {
            return Err(ObexError::MalformedPacket(format!(
                "peer advertised max packet length {} below the OBEX minimum of {}",
                connect.max_packet_length(),
                MIN_MAX_PACKET_SIZE
            )));
        }
        Ok(connect)
    }

    /// Push one object to the peer.
    pub async fn put(&mut self, name: &str, data: &[u8]) -> Result<()> {
        self.put_with_headers(name, data, HeaderList::new()).await
    }

    /// Push one object, attaching informational `headers` (e.g. Type) to the
    /// first packet of the transfer.
    pub async fn put_with_headers(
        &mut self,
        name: &str,
        data: &[u8],
        headers: HeaderList,
    ) -> Result<()> {
        if self.state != SessionState::Connected {
            return Err(ObexError::InvalidState("put requires a connected session"));
        }
        self.state = SessionState::Transferring;

        let result = self.drive_put(name, data, headers).await;
        // A rejected or failed transfer does not tear the session down;
        // transport errors will resurface on the next exchange.
        self.state = SessionState::Connected;
        result
    }

    async fn drive_put(&mut self, name: &str, data: &[u8], headers: HeaderList) -> Result<()> {
        let mut transfer = PutTransfer::new(name, data, self.max_packet_length, headers)?;
        while let Some(packet) = transfer.next_packet()? {
            let is_final = packet.is_final();
            let packet_response = self.processor.send_request(&packet).await?;
            let code = response_code(&packet_response)?;
            let expected = if is_final {
                response::SUCCESS
            } else {
                response::CONTINUE
            };
            if code != expected {
                return Err(ObexError::PeerRejected(code));
            }
        }
        Ok(())
    }

    /// End the session and return the stream to its owner; the socket is
    /// never closed by this layer.
    pub async fn disconnect(mut self) -> Result<S> {
        if self.state != SessionState::Connected {
            return Err(ObexError::InvalidState("disconnect requires a connected session"));
        }
        self.state = SessionState::Disconnecting;

        let request = DisconnectRequestBuilder::new().build()?;
        let packet = self.processor.send_request(&request).await?;
        let code = response_code(&packet)?;
        if code != response::SUCCESS {
            return Err(ObexError::PeerRejected(code));
        }
        self.state = SessionState::Closed;
        debug!("session closed");
        Ok(self.processor.into_inner())
    }
}

/// Splits one logical Put operation into wire packets that honor the
/// negotiated packet ceiling.
///
/// Each [`next_packet`](Self::next_packet) call invokes the
/// [`PutRequestBuilder`] once and yields exactly one packet; chunk boundary
/// decisions live here, not in the builder.
pub struct PutTransfer<'a> {
    name: &'a str,
    data: &'a [u8],
    /// Informational headers for the first packet; taken on first build.
    headers: Option<HeaderList>,
    max_packet_length: usize,
    offset: usize,
    started: bool,
    done: bool,
}

impl<'a> PutTransfer<'a> {
    /// Create a transfer for `data` under `name`, bounded by
    /// `max_packet_length` per packet.
    pub fn new(
        name: &'a str,
        data: &'a [u8],
        max_packet_length: u16,
        headers: HeaderList,
    ) -> Result<Self> {
        if u32::try_from(data.len()).is_err() {
            return Err(ObexError::MalformedPacket(format!(
                "object of {} bytes overflows the 32-bit Length header",
                data.len()
            )));
        }
        Ok(Self {
            name,
            data,
            headers: Some(headers),
            max_packet_length: max_packet_length as usize,
            offset: 0,
            started: false,
            done: false,
        })
    }

    /// Whether every chunk, including the final one, has been produced.
    pub fn is_complete(&self) -> bool {
        self.done
    }

    /// Build the next wire packet, or `None` once the final packet has been
    /// produced.
    pub fn next_packet(&mut self) -> Result<Option<Packet>> {
        if self.done {
            return Ok(None);
        }

        let mut builder = PutRequestBuilder::new();
        let mut overhead = PACKET_PREFIX_SIZE + LENGTH_PREFIX_SIZE;
        if !self.started {
            let info = self.headers.take().unwrap_or_default();
            overhead += Header::name(self.name).encoded_len()
                + Header::length(self.data.len() as u32).encoded_len()
                + info.encoded_len();
            builder = builder
                .name(self.name)
                .object_length(self.data.len() as u32)
                .headers(info);
        }

        let capacity = self
            .max_packet_length
            .checked_sub(overhead)
            .ok_or_else(|| {
                ObexError::MalformedPacket(format!(
                    "packet ceiling {} cannot fit the {overhead} byte put header overhead",
                    self.max_packet_length
                ))
            })?;

        let remaining = &self.data[self.offset..];
        let is_final = remaining.len() <= capacity;
        let take = remaining.len().min(capacity);
        let chunk = remaining[..take].to_vec();

        self.offset += take;
        self.started = true;
        builder = if is_final {
            self.done = true;
            builder.end_of_body(chunk)
        } else {
            builder.body(chunk)
        };
        builder.build().map(Some)
    }
}
