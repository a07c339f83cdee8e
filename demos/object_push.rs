//! Object push over a loopback stream.
//!
//! This example demonstrates:
//! - Establishing an OBEX session with `connect`
//! - Pushing an object that spans multiple Put packets
//! - Tearing the session down with `disconnect`
//!
//! The peer here is an in-process object-push server on the other half of a
//! duplex pipe; point the client at an RFCOMM socket for the real thing.
//!
//! ```sh
//! cargo run --example object_push
//! ```

use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};
use tracing::info;

use obex_client::protocol::header::id;
use obex_client::protocol::{HeaderList, PacketBuffer};
use obex_client::{ObexClient, SessionConfig};

/// Minimal scripted object-push peer: accepts the session, collects one
/// object, acknowledges the disconnect.
async fn object_push_peer(mut stream: DuplexStream) -> Vec<u8> {
    let mut assembler = PacketBuffer::new();
    let mut buf = vec![0u8; 4096];
    let mut pending = Vec::new();
    let mut object = Vec::new();

    loop {
        if pending.is_empty() {
            let n = stream.read(&mut buf).await.expect("peer read");
            pending = assembler.push(&buf[..n]).expect("well-formed request");
            continue;
        }
        let request = pending.remove(0);
        match request.raw_opcode() {
            0x80 => {
                // Accept, advertise a small ceiling so the push chunks.
                stream
                    .write_all(&[0xA0, 0x00, 0x07, 0x10, 0x00, 0x01, 0x00])
                    .await
                    .expect("peer write");
            }
            0x02 => {
                let headers = request.headers().expect("put headers");
                object.extend_from_slice(headers.bytes(id::BODY).unwrap_or_default());
                stream.write_all(&[0x90, 0x00, 0x03]).await.expect("peer write");
            }
            0x82 => {
                let headers = request.headers().expect("put headers");
                object.extend_from_slice(headers.bytes(id::END_OF_BODY).unwrap_or_default());
                stream.write_all(&[0xA0, 0x00, 0x03]).await.expect("peer write");
            }
            0x81 => {
                stream.write_all(&[0xA0, 0x00, 0x03]).await.expect("peer write");
                return object;
            }
            other => panic!("unexpected request opcode 0x{other:02x}"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let (client_io, server_io) = duplex(8192);
    let peer = tokio::spawn(object_push_peer(server_io));

    let payload: Vec<u8> = (0..1024u32).map(|v| (v % 251) as u8).collect();

    let mut client = ObexClient::with_config(client_io, SessionConfig::default());
    let response = client.connect(HeaderList::new()).await?;
    info!(
        code = response.code(),
        max_packet_length = response.max_packet_length(),
        "connected"
    );

    client.put("hello.bin", &payload).await?;
    info!(bytes = payload.len(), "object pushed");

    client.disconnect().await?;
    info!("disconnected");

    let received = peer.await.expect("peer task");
    assert_eq!(received, payload);
    info!("peer received an identical object");
    Ok(())
}
