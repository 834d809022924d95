//! Integration tests for reading packets off a live TCP connection.
//!
//! The important property here is "read until complete": a packet split
//! across several TCP segments must decode exactly like one that arrived
//! in a single write.

use std::time::Duration;

use delegate_protocol::{Packet, PacketCodec, ProtocolError, SessionId, Tag};
use delegate_transport::{TcpConnection, TcpTransport, Transport};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

// =========================================================================
// Helpers
// =========================================================================

async fn accepted_pair() -> (TcpConnection, TcpStream) {
    let mut transport = TcpTransport::bind("127.0.0.1:0").await.unwrap();
    let addr = transport.local_addr().unwrap();
    let accept = tokio::spawn(async move { transport.accept().await.unwrap() });
    let client = TcpStream::connect(addr).await.unwrap();
    (accept.await.unwrap(), client)
}

/// Writes `chunks` one at a time with a short pause between them so they
/// arrive as separate segments.
async fn dribble(client: &mut TcpStream, chunks: &[&[u8]]) {
    for chunk in chunks {
        client.write_all(chunk).await.unwrap();
        client.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn test_read_init_split_across_segments() {
    let (mut server, mut client) = accepted_pair().await;
    let codec = PacketCodec::default();

    let writer = tokio::spawn(async move {
        dribble(&mut client, &[b"\x01te", b"s", b"t\0"]).await;
        client
    });

    let packet = codec.read(&mut server).await.unwrap();
    assert_eq!(
        packet,
        Packet::Init {
            secret: b"test".to_vec()
        }
    );
    drop(writer.await.unwrap());
}

#[tokio::test]
async fn test_read_reestab_split_across_segments() {
    let (mut server, mut client) = accepted_pair().await;
    let codec = PacketCodec::default();
    let wire = SessionId(0xDEAD_BEEF).to_wire();

    let writer = tokio::spawn(async move {
        dribble(&mut client, &[&[2], &wire[..3], &wire[3..]]).await;
        client
    });

    let packet = codec.read(&mut server).await.unwrap();
    assert_eq!(
        packet,
        Packet::Reestab {
            session_id: SessionId(0xDEAD_BEEF)
        }
    );
    drop(writer.await.unwrap());
}

#[tokio::test]
async fn test_read_two_packets_back_to_back() {
    // Two packets in a single write must still come out as two packets.
    let (mut server, mut client) = accepted_pair().await;
    let codec = PacketCodec::default();

    let mut bytes = codec
        .encode(&Packet::Init {
            secret: b"a".to_vec(),
        })
        .unwrap();
    bytes.extend(codec.encode(&Packet::Reject { remaining: 1 }).unwrap());
    client.write_all(&bytes).await.unwrap();

    assert_eq!(
        codec.read(&mut server).await.unwrap(),
        Packet::Init {
            secret: b"a".to_vec()
        }
    );
    assert_eq!(
        codec.read(&mut server).await.unwrap(),
        Packet::Reject { remaining: 1 }
    );
}

#[tokio::test]
async fn test_read_eof_before_tag_is_disconnect() {
    let (mut server, client) = accepted_pair().await;
    drop(client);

    let err = PacketCodec::default().read(&mut server).await.unwrap_err();
    assert!(err.is_disconnect(), "expected disconnect, got {err:?}");
}

#[tokio::test]
async fn test_read_eof_mid_packet_is_truncated() {
    let (mut server, mut client) = accepted_pair().await;
    client.write_all(&[2, 1, 2]).await.unwrap();
    client.shutdown().await.unwrap();

    let err = PacketCodec::default().read(&mut server).await.unwrap_err();
    assert!(
        matches!(
            err,
            ProtocolError::Truncated {
                tag: Tag::Reestab,
                ..
            }
        ),
        "expected truncated REESTAB, got {err:?}"
    );
    assert!(!err.is_disconnect());
}

#[tokio::test]
async fn test_read_unknown_tag_returns_error() {
    let (mut server, mut client) = accepted_pair().await;
    client.write_all(&[0x7F]).await.unwrap();

    let err = PacketCodec::default().read(&mut server).await.unwrap_err();
    assert!(matches!(err, ProtocolError::UnknownTag(0x7F)));
}

#[tokio::test]
async fn test_read_oversized_secret_returns_too_long() {
    let (mut server, mut client) = accepted_pair().await;
    client.write_all(b"\x01abcdefgh\0").await.unwrap();

    let err = PacketCodec::new(4).read(&mut server).await.unwrap_err();
    assert!(matches!(err, ProtocolError::SecretTooLong { limit: 4 }));
}

#[tokio::test]
async fn test_read_init_with_unbounded_limit_does_not_overflow() {
    let (mut server, mut client) = accepted_pair().await;
    client.write_all(b"\x01test\0").await.unwrap();

    let packet = PacketCodec::new(usize::MAX).read(&mut server).await.unwrap();

    assert_eq!(
        packet,
        Packet::Init {
            secret: b"test".to_vec()
        }
    );
}

#[tokio::test]
async fn test_write_is_readable_by_peer_connection() {
    let mut transport = TcpTransport::bind("127.0.0.1:0").await.unwrap();
    let addr = transport.local_addr().unwrap();
    let accept = tokio::spawn(async move { transport.accept().await.unwrap() });
    let mut client = TcpConnection::connect(addr).await.unwrap();
    let mut server = accept.await.unwrap();
    let codec = PacketCodec::default();

    let sent = Packet::SessionId {
        session_id: SessionId(3),
    };
    codec.write(&mut server, &sent).await.unwrap();

    assert_eq!(codec.read(&mut client).await.unwrap(), sent);
}
