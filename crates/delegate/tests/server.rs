//! Integration tests for the delegate server, handshake, and full
//! connection lifecycle over real sockets.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use delegate::prelude::*;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

// =========================================================================
// Helpers
// =========================================================================

const SECRET: &[u8] = b"test";

struct TestServer {
    addr: SocketAddr,
    registry: Arc<SessionRegistry>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<Result<(), DelegateError>>,
}

impl TestServer {
    async fn stop(mut self) -> Result<(), DelegateError> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("server should drain in time")
            .expect("server task should not panic")
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("delegate=debug")
        .with_test_writer()
        .try_init();
}

fn test_config() -> DelegateConfig {
    DelegateConfig {
        bind_addr: "127.0.0.1:0".into(),
        secret: "test".into(),
        handshake_timeout_ms: 2_000,
        idle_timeout_ms: 2_000,
        ..DelegateConfig::default()
    }
}

/// Starts a server on a random port.
async fn start_server(config: DelegateConfig) -> TestServer {
    init_tracing();
    let server = DelegateServer::builder()
        .config(config)
        .build()
        .await
        .expect("server should build");

    let addr = server.local_addr().expect("should have local addr");
    let registry = server.registry();
    let (tx, rx) = oneshot::channel();

    let handle = tokio::spawn(server.run_until(async {
        let _ = rx.await;
    }));

    TestServer {
        addr,
        registry,
        shutdown: Some(tx),
        handle,
    }
}

async fn connect(addr: SocketAddr) -> DelegateClient {
    DelegateClient::connect(addr)
        .await
        .expect("should connect")
        .with_timeout(Duration::from_secs(5))
}

/// Polls `cond` until it holds or a second passes.
async fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}

// =========================================================================
// INIT
// =========================================================================

#[tokio::test]
async fn test_init_correct_secret_issues_first_id() {
    let server = start_server(test_config()).await;
    let mut client = connect(server.addr).await;

    let reply = client.init(SECRET).await.unwrap();

    assert_eq!(reply, HandshakeReply::Session(SessionId(0)));
    assert!(server.registry.contains(SessionId(0)));
}

#[tokio::test]
async fn test_init_issues_increasing_ids_across_connections() {
    let server = start_server(test_config()).await;

    let mut clients = Vec::new();
    for expected in 0..3 {
        let mut client = connect(server.addr).await;
        let reply = client.init(SECRET).await.unwrap();
        assert_eq!(reply, HandshakeReply::Session(SessionId(expected)));
        clients.push(client);
    }
    assert_eq!(server.registry.len(), 3);
}

#[tokio::test]
async fn test_init_wrong_then_right_secret_recovers() {
    let server = start_server(test_config()).await;
    let mut client = connect(server.addr).await;

    assert_eq!(
        client.init(b"wrong").await.unwrap(),
        HandshakeReply::Rejected { remaining: 2 }
    );
    assert_eq!(
        client.init(SECRET).await.unwrap(),
        HandshakeReply::Session(SessionId(0))
    );
}

#[tokio::test]
async fn test_init_three_wrong_secrets_closes_before_fourth() {
    let server = start_server(test_config()).await;
    let mut client = connect(server.addr).await;

    for remaining in [2, 1, 0] {
        let reply = client.init(b"wrong").await.unwrap();
        assert_eq!(reply, HandshakeReply::Rejected { remaining });
    }

    // The correct secret now arrives too late: the server has stopped
    // reading and closed its side.
    let late = PacketCodec::default()
        .encode(&Packet::Init {
            secret: SECRET.to_vec(),
        })
        .unwrap();
    let _ = client.send_raw(&late).await;
    assert!(client.read_reply().await.is_err(), "expected EOF, not a reply");
    assert!(server.registry.is_empty());

    // No id was spent on the failed connection.
    let mut next = connect(server.addr).await;
    assert_eq!(
        next.init(SECRET).await.unwrap(),
        HandshakeReply::Session(SessionId(0))
    );
}

// =========================================================================
// REESTAB
// =========================================================================

#[tokio::test]
async fn test_reestab_live_session_rebinds_without_new_id() {
    let server = start_server(test_config()).await;
    let mut first = connect(server.addr).await;
    let id = first.init(SECRET).await.unwrap().session_id().unwrap();

    let mut second = connect(server.addr).await;
    let reply = second.reestablish(id).await.unwrap();

    assert_eq!(reply, HandshakeReply::Session(id));
    assert_eq!(server.registry.len(), 1);

    // The generator was not touched: the next INIT gets id 1.
    let mut third = connect(server.addr).await;
    assert_eq!(
        third.init(SECRET).await.unwrap(),
        HandshakeReply::Session(SessionId(1))
    );
}

#[tokio::test]
async fn test_reestab_old_connection_closing_keeps_session() {
    let server = start_server(test_config()).await;
    let mut first = connect(server.addr).await;
    let id = first.init(SECRET).await.unwrap().session_id().unwrap();

    let mut second = connect(server.addr).await;
    second.reestablish(id).await.unwrap();

    first.close().await.unwrap();
    drop(first);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(
        server.registry.contains(id),
        "superseded connection must not tear down the session"
    );

    second.close().await.unwrap();
    drop(second);
    assert!(eventually(|| !server.registry.contains(id)).await);
}

#[tokio::test]
async fn test_reestab_unknown_id_rejected_and_closed() {
    let server = start_server(test_config()).await;
    let mut client = connect(server.addr).await;

    let reply = client.reestablish(SessionId(0xDEAD_BEEF)).await.unwrap();

    assert_eq!(reply, HandshakeReply::Rejected { remaining: 0 });
    assert!(client.read_reply().await.is_err());
    assert!(server.registry.is_empty());
}

// =========================================================================
// Malformed input and timeouts
// =========================================================================

#[tokio::test]
async fn test_unknown_tag_rejected() {
    let server = start_server(test_config()).await;
    let mut client = connect(server.addr).await;

    client.send_raw(&[0x09]).await.unwrap();

    assert_eq!(
        client.read_reply().await.unwrap(),
        HandshakeReply::Rejected { remaining: 0 }
    );
}

#[tokio::test]
async fn test_split_init_across_writes_is_accepted() {
    let server = start_server(test_config()).await;
    let mut client = connect(server.addr).await;

    client.send_raw(&[1, b't', b'e']).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    client.send_raw(&[b's', b't', 0]).await.unwrap();

    assert_eq!(
        client.read_reply().await.unwrap(),
        HandshakeReply::Session(SessionId(0))
    );
}

#[tokio::test]
async fn test_silent_client_rejected_after_handshake_timeout() {
    let server = start_server(DelegateConfig {
        handshake_timeout_ms: 100,
        ..test_config()
    })
    .await;
    let mut client = connect(server.addr).await;

    let reply = client.read_reply().await.unwrap();

    assert_eq!(reply, HandshakeReply::Rejected { remaining: 0 });
    assert!(server.registry.is_empty());
}

#[tokio::test]
async fn test_partial_packet_then_silence_times_out() {
    let server = start_server(DelegateConfig {
        handshake_timeout_ms: 100,
        ..test_config()
    })
    .await;
    let mut stream = tokio::net::TcpStream::connect(server.addr).await.unwrap();

    // A REESTAB tag with only half its id.
    stream.write_all(&[2, 1, 2, 3, 4]).await.unwrap();

    let mut reply = Vec::new();
    stream.read_to_end(&mut reply).await.unwrap();
    assert_eq!(reply, vec![4, 0]);
}

// =========================================================================
// Teardown
// =========================================================================

#[tokio::test]
async fn test_disconnect_removes_session() {
    let server = start_server(test_config()).await;
    let mut client = connect(server.addr).await;
    let id = client.init(SECRET).await.unwrap().session_id().unwrap();
    assert!(server.registry.contains(id));

    drop(client);

    assert!(eventually(|| server.registry.is_empty()).await);
}

#[tokio::test]
async fn test_idle_timeout_removes_session() {
    let server = start_server(DelegateConfig {
        idle_timeout_ms: 100,
        ..test_config()
    })
    .await;
    let mut client = connect(server.addr).await;
    let id = client.init(SECRET).await.unwrap().session_id().unwrap();

    assert!(eventually(|| !server.registry.contains(id)).await);
}

#[tokio::test]
async fn test_relay_data_keeps_session_alive() {
    let server = start_server(DelegateConfig {
        idle_timeout_ms: 300,
        ..test_config()
    })
    .await;
    let mut client = connect(server.addr).await;
    let id = client.init(SECRET).await.unwrap().session_id().unwrap();

    for _ in 0..5 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        client.send_raw(b"payload").await.unwrap();
    }

    assert!(server.registry.contains(id));
}

// =========================================================================
// Concurrency and shutdown
// =========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_clients_get_distinct_ids() {
    const CLIENTS: usize = 32;
    let server = start_server(test_config()).await;

    let mut tasks = Vec::new();
    for _ in 0..CLIENTS {
        let addr = server.addr;
        tasks.push(tokio::spawn(async move {
            let mut client = connect(addr).await;
            let id = client.init(SECRET).await.unwrap().session_id().unwrap();
            (id, client)
        }));
    }

    let mut ids = Vec::new();
    let mut clients = Vec::new();
    for task in tasks {
        let (id, client) = task.await.unwrap();
        ids.push(id.0);
        clients.push(client);
    }
    ids.sort_unstable();

    assert_eq!(ids, (0..CLIENTS as u64).collect::<Vec<_>>());
    assert_eq!(server.registry.len(), CLIENTS);
}

#[tokio::test]
async fn test_shutdown_drains_in_flight_connections() {
    let server = start_server(test_config()).await;
    let registry = Arc::clone(&server.registry);
    let mut client = connect(server.addr).await;
    client.init(SECRET).await.unwrap();

    let closer = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        client.close().await.unwrap();
        client
    });

    server.stop().await.unwrap();

    assert!(registry.is_empty(), "drained workers release their sessions");
    drop(closer.await.unwrap());
}

#[tokio::test]
async fn test_shutdown_with_no_connections_returns_promptly() {
    let server = start_server(test_config()).await;
    server.stop().await.unwrap();
}
