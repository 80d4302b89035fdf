//! Integration tests for the stream and TCP transports.

use drawbridge_transport::{Connection, StreamConnection, TcpTransport, Transport};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

// =========================================================================
// StreamConnection over an in-memory pipe
// =========================================================================

#[tokio::test]
async fn test_send_reaches_peer_in_order() {
    let (server_side, mut client_side) = tokio::io::duplex(1024);
    let conn = StreamConnection::new(server_side, None);

    conn.send(b"hello ").await.expect("send should succeed");
    conn.send(b"world").await.expect("send should succeed");

    let mut buf = [0u8; 11];
    client_side.read_exact(&mut buf).await.expect("read");
    assert_eq!(&buf, b"hello world");
}

#[tokio::test]
async fn test_recv_returns_written_bytes() {
    let (server_side, mut client_side) = tokio::io::duplex(1024);
    let conn = StreamConnection::new(server_side, None);

    client_side.write_all(&[1, 2, 3]).await.expect("write");

    let data = conn.recv().await.expect("recv").expect("some data");
    assert_eq!(data, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_recv_after_peer_drop_returns_none() {
    let (server_side, client_side) = tokio::io::duplex(64);
    let conn = StreamConnection::new(server_side, None);
    drop(client_side);

    assert!(conn.recv().await.expect("recv").is_none());
}

#[tokio::test]
async fn test_close_gives_peer_eof() {
    let (server_side, mut client_side) = tokio::io::duplex(64);
    let conn = StreamConnection::new(server_side, None);

    conn.close().await.expect("close");

    let mut buf = Vec::new();
    let n = client_side.read_to_end(&mut buf).await.expect("read");
    assert_eq!(n, 0);
}

#[tokio::test]
async fn test_new_connections_get_distinct_ids() {
    let (a, _keep_a) = tokio::io::duplex(8);
    let (b, _keep_b) = tokio::io::duplex(8);
    let first = StreamConnection::new(a, None);
    let second = StreamConnection::new(b, None);
    assert_ne!(first.id(), second.id());
}

// =========================================================================
// TcpTransport
// =========================================================================

#[tokio::test]
async fn test_tcp_accept_exchanges_bytes() {
    let mut transport = TcpTransport::bind("127.0.0.1:0").await.expect("bind");
    let addr = transport.local_addr().expect("local addr");

    let client = tokio::spawn(async move {
        let mut stream = TcpStream::connect(addr).await.expect("connect");
        stream.write_all(b"ping").await.expect("write");
        let mut buf = [0u8; 4];
        stream.read_exact(&mut buf).await.expect("read");
        buf
    });

    let conn = transport.accept().await.expect("accept");
    assert!(conn.peer_addr().is_some());

    let data = conn.recv().await.expect("recv").expect("data");
    assert_eq!(data, b"ping");
    conn.send(b"pong").await.expect("send");

    assert_eq!(&client.await.expect("client task"), b"pong");
}
