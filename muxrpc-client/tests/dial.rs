mod common;

use std::time::{Duration, Instant};

use muxrpc_client::{
    Client, ClientError, CodecType, Options, dial, dial_http, dial_http_with, dial_with, xdial,
    xdial_with,
};
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;

use common::{MemoryDialer, Peer, answer_connect};

/// Serve a single `Echo.Upper` call on `peer`.
async fn echo_once<S>(mut peer: Peer<S>)
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let (header, word) = peer.recv::<String>().await;
    assert_eq!(header.service_method, "Echo.Upper");
    peer.reply(&header, &word.to_uppercase()).await;
}

async fn assert_echo(client: &Client) {
    let reply: String = client.call("Echo.Upper", "ping").await.unwrap();
    assert_eq!(reply, "PING");
}

#[tokio::test]
async fn test_dial_with_custom_dialer() {
    let dialer = MemoryDialer::default();
    let server_end = dialer.push();
    let server = tokio::spawn(async move { echo_once(Peer::accept(server_end).await).await });

    let client = dial_with(&dialer, "tcp", "memory:1", Options::new()).await.unwrap();
    assert_echo(&client).await;
    server.await.unwrap();

    assert_eq!(dialer.dialed(), vec![("tcp".to_string(), "memory:1".to_string())]);
}

#[tokio::test]
async fn test_dial_http_with_tunnel() {
    let dialer = MemoryDialer::default();
    let server_end = dialer.push();
    let server = tokio::spawn(async move { echo_once(Peer::accept_http(server_end).await).await });

    let client = dial_http_with(&dialer, "tcp", "memory:2", Options::new()).await.unwrap();
    assert_echo(&client).await;
    server.await.unwrap();
}

#[tokio::test]
async fn test_dial_http_rejected() {
    let dialer = MemoryDialer::default();
    let server_end = dialer.push();
    let server = tokio::spawn(async move { answer_connect(server_end, "404 Not Found").await });

    let err = dial_http_with(&dialer, "tcp", "memory:3", Options::new())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ClientError::Protocol("unexpected HTTP response: 404 Not Found".into())
    );
    drop(server.await.unwrap());
}

#[tokio::test]
async fn test_dial_http_slow_server_times_out() {
    let dialer = MemoryDialer::default();
    let mut server_end = dialer.push();
    let server = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        // The client gave up, so only the CONNECT request is ever seen.
        let mut received = Vec::new();
        server_end.read_to_end(&mut received).await.unwrap();
        received
    });

    let timeout = Duration::from_millis(100);
    let start = Instant::now();
    let err = dial_http_with(&dialer, "tcp", "memory:4", Options::new().connect_timeout(timeout))
        .await
        .unwrap_err();
    let elapsed = start.elapsed();

    assert_eq!(err, ClientError::Timeout(timeout));
    assert!(elapsed >= timeout, "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(190), "{elapsed:?}");

    let received = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("abandoned transport should be closed")
        .unwrap();
    assert_eq!(received, b"CONNECT /_muxrpc_ HTTP/1.0\n\n");
}

#[tokio::test]
async fn test_xdial_routes_by_scheme() {
    let dialer = MemoryDialer::default();

    let plain = dialer.push();
    let server = tokio::spawn(async move { echo_once(Peer::accept(plain).await).await });
    let client = xdial_with(&dialer, "tcp@memory:5", Options::new()).await.unwrap();
    assert_echo(&client).await;
    server.await.unwrap();

    let tunneled = dialer.push();
    let server = tokio::spawn(async move { echo_once(Peer::accept_http(tunneled).await).await });
    let client = xdial_with(&dialer, "http@memory:6", Options::new()).await.unwrap();
    assert_echo(&client).await;
    server.await.unwrap();

    let unix = dialer.push();
    let server = tokio::spawn(async move { echo_once(Peer::accept(unix).await).await });
    let client = xdial_with(&dialer, "unix@/tmp/muxrpc.sock", Options::new())
        .await
        .unwrap();
    assert_echo(&client).await;
    server.await.unwrap();

    assert_eq!(
        dialer.dialed(),
        vec![
            ("tcp".to_string(), "memory:5".to_string()),
            ("tcp".to_string(), "memory:6".to_string()),
            ("unix".to_string(), "/tmp/muxrpc.sock".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_xdial_rejects_malformed_addresses() {
    let dialer = MemoryDialer::default();

    for bad in ["memory:7", "tcp@", "@memory:7", "tcp@memory@7"] {
        let err = xdial_with(&dialer, bad, Options::new()).await.unwrap_err();
        assert!(matches!(err, ClientError::Config(_)), "{bad:?}: {err:?}");
    }
    assert!(dialer.dialed().is_empty());
}

#[tokio::test]
async fn test_builder_sends_options() {
    let dialer = MemoryDialer::default();
    let server_end = dialer.push();
    let server = tokio::spawn(async move {
        let peer = Peer::accept(server_end).await;
        let options = peer.options;
        echo_once(peer).await;
        options
    });

    let client = Client::builder("tcp@memory:8")
        .codec(CodecType::Json)
        .handle_timeout(Duration::from_secs(3))
        .dialer(dialer.clone())
        .connect()
        .await
        .unwrap();
    assert_eq!(client.codec(), CodecType::Json);
    assert_echo(&client).await;

    let seen = server.await.unwrap();
    assert_eq!(seen.codec_type(), CodecType::Json);
    assert_eq!(seen.get_handle_timeout(), Duration::from_secs(3));
    assert_eq!(seen.magic_number(), muxrpc_client::MAGIC_NUMBER);
}

#[tokio::test]
async fn test_tcp_loopback() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let server = tokio::spawn(async move {
        for _ in 0..2 {
            let (stream, _) = listener.accept().await.unwrap();
            echo_once(Peer::accept(stream).await).await;
        }
    });

    let client = dial("tcp", &addr, Options::new()).await.unwrap();
    assert_echo(&client).await;

    let client = xdial(&format!("tcp@{addr}"), Options::new()).await.unwrap();
    assert_echo(&client).await;

    server.await.unwrap();
}

#[tokio::test]
async fn test_http_over_tcp_loopback() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        echo_once(Peer::accept_http(stream).await).await;
    });

    let client = dial_http("tcp", &addr, Options::new().codec(CodecType::Json))
        .await
        .unwrap();
    assert_echo(&client).await;
    server.await.unwrap();
}

#[cfg(unix)]
#[tokio::test]
async fn test_unix_socket() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("muxrpc.sock");

    let listener = tokio::net::UnixListener::bind(&path).unwrap();
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        echo_once(Peer::accept(stream).await).await;
    });

    let client = xdial(&format!("unix@{}", path.display()), Options::new())
        .await
        .unwrap();
    assert_echo(&client).await;
    server.await.unwrap();
}

#[tokio::test]
async fn test_dial_refused() {
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().to_string()
    };

    let err = dial("tcp", &addr, Options::new()).await.unwrap_err();
    assert!(matches!(err, ClientError::Transport(_)), "{err:?}");
}
