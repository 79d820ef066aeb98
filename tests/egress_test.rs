//! Tests for the egress connection and its receiver stream

use drainscale::adapter::egress::{
    Closer, EgressConn, EgressError, EgressRequest, EgressStreamer, Envelope,
};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_stream::StreamExt;

fn request() -> EgressRequest {
    EgressRequest {
        shard_id: "test-shard".to_string(),
        source_id: "app-guid".to_string(),
    }
}

fn envelope(n: i64) -> Envelope {
    Envelope {
        timestamp: n,
        source_id: "app-guid".to_string(),
        instance_id: "0".to_string(),
        payload: format!("log line {}", n),
    }
}

/// Aggregator that verifies the subscription request, streams `count`
/// envelopes, and then closes.
async fn spawn_aggregator(count: i64) -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let (read, mut write) = socket.split();

        let mut lines = BufReader::new(read).lines();
        let line = lines.next_line().await.unwrap().unwrap();
        let subscription: EgressRequest = serde_json::from_str(&line).unwrap();
        assert_eq!(subscription.source_id, "app-guid");

        for n in 0..count {
            let mut line = serde_json::to_vec(&envelope(n)).unwrap();
            line.push(b'\n');
            write.write_all(&line).await.unwrap();
        }
    });

    addr
}

#[tokio::test]
async fn test_receiver_streams_envelopes_until_eof() {
    let addr = spawn_aggregator(2).await;

    let socket = TcpStream::connect(addr).await.unwrap();
    let (_closer, conn) = EgressConn::pair(addr.to_string(), socket);

    let mut stream = conn.receiver(request()).await.unwrap();

    assert_eq!(stream.next().await.unwrap().unwrap(), envelope(0));
    assert_eq!(stream.next().await.unwrap().unwrap(), envelope(1));
    // the aggregator hangs up after the second envelope
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_close_terminates_an_active_stream() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (_socket, _) = listener.accept().await.unwrap();
        // hold the connection open without sending anything
        tokio::time::sleep(Duration::from_secs(60)).await;
    });

    let socket = TcpStream::connect(addr).await.unwrap();
    let (closer, conn) = EgressConn::pair(addr.to_string(), socket);

    let mut stream = conn.receiver(request()).await.unwrap();
    closer.close();

    let item = tokio::time::timeout(Duration::from_secs(1), stream.next())
        .await
        .expect("close did not wake the stream");
    assert!(matches!(item, Some(Err(EgressError::Closed))));
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_single_receiver_per_connection() {
    let addr = spawn_aggregator(0).await;

    let socket = TcpStream::connect(addr).await.unwrap();
    let (_closer, conn) = EgressConn::pair(addr.to_string(), socket);

    let _stream = conn.receiver(request()).await.unwrap();
    let err = match conn.receiver(request()).await {
        Ok(_) => panic!("expected an error"),
        Err(e) => e,
    };
    assert!(matches!(err, EgressError::ReceiverInUse));
}

#[tokio::test]
async fn test_receiver_after_close_fails() {
    let addr = spawn_aggregator(0).await;

    let socket = TcpStream::connect(addr).await.unwrap();
    let (closer, conn) = EgressConn::pair(addr.to_string(), socket);

    closer.close();
    closer.close();

    assert!(conn.is_closed());
    let err = match conn.receiver(request()).await {
        Ok(_) => panic!("expected an error"),
        Err(e) => e,
    };
    assert!(matches!(err, EgressError::Closed));
}

#[tokio::test]
async fn test_malformed_envelope_ends_the_stream() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let (read, mut write) = socket.split();
        let mut lines = BufReader::new(read).lines();
        lines.next_line().await.unwrap();
        write.write_all(b"this is not an envelope\n").await.unwrap();
    });

    let socket = TcpStream::connect(addr).await.unwrap();
    let (_closer, conn) = EgressConn::pair(addr.to_string(), socket);

    let mut stream = conn.receiver(request()).await.unwrap();
    let item = stream.next().await;
    assert!(matches!(item, Some(Err(EgressError::Malformed(_)))));
    assert!(stream.next().await.is_none());
}
