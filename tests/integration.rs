//! Integration tests for respwire.
//!
//! Each test runs a scripted server on a loopback listener: the script
//! asserts the exact bytes the client writes and replies with canned wire
//! data, so the whole stack — encoder, frame buffer, parser, connection
//! state machine — is exercised end to end.

use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use respwire::{
    ConnectionConfig, ConnectionState, PushKind, RedisConnection, RedisError, RespValue,
};

/// Bind a loopback listener and run the given script on the first accepted
/// connection.
async fn spawn_server<F, Fut>(script: F) -> (SocketAddr, JoinHandle<()>)
where
    F: FnOnce(TcpStream) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        script(stream).await;
    });
    (addr, handle)
}

async fn connect(addr: SocketAddr) -> RedisConnection {
    let mut connection = RedisConnection::new(ConnectionConfig {
        host: addr.ip().to_string(),
        port: addr.port(),
        label: Some("itest".to_string()),
    });
    connection.connect().await.unwrap();
    connection
}

/// Read and assert the exact bytes of one encoded command.
async fn expect_command(stream: &mut TcpStream, args: &[&str]) {
    let expected = RespValue::command(args.iter().copied()).encode().unwrap();
    let mut buf = vec![0u8; expected.len()];
    stream.read_exact(&mut buf).await.unwrap();
    assert_eq!(
        buf,
        expected,
        "unexpected command bytes for {:?}",
        args
    );
}

#[tokio::test]
async fn test_connect_and_disconnect_states() {
    let (addr, handle) = spawn_server(|_stream| async {}).await;

    let mut connection = connect(addr).await;
    assert_eq!(connection.state(), ConnectionState::Ready);

    connection.disconnect().await.unwrap();
    assert_eq!(connection.state(), ConnectionState::Cancelled);
    handle.await.unwrap();
}

#[tokio::test]
async fn test_connect_failure_sets_failed_state() {
    // Grab a port with nothing listening on it.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut connection = RedisConnection::new(ConnectionConfig {
        host: addr.ip().to_string(),
        port: addr.port(),
        label: None,
    });
    assert!(matches!(
        connection.connect().await,
        Err(RedisError::Io(_))
    ));
    assert!(matches!(connection.state(), ConnectionState::Failed(_)));
}

#[tokio::test]
async fn test_set_then_get() {
    let (addr, handle) = spawn_server(|mut stream| async move {
        expect_command(&mut stream, &["SET", "foo", "bar"]).await;
        stream.write_all(b"+OK\r\n").await.unwrap();
        expect_command(&mut stream, &["GET", "foo"]).await;
        stream.write_all(b"$3\r\nbar\r\n").await.unwrap();
    })
    .await;

    let mut connection = connect(addr).await;
    let reply = connection.send_command(["SET", "foo", "bar"]).await.unwrap();
    assert_eq!(reply, RespValue::SimpleString("OK".into()));

    let reply = connection.send_command(["GET", "foo"]).await.unwrap();
    assert_eq!(reply, RespValue::BlobString(b"bar".to_vec()));
    assert_eq!(reply.string_value().unwrap(), "bar");
    handle.await.unwrap();
}

#[tokio::test]
async fn test_replies_ordered_across_one_packet() {
    let (addr, handle) = spawn_server(|mut stream| async move {
        expect_command(&mut stream, &["PING"]).await;
        // Both replies land in a single packet; the second must be buffered
        // for the second request.
        stream.write_all(b"+A\r\n+B\r\n").await.unwrap();
        expect_command(&mut stream, &["PING"]).await;
    })
    .await;

    let mut connection = connect(addr).await;
    let first = connection.send_command(["PING"]).await.unwrap();
    assert_eq!(first, RespValue::SimpleString("A".into()));
    let second = connection.send_command(["PING"]).await.unwrap();
    assert_eq!(second, RespValue::SimpleString("B".into()));
    handle.await.unwrap();
}

#[tokio::test]
async fn test_send_no_receive_then_explicit_receive() {
    let (addr, handle) = spawn_server(|mut stream| async move {
        expect_command(&mut stream, &["PING"]).await;
        stream.write_all(b"+PONG\r\n").await.unwrap();
    })
    .await;

    let mut connection = connect(addr).await;
    connection.send_command_no_receive(["PING"]).await.unwrap();
    let reply = connection.receive().await.unwrap();
    assert_eq!(reply, RespValue::SimpleString("PONG".into()));
    handle.await.unwrap();
}

#[tokio::test]
async fn test_hello_handshake() {
    let (addr, handle) = spawn_server(|mut stream| async move {
        expect_command(
            &mut stream,
            &["HELLO", "3", "AUTH", "default", "hunter2", "SETNAME", "itest-client"],
        )
        .await;
        stream
            .write_all(
                b"%3\r\n$6\r\nserver\r\n$5\r\nredis\r\n$5\r\nproto\r\n:3\r\n$4\r\nrole\r\n$6\r\nmaster\r\n",
            )
            .await
            .unwrap();
    })
    .await;

    let mut connection = connect(addr).await;
    connection
        .hello("default", "hunter2", Some("itest-client"))
        .await
        .unwrap();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_hello_rejects_wrong_proto_version() {
    let (addr, handle) = spawn_server(|mut stream| async move {
        expect_command(&mut stream, &["HELLO", "3", "AUTH", "default", "pw"]).await;
        stream
            .write_all(b"%1\r\n$5\r\nproto\r\n:2\r\n")
            .await
            .unwrap();
    })
    .await;

    let mut connection = connect(addr).await;
    assert!(matches!(
        connection.hello("default", "pw", None).await,
        Err(RedisError::AuthenticationFailure)
    ));
    handle.await.unwrap();
}

#[tokio::test]
async fn test_hello_rejects_error_reply() {
    let (addr, handle) = spawn_server(|mut stream| async move {
        expect_command(&mut stream, &["HELLO", "3", "AUTH", "default", "wrong"]).await;
        stream
            .write_all(b"-WRONGPASS invalid username-password pair\r\n")
            .await
            .unwrap();
    })
    .await;

    let mut connection = connect(addr).await;
    assert!(matches!(
        connection.hello("default", "wrong", None).await,
        Err(RedisError::AuthenticationFailure)
    ));
    handle.await.unwrap();
}

#[tokio::test]
async fn test_authenticate() {
    let (addr, handle) = spawn_server(|mut stream| async move {
        expect_command(&mut stream, &["AUTH", "hunter2"]).await;
        stream.write_all(b"+OK\r\n").await.unwrap();
        expect_command(&mut stream, &["AUTH", "wrong"]).await;
        stream.write_all(b"-ERR invalid password\r\n").await.unwrap();
    })
    .await;

    let mut connection = connect(addr).await;
    connection.authenticate("hunter2").await.unwrap();
    assert!(matches!(
        connection.authenticate("wrong").await,
        Err(RedisError::AuthenticationFailure)
    ));
    handle.await.unwrap();
}

#[tokio::test]
async fn test_publish_returns_receiver_count() {
    let (addr, handle) = spawn_server(|mut stream| async move {
        expect_command(&mut stream, &["PUBLISH", "news", "hello"]).await;
        stream.write_all(b":2\r\n").await.unwrap();
    })
    .await;

    let mut connection = connect(addr).await;
    let receivers = connection.publish("news", "hello").await.unwrap();
    assert_eq!(receivers, 2);
    handle.await.unwrap();
}

fn subscribe_confirmation(channel: &str, count: i64) -> Vec<u8> {
    let mut frame = format!(">3\r\n$9\r\nsubscribe\r\n${}\r\n{}\r\n", channel.len(), channel)
        .into_bytes();
    frame.extend_from_slice(format!(":{}\r\n", count).as_bytes());
    frame
}

fn message_push(channel: &str, payload: &str) -> Vec<u8> {
    format!(
        ">3\r\n$7\r\nmessage\r\n${}\r\n{}\r\n${}\r\n{}\r\n",
        channel.len(),
        channel,
        payload.len(),
        payload
    )
    .into_bytes()
}

#[tokio::test]
async fn test_subscribe_and_stream_messages() {
    let (addr, handle) = spawn_server(|mut stream| async move {
        expect_command(&mut stream, &["SUBSCRIBE", "a", "b"]).await;
        let mut reply = subscribe_confirmation("a", 1);
        reply.extend(subscribe_confirmation("b", 2));
        reply.extend(message_push("a", "first"));
        reply.extend(message_push("b", "second"));
        stream.write_all(&reply).await.unwrap();
    })
    .await;

    let mut connection = connect(addr).await;
    let mut subscriber = connection.subscribe(&["a", "b"]).await.unwrap();

    let message = subscriber.next_message().await.unwrap();
    assert_eq!(message.kind, PushKind::Message);
    assert_eq!(message.channel, "a");
    assert_eq!(message.payload.string_value().unwrap(), "first");

    let message = subscriber.next_message().await.unwrap();
    assert_eq!(message.channel, "b");
    assert_eq!(message.payload.string_value().unwrap(), "second");
    handle.await.unwrap();
}

#[tokio::test]
async fn test_subscribe_rejects_partial_confirmation() {
    let (addr, handle) = spawn_server(|mut stream| async move {
        expect_command(&mut stream, &["SUBSCRIBE", "a", "b"]).await;
        let mut reply = subscribe_confirmation("a", 1);
        // The server confirms a channel that was never requested.
        reply.extend(subscribe_confirmation("c", 2));
        stream.write_all(&reply).await.unwrap();
    })
    .await;

    let mut connection = connect(addr).await;
    assert!(matches!(
        connection.subscribe(&["a", "b"]).await,
        Err(RedisError::PartialSubscribe)
    ));
    handle.await.unwrap();
}

#[tokio::test]
async fn test_subscribe_rejects_non_push_confirmation() {
    let (addr, handle) = spawn_server(|mut stream| async move {
        expect_command(&mut stream, &["SUBSCRIBE", "a"]).await;
        stream.write_all(b"+OK\r\n").await.unwrap();
    })
    .await;

    let mut connection = connect(addr).await;
    assert!(matches!(
        connection.subscribe(&["a"]).await,
        Err(RedisError::MessageReceiveFailure)
    ));
    handle.await.unwrap();
}

#[tokio::test]
async fn test_subscriber_mode_is_irreversible() {
    let (addr, handle) = spawn_server(|mut stream| async move {
        expect_command(&mut stream, &["SUBSCRIBE", "a"]).await;
        stream
            .write_all(&subscribe_confirmation("a", 1))
            .await
            .unwrap();
    })
    .await;

    let mut connection = connect(addr).await;
    let subscriber = connection.subscribe(&["a"]).await.unwrap();
    drop(subscriber);

    // Back in control of the connection, but still in subscriber mode.
    assert!(matches!(
        connection.publish("a", "x").await,
        Err(RedisError::UnexpectedState)
    ));
    assert!(matches!(
        connection.send_command(["PING"]).await,
        Err(RedisError::UnexpectedState)
    ));
    handle.await.unwrap();
}

#[tokio::test]
async fn test_subscriber_stream_rejects_non_push_value() {
    let (addr, handle) = spawn_server(|mut stream| async move {
        expect_command(&mut stream, &["SUBSCRIBE", "a"]).await;
        let mut reply = subscribe_confirmation("a", 1);
        reply.extend_from_slice(b":99\r\n");
        stream.write_all(&reply).await.unwrap();
    })
    .await;

    let mut connection = connect(addr).await;
    let mut subscriber = connection.subscribe(&["a"]).await.unwrap();
    assert!(matches!(
        subscriber.next_message().await,
        Err(RedisError::MessageReceiveFailure)
    ));
    handle.await.unwrap();
}

#[tokio::test]
async fn test_send_all_writes_one_block() {
    let commands: Vec<RespValue> = (0..3)
        .map(|i| {
            RespValue::command(vec![
                "PUBLISH".to_string(),
                "news".to_string(),
                i.to_string(),
            ])
        })
        .collect();
    let mut expected = Vec::new();
    for command in &commands {
        command.encode_into(&mut expected).unwrap();
    }

    let (addr, handle) = spawn_server(move |mut stream| async move {
        let mut buf = vec![0u8; expected.len()];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, expected);
        expect_command(&mut stream, &["PUBLISH", "news", "STOP"]).await;
        stream.write_all(b":1\r\n").await.unwrap();
    })
    .await;

    let mut connection = connect(addr).await;
    connection.send_all(&commands).await.unwrap();
    // A regular publish afterwards proves the stream position is intact.
    assert_eq!(connection.publish("news", "STOP").await.unwrap(), 1);
    handle.await.unwrap();
}

#[tokio::test]
async fn test_peer_close_fails_pending_receive() {
    let (addr, handle) = spawn_server(|mut stream| async move {
        expect_command(&mut stream, &["PING"]).await;
        // Close without replying.
    })
    .await;

    let mut connection = connect(addr).await;
    assert!(matches!(
        connection.send_command(["PING"]).await,
        Err(RedisError::ConnectionClosed)
    ));
    assert!(matches!(connection.state(), ConnectionState::Failed(_)));
    handle.await.unwrap();
}

#[tokio::test]
async fn test_parse_error_is_connection_fatal() {
    let (addr, handle) = spawn_server(|mut stream| async move {
        expect_command(&mut stream, &["PING"]).await;
        stream.write_all(b"@garbage\r\n").await.unwrap();
    })
    .await;

    let mut connection = connect(addr).await;
    assert!(matches!(
        connection.send_command(["PING"]).await,
        Err(RedisError::UnknownHeader('@'))
    ));
    assert!(matches!(connection.state(), ConnectionState::Failed(_)));
    handle.await.unwrap();
}

#[tokio::test]
async fn test_fragmented_reply_is_reassembled() {
    let (addr, handle) = spawn_server(|mut stream| async move {
        expect_command(&mut stream, &["GET", "big"]).await;
        // Dribble a single reply out in three writes.
        stream.write_all(b"$10\r\nfrag").await.unwrap();
        stream.flush().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        stream.write_all(b"mented").await.unwrap();
        stream.flush().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        stream.write_all(b"\r\n").await.unwrap();
    })
    .await;

    let mut connection = connect(addr).await;
    let reply = connection.send_command(["GET", "big"]).await.unwrap();
    assert_eq!(reply, RespValue::BlobString(b"fragmented".to_vec()));
    handle.await.unwrap();
}

#[tokio::test]
async fn test_state_feed_reports_ready() {
    let (addr, handle) = spawn_server(|_stream| async {}).await;

    let mut connection = RedisConnection::new(ConnectionConfig {
        host: addr.ip().to_string(),
        port: addr.port(),
        label: None,
    });
    let feed = connection.state_changes();
    connection.connect().await.unwrap();
    assert_eq!(*feed.borrow(), ConnectionState::Ready);
    handle.await.unwrap();
}
