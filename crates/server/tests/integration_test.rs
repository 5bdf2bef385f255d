use bytes::{Bytes, BytesMut};
use std::io::Cursor;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::time::Duration;

use brisadb_protocol::Frame;
use brisadb_storage::Db;

/// Sobe um servidor numa porta efêmera e retorna o endereço.
async fn start_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        brisadb_server::run(listener, Db::new(), 64, std::future::pending::<()>())
            .await
            .unwrap();
    });
    addr
}

async fn connect(addr: SocketAddr) -> TcpStream {
    TcpStream::connect(addr).await.unwrap()
}

/// Helper: envia bytes crus.
async fn send_bytes(stream: &mut TcpStream, data: &[u8]) {
    stream.write_all(data).await.unwrap();
    stream.flush().await.unwrap();
}

/// Helper: envia um comando sem ler a resposta.
async fn send_raw(stream: &mut TcpStream, args: &[&str]) {
    let mut buf = BytesMut::new();
    Frame::array_from_strs(args).encode(&mut buf);
    send_bytes(stream, &buf).await;
}

/// Helper: lê um frame de resposta e retorna também os bytes crus.
async fn read_reply(stream: &mut TcpStream) -> (Frame, Vec<u8>) {
    let mut response_buf = BytesMut::with_capacity(4096);
    loop {
        let n = stream.read_buf(&mut response_buf).await.unwrap();
        assert!(n > 0, "server closed connection unexpectedly");

        let mut cursor = Cursor::new(&response_buf[..]);
        if Frame::check(&mut cursor).is_ok() {
            let len = cursor.position() as usize;
            cursor.set_position(0);
            let frame = Frame::parse(&mut cursor).unwrap();
            return (frame, response_buf[..len].to_vec());
        }
    }
}

async fn send_command(stream: &mut TcpStream, args: &[&str]) -> Frame {
    send_raw(stream, args).await;
    read_reply(stream).await.0
}

#[tokio::test]
async fn test_ping_pong_wire_bytes() {
    let addr = start_server().await;
    let mut stream = connect(addr).await;

    send_raw(&mut stream, &["PING"]).await;
    let (frame, raw) = read_reply(&mut stream).await;
    assert_eq!(frame, Frame::Simple("PONG".into()));
    assert_eq!(raw, b"+PONG\r\n");
}

#[tokio::test]
async fn test_echo() {
    let addr = start_server().await;
    let mut stream = connect(addr).await;

    let response = send_command(&mut stream, &["ECHO", "Olá, BrisaDB!"]).await;
    assert_eq!(response, Frame::Bulk(Bytes::from("Olá, BrisaDB!")));
}

#[tokio::test]
async fn test_set_get_and_missing() {
    let addr = start_server().await;
    let mut stream = connect(addr).await;

    let response = send_command(&mut stream, &["SET", "mykey", "myvalue"]).await;
    assert_eq!(response, Frame::Simple("OK".into()));

    let response = send_command(&mut stream, &["GET", "mykey"]).await;
    assert_eq!(response, Frame::Bulk(Bytes::from("myvalue")));

    send_raw(&mut stream, &["GET", "missing"]).await;
    let (frame, raw) = read_reply(&mut stream).await;
    assert_eq!(frame, Frame::Null);
    assert_eq!(raw, b"$-1\r\n");
}

#[tokio::test]
async fn test_set_with_px() {
    let addr = start_server().await;
    let mut stream = connect(addr).await;

    let response = send_command(&mut stream, &["SET", "temp", "val", "PX", "100"]).await;
    assert_eq!(response, Frame::Simple("OK".into()));

    let response = send_command(&mut stream, &["GET", "temp"]).await;
    assert_eq!(response, Frame::Bulk(Bytes::from("val")));

    tokio::time::sleep(Duration::from_millis(150)).await;

    let response = send_command(&mut stream, &["GET", "temp"]).await;
    assert_eq!(response, Frame::Null);
}

#[tokio::test]
async fn test_list_operations() {
    let addr = start_server().await;
    let mut stream = connect(addr).await;

    let response = send_command(&mut stream, &["RPUSH", "list", "a", "b", "c"]).await;
    assert_eq!(response, Frame::Integer(3));

    let response = send_command(&mut stream, &["LPUSH", "list", "y", "z"]).await;
    assert_eq!(response, Frame::Integer(5));

    let response = send_command(&mut stream, &["LRANGE", "list", "0", "-1"]).await;
    assert_eq!(response, Frame::array_from_strs(&["z", "y", "a", "b", "c"]));

    let response = send_command(&mut stream, &["LLEN", "list"]).await;
    assert_eq!(response, Frame::Integer(5));

    let response = send_command(&mut stream, &["LPOP", "list"]).await;
    assert_eq!(response, Frame::Bulk(Bytes::from("z")));

    let response = send_command(&mut stream, &["LPOP", "list", "2"]).await;
    assert_eq!(response, Frame::array_from_strs(&["y", "a"]));

    let response = send_command(&mut stream, &["TYPE", "list"]).await;
    assert_eq!(response, Frame::Simple("list".into()));

    send_raw(&mut stream, &["LRANGE", "list", "5", "10"]).await;
    let (frame, raw) = read_reply(&mut stream).await;
    assert_eq!(frame, Frame::Array(vec![]));
    assert_eq!(raw, b"*0\r\n");
}

#[tokio::test]
async fn test_wrong_type_keeps_connection_open() {
    let addr = start_server().await;
    let mut stream = connect(addr).await;

    send_command(&mut stream, &["SET", "k", "v"]).await;

    send_raw(&mut stream, &["RPUSH", "k", "x"]).await;
    let (_, raw) = read_reply(&mut stream).await;
    assert_eq!(
        raw,
        b"-ERROR operation against a key holding the wrong kind of value\r\n"
    );

    let response = send_command(&mut stream, &["GET", "k"]).await;
    assert_eq!(response, Frame::Bulk(Bytes::from("v")));
}

#[tokio::test]
async fn test_del_and_type() {
    let addr = start_server().await;
    let mut stream = connect(addr).await;

    send_command(&mut stream, &["SET", "a", "1"]).await;

    let response = send_command(&mut stream, &["DEL", "a", "missing"]).await;
    assert_eq!(response, Frame::Integer(1));

    let response = send_command(&mut stream, &["DEL", "missing"]).await;
    assert_eq!(response, Frame::Integer(0));

    let response = send_command(&mut stream, &["TYPE", "a"]).await;
    assert_eq!(response, Frame::Simple("none".into()));
}

#[tokio::test]
async fn test_unknown_command() {
    let addr = start_server().await;
    let mut stream = connect(addr).await;

    let response = send_command(&mut stream, &["FOOBAR"]).await;
    assert_eq!(response.error_message(), Some("unknown command 'FOOBAR'"));

    // A conexão continua utilizável
    let response = send_command(&mut stream, &["PING"]).await;
    assert_eq!(response, Frame::Simple("PONG".into()));
}

#[tokio::test]
async fn test_blpop_fifo_across_clients() {
    let addr = start_server().await;
    let mut first = connect(addr).await;
    let mut second = connect(addr).await;
    let mut producer = connect(addr).await;

    send_raw(&mut first, &["BLPOP", "jobs", "0"]).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    send_raw(&mut second, &["BLPOP", "jobs", "0"]).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let response = send_command(&mut producer, &["RPUSH", "jobs", "v1", "v2"]).await;
    assert_eq!(response, Frame::Integer(0));

    assert_eq!(
        read_reply(&mut first).await.0,
        Frame::array_from_strs(&["jobs", "v1"])
    );
    assert_eq!(
        read_reply(&mut second).await.0,
        Frame::array_from_strs(&["jobs", "v2"])
    );

    let response = send_command(&mut producer, &["LLEN", "jobs"]).await;
    assert_eq!(response, Frame::Integer(0));
}

#[tokio::test]
async fn test_blpop_timeout_is_null_array() {
    let addr = start_server().await;
    let mut stream = connect(addr).await;

    send_raw(&mut stream, &["BLPOP", "empty", "0.05"]).await;
    let (frame, raw) = read_reply(&mut stream).await;
    assert_eq!(frame, Frame::NullArray);
    assert_eq!(raw, b"*-1\r\n");

    // Push depois do timeout fica na lista
    let response = send_command(&mut stream, &["RPUSH", "empty", "x"]).await;
    assert_eq!(response, Frame::Integer(1));
}

#[tokio::test]
async fn test_framing_error_closes_connection() {
    let addr = start_server().await;
    let mut stream = connect(addr).await;

    send_bytes(&mut stream, b"*1\r\n+PING\r\n").await;
    let (frame, _) = read_reply(&mut stream).await;
    assert!(frame.error_message().unwrap().starts_with("expected bulk string"));

    let mut rest = Vec::new();
    let n = stream.read_to_end(&mut rest).await.unwrap();
    assert_eq!(n, 0, "connection should be closed after a framing error");
}

#[tokio::test]
async fn test_pipelined_requests() {
    let addr = start_server().await;
    let mut stream = connect(addr).await;

    let mut buf = BytesMut::new();
    Frame::array_from_strs(&["SET", "p", "1"]).encode(&mut buf);
    Frame::array_from_strs(&["GET", "p"]).encode(&mut buf);
    send_bytes(&mut stream, &buf).await;

    let mut replies = BytesMut::new();
    while replies.len() < b"+OK\r\n$1\r\n1\r\n".len() {
        let n = stream.read_buf(&mut replies).await.unwrap();
        assert!(n > 0);
    }
    assert_eq!(&replies[..], b"+OK\r\n$1\r\n1\r\n");
}

#[tokio::test]
async fn test_shutdown_closes_blocked_client() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        brisadb_server::run(listener, Db::new(), 16, async {
            let _ = shutdown_rx.await;
        })
        .await
    });

    let mut stream = connect(addr).await;
    let response = send_command(&mut stream, &["PING"]).await;
    assert_eq!(response, Frame::Simple("PONG".into()));

    send_raw(&mut stream, &["BLPOP", "q", "0"]).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    shutdown_tx.send(()).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server did not stop after shutdown");
    assert!(result.unwrap().is_ok());

    // O BLPOP pendente é descartado e a conexão fecha sem resposta
    let mut rest = Vec::new();
    let n = tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut rest))
        .await
        .expect("blocked client was not disconnected")
        .unwrap();
    assert_eq!(n, 0);
}
