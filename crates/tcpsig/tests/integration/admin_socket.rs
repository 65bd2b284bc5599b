//! Admin protocol over a real Unix socket.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

use tcpsig::admin::{
    AdminClient, AdminRequest, AdminServer, SIGM_F_REQUEST, SIGMSG_HDRLEN, SigMsgHdr, SigMsgType,
    StatusBlock,
};
use tcpsig::{Config, Diagnostic, Error, NetStack};

use crate::common::{TestSocket, sa};

fn start(stack: &NetStack, socket: &TestSocket) {
    let server = AdminServer::bind(socket.path(), stack.admin()).unwrap();
    tokio::spawn(async move {
        let _ = server.run().await;
    });
}

#[tokio::test]
async fn test_add_get_flush() {
    let socket = TestSocket::new("crud");
    let stack = NetStack::new();
    start(&stack, &socket);

    let client = AdminClient::connect(socket.path()).await.unwrap();
    let src = sa("10.0.0.1:0");
    let dst = sa("10.0.0.2:0");

    client.add(src, dst, b"secret").await.unwrap();
    assert_eq!(stack.key_store().len(), 1);

    let err = client.add(src, dst, b"other").await.unwrap_err();
    assert!(err.is_duplicate());
    assert_eq!(err.diagnostic(), Diagnostic::DuplicateSa);

    client
        .get(sa("10.0.0.1:179"), sa("10.0.0.2:40000"))
        .await
        .unwrap();
    let err = client
        .get(sa("10.0.0.3:0"), dst)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.diagnostic(), Diagnostic::None);

    client.flush().await.unwrap();
    assert!(stack.key_store().is_empty());
    assert!(client.get(src, dst).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_add_rejections_carry_diagnostics() {
    let socket = TestSocket::new("reject");
    let stack = NetStack::new();
    start(&stack, &socket);
    let client = AdminClient::connect(socket.path()).await.unwrap();

    let err = client
        .add(sa("10.0.0.1:0"), sa("[2001:db8::2]:0"), b"secret")
        .await
        .unwrap_err();
    assert_eq!(err.diagnostic(), Diagnostic::AfMismatch);

    let long = [0x55u8; 81];
    assert!(client
        .add(sa("10.0.0.1:0"), sa("10.0.0.2:0"), &long)
        .await
        .is_err());
    assert!(stack.key_store().is_empty());
}

#[tokio::test]
async fn test_dump_lists_entries() {
    let socket = TestSocket::new("dump");
    let stack = NetStack::with_config(Config::new().dump_keys(true));
    start(&stack, &socket);
    let client = AdminClient::connect(socket.path()).await.unwrap();

    assert!(client.dump().await.unwrap().is_empty());

    client
        .add(sa("10.0.0.1:0"), sa("10.0.0.2:179"), b"alpha")
        .await
        .unwrap();
    client
        .add(sa("[2001:db8::1]:0"), sa("[2001:db8::2]:0"), b"beta")
        .await
        .unwrap();

    let entries = client.dump().await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].src, sa("10.0.0.1:0"));
    assert_eq!(entries[0].dst, sa("10.0.0.2:179"));
    assert_eq!(entries[0].key_bits, 40);
    assert_eq!(
        entries[0].key.as_deref().map(Vec::as_slice),
        Some(&b"alpha"[..])
    );
    assert_eq!(entries[1].dst, sa("[2001:db8::2]:0"));
}

#[tokio::test]
async fn test_dump_withholds_keys_by_default() {
    let socket = TestSocket::new("dump-nokeys");
    let stack = NetStack::new();
    start(&stack, &socket);
    let client = AdminClient::connect(socket.path()).await.unwrap();

    client
        .add(sa("10.0.0.1:0"), sa("10.0.0.2:0"), b"alpha")
        .await
        .unwrap();
    let entries = client.dump().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].key_bits, 40);
    assert!(entries[0].key.is_none());
}

#[tokio::test]
async fn test_concurrent_clients() {
    let socket = TestSocket::new("concurrent");
    let stack = NetStack::new();
    start(&stack, &socket);

    let mut tasks = Vec::new();
    for i in 1..=8u8 {
        let path = socket.path().to_path_buf();
        tasks.push(tokio::spawn(async move {
            let client = AdminClient::connect(path).await.unwrap();
            client
                .add(sa(&format!("10.1.0.{}:0", i)), sa("10.0.0.2:0"), b"k")
                .await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }
    assert_eq!(stack.key_store().len(), 8);
}

#[tokio::test]
async fn test_request_on_raw_stream() {
    let socket = TestSocket::new("raw");
    let stack = NetStack::new();
    start(&stack, &socket);

    let mut builder = AdminRequest::Flush.to_builder();
    builder.set_seq(42);
    let msg = builder.finish();

    let mut stream = UnixStream::connect(socket.path()).await.unwrap();
    stream.write_all(&msg).await.unwrap();

    let mut reply = vec![0u8; SIGMSG_HDRLEN + std::mem::size_of::<StatusBlock>()];
    stream.read_exact(&mut reply).await.unwrap();
    let hdr = SigMsgHdr::from_bytes(&reply).unwrap();
    assert_eq!(hdr.kind, SigMsgType::FLUSH);
    assert_eq!(hdr.seq, 42);
    assert!(hdr.is_reply());
    let status = StatusBlock::from_bytes(&reply[SIGMSG_HDRLEN..]).unwrap();
    assert!(status.is_ok());
}

#[tokio::test]
async fn test_bad_frame_length_closes_connection() {
    let socket = TestSocket::new("badlen");
    let stack = NetStack::new();
    start(&stack, &socket);

    let mut hdr = SigMsgHdr::new(SigMsgType::GET, SIGM_F_REQUEST);
    hdr.len = 8;
    hdr.seq = 7;

    let mut stream = UnixStream::connect(socket.path()).await.unwrap();
    stream.write_all(hdr.as_bytes()).await.unwrap();

    let mut reply = Vec::new();
    stream.read_to_end(&mut reply).await.unwrap();
    let rhdr = SigMsgHdr::from_bytes(&reply).unwrap();
    assert_eq!(rhdr.seq, 7);
    let status = StatusBlock::from_bytes(&reply[SIGMSG_HDRLEN..]).unwrap();
    assert_eq!(status.status, libc::EINVAL);
    assert_eq!(status.diagnostic(), Diagnostic::BadMessage);

    // The server is still serving other connections.
    let client = AdminClient::connect(socket.path()).await.unwrap();
    client.flush().await.unwrap();
}

#[tokio::test]
async fn test_bind_refuses_live_socket() {
    let socket = TestSocket::new("live");
    let stack = NetStack::new();
    start(&stack, &socket);

    let other = NetStack::new();
    let err = AdminServer::bind(socket.path(), other.admin()).unwrap_err();
    match err {
        Error::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::AddrInUse),
        e => panic!("unexpected error {:?}", e),
    }

    // The first server still owns the socket.
    let client = AdminClient::connect(socket.path()).await.unwrap();
    client
        .add(sa("10.0.0.1:0"), sa("10.0.0.2:0"), b"secret")
        .await
        .unwrap();
    assert_eq!(stack.key_store().len(), 1);
    assert!(other.key_store().is_empty());
}

#[tokio::test]
async fn test_bind_refuses_regular_file() {
    let socket = TestSocket::new("regular");
    std::fs::write(socket.path(), b"important data").unwrap();

    let stack = NetStack::new();
    let err = AdminServer::bind(socket.path(), stack.admin()).unwrap_err();
    assert!(matches!(&err, Error::Io(e) if e.kind() == std::io::ErrorKind::AddrInUse));
    assert_eq!(std::fs::read(socket.path()).unwrap(), b"important data");
}

#[tokio::test]
async fn test_bind_replaces_stale_socket() {
    let socket = TestSocket::new("stale");
    drop(std::os::unix::net::UnixListener::bind(socket.path()).unwrap());
    assert!(socket.path().exists());

    let stack = NetStack::new();
    start(&stack, &socket);
    let client = AdminClient::connect(socket.path()).await.unwrap();
    client.flush().await.unwrap();
}
