//! Two stacks exchanging signed segments.

use tcpsig::{Connection, Direction, Error, NetStack, Segment, TcpConnection};

use crate::common::{sa, tcp_header};

struct Peer {
    stack: NetStack,
    conn: Connection,
}

fn peers() -> (Peer, Peer) {
    let a_addr = sa("192.0.2.1:40000");
    let b_addr = sa("192.0.2.2:179");

    let a = Peer {
        stack: NetStack::new(),
        conn: Connection::new(a_addr, b_addr),
    };
    let b = Peer {
        stack: NetStack::new(),
        conn: a.conn.mirrored(),
    };

    // One SA per direction on each side, ports wildcarded.
    for peer in [&a, &b] {
        let store = peer.stack.key_store();
        store
            .add(sa("192.0.2.1:0"), sa("192.0.2.2:0"), b"bgp-secret", 80)
            .unwrap();
        store
            .add(sa("192.0.2.2:0"), sa("192.0.2.1:0"), b"bgp-secret", 80)
            .unwrap();
    }
    (a, b)
}

/// Serialize a signed segment and rebuild it the way a receiver would.
fn transmit(segment: &Segment) -> Segment {
    let header = segment.header_bytes();
    let mut received = Segment::new(&header).unwrap();
    for chunk in segment.data() {
        received.push_data(chunk.to_vec());
    }
    received
}

#[test]
fn test_exchange_both_directions() {
    let (a, b) = peers();
    let a_engine = a.stack.signature_engine();
    let b_engine = b.stack.signature_engine();

    let mut open = Segment::new(&tcp_header(40000, 179, 5))
        .unwrap()
        .with_data(&b"OPEN"[..]);
    a_engine.sign(&mut open, &a.conn).unwrap();
    assert_eq!(open.tcp_header().data_offset(), 10);
    b_engine.check_inbound(&transmit(&open), &b.conn).unwrap();

    let mut keepalive = Segment::new(&tcp_header(179, 40000, 5))
        .unwrap()
        .with_data(&b"KEEPALIVE"[..]);
    b_engine.sign(&mut keepalive, &b.conn).unwrap();
    a_engine.check_inbound(&transmit(&keepalive), &a.conn).unwrap();

    assert!(a.conn.sa_cache().is_cached(Direction::Outbound));
    assert!(a.conn.sa_cache().is_cached(Direction::Inbound));
}

#[test]
fn test_tampered_payload_rejected() {
    let (a, b) = peers();
    let mut segment = Segment::new(&tcp_header(40000, 179, 5))
        .unwrap()
        .with_data(&b"UPDATE"[..]);
    a.stack
        .signature_engine()
        .sign(&mut segment, &a.conn)
        .unwrap();

    let header = segment.header_bytes();
    let forged = Segment::new(&header).unwrap().with_data(&b"UPDATF"[..]);
    let err = b
        .stack
        .signature_engine()
        .check_inbound(&forged, &b.conn)
        .unwrap_err();
    assert!(matches!(err, Error::SignatureMismatch));
    assert!(err.is_auth_failure());
}

#[test]
fn test_different_keys_do_not_verify() {
    let (a, _) = peers();
    let stranger = NetStack::new();
    stranger
        .key_store()
        .add(sa("192.0.2.1:0"), sa("192.0.2.2:0"), b"other-secret", 96)
        .unwrap();
    let conn = a.conn.mirrored();

    let mut segment = Segment::new(&tcp_header(40000, 179, 5))
        .unwrap()
        .with_data(&b"OPEN"[..]);
    a.stack
        .signature_engine()
        .sign(&mut segment, &a.conn)
        .unwrap();

    let err = stranger
        .signature_engine()
        .check_inbound(&transmit(&segment), &conn)
        .unwrap_err();
    assert!(matches!(err, Error::SignatureMismatch));
}

#[test]
fn test_unsigned_segment_rejected() {
    let (_, b) = peers();
    let plain = Segment::new(&tcp_header(40000, 179, 5))
        .unwrap()
        .with_data(&b"OPEN"[..]);
    let err = b
        .stack
        .signature_engine()
        .check_inbound(&plain, &b.conn)
        .unwrap_err();
    assert!(matches!(err, Error::MissingSignatureOption));
}

#[test]
fn test_flush_stops_signing() {
    let (a, _) = peers();
    let engine = a.stack.signature_engine();

    let mut first = Segment::new(&tcp_header(40000, 179, 5)).unwrap();
    engine.sign(&mut first, &a.conn).unwrap();
    assert!(a.conn.sa_cache().is_cached(Direction::Outbound));

    // The cached SA is detached by the flush and dropped on next use.
    a.stack.key_store().flush();
    let mut second = Segment::new(&tcp_header(40000, 179, 5)).unwrap();
    let err = engine.sign(&mut second, &a.conn).unwrap_err();
    assert!(err.is_no_key());
    assert!(!a.conn.sa_cache().is_cached(Direction::Outbound));
}
