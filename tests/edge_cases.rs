//! Malformed input from the server after login

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use bedrock_client::core::codec::BatchEncoder;
use bedrock_client::core::packet::{ids, Packet, ServerToClientHandshake, SetLastHurtBy};
use bedrock_client::error::ProtocolError;
use bedrock_client::transport::Transport;
use bedrock_client::utils::compression::CompressionKind;
use bedrock_client::Connection;
use bytes::Bytes;
use common::{capture_errors, data_info, pack, setup, FakeServer};
use std::sync::{Arc, Mutex};

type Errors = Arc<Mutex<Vec<String>>>;

async fn logged_in() -> (Connection, FakeServer, Errors) {
    let (dialer, mut server) = setup();
    let (dialer, errors) = capture_errors(dialer);
    let (conn, ()) = tokio::join!(dialer.dial("tcp", "server"), server.handshake());
    (conn.unwrap(), server, errors)
}

async fn expect_terminated(conn: &Connection) -> String {
    match conn.read_packet().await {
        Err(ProtocolError::SessionTerminated(reason)) => reason,
        other => panic!("expected the session to terminate, got {other:?}"),
    }
}

#[tokio::test]
async fn test_wrong_batch_header_is_fatal() {
    let (conn, server, errors) = logged_in().await;
    server
        .transport
        .send(Bytes::from_static(&[0xFD, 1, 2, 3]))
        .await
        .unwrap();

    let reason = expect_terminated(&conn).await;
    assert!(reason.contains("Invalid batch header"), "reason: {reason}");
    assert_eq!(errors.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_empty_frame_is_fatal() {
    let (conn, server, _errors) = logged_in().await;
    server.transport.send(Bytes::new()).await.unwrap();

    let reason = expect_terminated(&conn).await;
    assert!(reason.contains("Empty frame"), "reason: {reason}");
}

#[tokio::test]
async fn test_unencrypted_frame_after_handshake_is_fatal() {
    let (conn, server, errors) = logged_in().await;
    let mut plain = BatchEncoder::new(CompressionKind::Flate, 6);
    let frame = plain.encode(&[SetLastHurtBy { entity_type: 1 }.into()]).unwrap();
    server.transport.send(frame).await.unwrap();

    expect_terminated(&conn).await;
    assert!(conn.is_closed());
    assert_eq!(errors.lock().unwrap().len(), 1);
    assert_eq!(conn.metrics().protocol_errors + conn.metrics().connection_errors, 1);
    // The server side sees the session end
    assert!(server.transport.recv().await.unwrap().is_none());
}

#[tokio::test]
async fn test_second_handshake_is_fatal() {
    let (conn, mut server, errors) = logged_in().await;
    server
        .send(vec![ServerToClientHandshake {
            jwt: Bytes::from_static(b"a.b.c"),
        }
        .into()])
        .await;

    expect_terminated(&conn).await;
    assert!(errors.lock().unwrap()[0].contains("already negotiated"));
}

#[tokio::test]
async fn test_truncated_typed_packet_is_fatal() {
    let (conn, mut server, _errors) = logged_in().await;
    // PlayStatus needs four bytes
    server
        .send(vec![Packet::Unknown {
            id: ids::PLAY_STATUS,
            payload: Bytes::from_static(&[0, 0]),
        }])
        .await;

    let reason = expect_terminated(&conn).await;
    assert!(reason.contains("Decode error"), "reason: {reason}");
}

#[tokio::test]
async fn test_data_info_without_offer_is_fatal() {
    let (conn, mut server, _errors) = logged_in().await;
    let pack = pack("A", "1.0", 10);
    server.send(vec![data_info(&pack, 8).into()]).await;

    let reason = expect_terminated(&conn).await;
    assert!(reason.contains("Unexpected packet 0x52"), "reason: {reason}");
}

#[tokio::test]
async fn test_unknown_packets_reach_the_caller() {
    let (conn, mut server, _errors) = logged_in().await;
    let unknown = Packet::Unknown {
        id: 0x3F0,
        payload: Bytes::from_static(b"opaque"),
    };
    server.send(vec![unknown.clone()]).await;
    assert_eq!(conn.read_packet().await.unwrap(), unknown);
}
