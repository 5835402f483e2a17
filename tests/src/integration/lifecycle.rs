//! # Connection Lifecycle
//!
//! Shutdown, keep-alive and the limits applied to peers that never
//! authenticate.

use super::harness::{eventually, ClientDevice, Event, RunningMaster};
use sh_02_handshake::{InMemoryTrustStore, StaticTokens};
use sh_03_transport::{TransportConfig, TransportError};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

fn keep_alive_config() -> TransportConfig {
    TransportConfig {
        writer_idle: Duration::from_millis(100),
        reader_idle: Duration::from_millis(400),
        all_idle: Duration::from_secs(1),
        ..TransportConfig::for_testing()
    }
}

/// Wait for the master to drop a raw socket. EOF and reset both count.
async fn assert_dropped(socket: &mut TcpStream) {
    let mut buf = [0u8; 64];
    let read = tokio::time::timeout(Duration::from_secs(3), socket.read(&mut buf))
        .await
        .expect("master closes the socket");
    assert!(matches!(read, Ok(0) | Err(_)), "unexpected data: {read:?}");
}

// =============================================================================
// TEST GROUP 1: Orderly close
// =============================================================================

#[tokio::test]
async fn test_client_close_is_seen_by_master() {
    let master = RunningMaster::start().await;
    let lamp = master.enroll("lamp");
    let connection = lamp.client.connect(master.addr).await.unwrap();
    let lamp_id = lamp.id();
    assert!(connection.is_open());

    connection.close().await.unwrap();

    assert!(lamp.device.listener.saw(&Event::Disconnected(Some(master.id()))));
    assert!(eventually(|| master.device.listener.saw(&Event::Disconnected(Some(lamp_id)))).await);
    assert!(master.device.ctx.connections.is_empty());
    assert!(master.device.listener.rejections().is_empty());
    master.stop().await;
}

#[tokio::test]
async fn test_master_shutdown_closes_clients() {
    let master = RunningMaster::start().await;
    let master_id = master.id();
    let connections = master.device.ctx.connections.clone();

    let lamp = master.enroll("lamp");
    let heater = master.enroll("heater");
    let mut lamp_connection = lamp.client.connect(master.addr).await.unwrap();
    let mut heater_connection = heater.client.connect(master.addr).await.unwrap();
    assert!(eventually(|| connections.len() == 2).await);

    master.stop().await;

    for connection in [&mut lamp_connection, &mut heater_connection] {
        let _ = tokio::time::timeout(Duration::from_secs(2), connection.closed())
            .await
            .expect("client notices the shutdown");
        assert!(!connection.is_open());
    }
    assert!(connections.is_empty());
    assert!(lamp.device.listener.saw(&Event::Disconnected(Some(master_id))));
    assert!(heater.device.ctx.connections.is_empty());
}

// =============================================================================
// TEST GROUP 2: Idle handling
// =============================================================================

#[tokio::test]
async fn test_keep_alive_holds_idle_connection() {
    let master = RunningMaster::start_with(keep_alive_config()).await;
    let lamp = ClientDevice::with_config(
        "lamp",
        InMemoryTrustStore::with_master_id(master.id()),
        StaticTokens::with_active(master.issue_token()),
        keep_alive_config(),
    );
    let connection = lamp.client.connect(master.addr).await.unwrap();

    // several reader-idle periods with no application traffic
    tokio::time::sleep(Duration::from_millis(1500)).await;

    assert!(connection.is_open());
    assert!(master.device.ctx.connections.is_connected(&lamp.id()));
    connection.close().await.unwrap();
    master.stop().await;
}

#[tokio::test]
async fn test_silent_peer_hits_handshake_deadline() {
    let master = RunningMaster::start_with(TransportConfig {
        handshake_timeout: Duration::from_millis(300),
        ..TransportConfig::for_testing()
    })
    .await;

    let mut socket = TcpStream::connect(master.addr).await.unwrap();
    assert_dropped(&mut socket).await;

    assert!(eventually(|| master.device.listener.saw(&Event::Disconnected(None))).await);
    assert!(master.device.listener.rejections().is_empty());
    assert!(master.device.ctx.connections.is_empty());
    master.stop().await;
}

// =============================================================================
// TEST GROUP 3: Hostile input
// =============================================================================

#[tokio::test]
async fn test_oversized_frame_closes_socket() {
    let master = RunningMaster::start().await;
    let mut socket = TcpStream::connect(master.addr).await.unwrap();

    socket.write_all(&u32::MAX.to_be_bytes()).await.unwrap();
    assert_dropped(&mut socket).await;

    assert!(eventually(|| master.device.listener.saw(&Event::Disconnected(None))).await);
    master.stop().await;
}

#[tokio::test]
async fn test_garbage_frame_closes_socket() {
    let master = RunningMaster::start().await;
    let mut socket = TcpStream::connect(master.addr).await.unwrap();

    let garbage = [0xAB_u8; 32];
    socket
        .write_all(&(garbage.len() as u32).to_be_bytes())
        .await
        .unwrap();
    socket.write_all(&garbage).await.unwrap();
    assert_dropped(&mut socket).await;

    assert!(eventually(|| master.device.listener.saw(&Event::Disconnected(None))).await);
    assert!(master.device.ctx.connections.is_empty());
    master.stop().await;
}

// =============================================================================
// TEST GROUP 4: Connect failures
// =============================================================================

#[tokio::test]
async fn test_nothing_listening() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let lamp = ClientDevice::new(
        "lamp",
        InMemoryTrustStore::new(),
        StaticTokens::new(),
    );
    let err = lamp.client.connect(addr).await.unwrap_err();

    assert!(matches!(err, TransportError::Io(_)));
    assert_eq!(
        lamp.device.listener.events(),
        vec![Event::Connecting("127.0.0.1".to_string(), addr.port())]
    );
}
