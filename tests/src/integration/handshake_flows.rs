//! # Handshake Flows
//!
//! Registration paths and trust failures between a real master and client.

use super::harness::{eventually, ClientDevice, Event, RunningMaster};
use sh_01_bootstrap::{ConnectInformation, RegistrationToken};
use sh_02_handshake::{
    DeviceRegistry, HandshakeError, InMemoryTrustStore, StaticTokens, TrustError, TrustStore,
    TOKEN_REJECTED, UNKNOWN_CLIENT, UNVERIFIED_MASTER,
};
use sh_03_transport::TransportError;
use shared_bus::MasterResolver;
use shared_types::DeviceId;
use std::net::Ipv4Addr;

// =============================================================================
// TEST GROUP 1: Successful registration
// =============================================================================

#[tokio::test]
async fn test_active_registration_from_bootstrap_text() {
    let master = RunningMaster::start().await;
    let token = master.issue_token();

    // what the user carries from the master to the new device
    let text = ConnectInformation::new(Ipv4Addr::LOCALHOST, master.addr.port(), master.id(), token)
        .encode();
    let info = ConnectInformation::decode(&text).unwrap();

    let trust = InMemoryTrustStore::new();
    trust.set_master_id(info.id).unwrap();
    let lamp = ClientDevice::new("lamp", trust, StaticTokens::with_active(info.token.clone()));
    lamp.client.master_found(info.socket_addr());

    let connection = lamp.client.connect_to_master().await.unwrap();

    assert_eq!(connection.master_id(), master.id());
    assert!(connection.outcome().is_connection_local);
    assert_eq!(
        lamp.trust.master_certificate().as_ref(),
        Some(master.device.keys.certificate())
    );
    assert!(master.registry.is_registered(&lamp.id()));
    assert!(!master.registry.redeem_active_token(&info.token));

    let lamp_id = lamp.id();
    assert!(eventually(|| master.device.listener.saw(&Event::Connected(lamp_id))).await);
    assert_eq!(
        lamp.device.listener.events(),
        vec![
            Event::MasterFound(info.socket_addr()),
            Event::Connecting("127.0.0.1".to_string(), master.addr.port()),
            Event::Connected(master.id()),
        ]
    );

    connection.close().await.unwrap();
    master.stop().await;
}

#[tokio::test]
async fn test_registered_device_reconnects_without_token() {
    let master = RunningMaster::start().await;
    let token = master.issue_token();

    let lamp = ClientDevice::new(
        "lamp",
        InMemoryTrustStore::with_master_id(master.id()),
        StaticTokens::with_active(token),
    );
    lamp.client.connect(master.addr).await.unwrap().close().await.unwrap();

    // the token was single use; the pinned certificate now does the work
    lamp.tokens.set_active(None);
    let connection = lamp.client.connect(master.addr).await.unwrap();
    assert_eq!(connection.master_id(), master.id());

    connection.close().await.unwrap();
    master.stop().await;
}

#[tokio::test]
async fn test_passive_registration_proves_unknown_master() {
    let master = RunningMaster::start().await;
    let passive = RegistrationToken::random();

    let lamp = ClientDevice::new(
        "lamp",
        InMemoryTrustStore::new(),
        StaticTokens::with_passive(passive.clone()),
    );
    master
        .registry
        .expect_passive_registration(lamp.id(), passive)
        .unwrap();

    let connection = lamp.client.connect(master.addr).await.unwrap();

    assert_eq!(lamp.trust.master_id(), Some(master.id()));
    assert!(lamp.trust.is_master_known());
    assert_eq!(master.registry.take_passive_token(&lamp.id()), None);

    connection.close().await.unwrap();
    master.stop().await;
}

// =============================================================================
// TEST GROUP 2: Refusals
// =============================================================================

#[tokio::test]
async fn test_unknown_device_without_token_is_rejected() {
    let master = RunningMaster::start().await;
    let lamp = ClientDevice::new(
        "lamp",
        InMemoryTrustStore::with_master_id(master.id()),
        StaticTokens::new(),
    );

    let err = lamp.client.connect(master.addr).await.unwrap_err();

    assert!(matches!(
        &err,
        TransportError::Session(HandshakeError::Rejected(reason)) if reason == UNKNOWN_CLIENT
    ));
    assert_eq!(lamp.device.listener.rejections(), vec![UNKNOWN_CLIENT.to_string()]);
    assert!(lamp.device.listener.saw(&Event::Disconnected(None)));
    assert!(!master.registry.is_registered(&lamp.id()));
    master.stop().await;
}

#[tokio::test]
async fn test_wrong_token_is_rejected_once() {
    let master = RunningMaster::start().await;
    let _issued = master.issue_token();
    let lamp = ClientDevice::new(
        "lamp",
        InMemoryTrustStore::with_master_id(master.id()),
        StaticTokens::with_active(RegistrationToken::random()),
    );

    let err = lamp.client.connect(master.addr).await.unwrap_err();

    assert!(matches!(
        &err,
        TransportError::Session(HandshakeError::Rejected(reason)) if reason == TOKEN_REJECTED
    ));
    assert_eq!(lamp.device.listener.rejections(), vec![TOKEN_REJECTED.to_string()]);
    assert!(eventually(|| !master.device.listener.rejections().is_empty()).await);
    assert!(!master.registry.is_registered(&lamp.id()));
    master.stop().await;
}

#[tokio::test]
async fn test_other_master_is_refused() {
    let master = RunningMaster::start().await;
    let expected = DeviceId::new([0x42; 32]);
    let lamp = ClientDevice::new(
        "lamp",
        InMemoryTrustStore::with_master_id(expected),
        StaticTokens::with_active(master.issue_token()),
    );

    let err = lamp.client.connect(master.addr).await.unwrap_err();

    assert!(matches!(
        err,
        TransportError::Session(HandshakeError::Trust(TrustError::IdentityMismatch { .. }))
    ));
    assert_eq!(lamp.trust.master_id(), Some(expected));
    assert!(lamp.trust.master_certificate().is_none());
    assert_eq!(lamp.device.listener.rejections().len(), 1);
    master.stop().await;
}

#[tokio::test]
async fn test_wrong_passive_token_leaves_master_unverified() {
    let master = RunningMaster::start().await;
    let lamp = ClientDevice::new(
        "lamp",
        InMemoryTrustStore::new(),
        StaticTokens::with_passive(RegistrationToken::random()),
    );
    master
        .registry
        .expect_passive_registration(lamp.id(), RegistrationToken::random())
        .unwrap();

    let err = lamp.client.connect(master.addr).await.unwrap_err();

    assert!(matches!(
        err,
        TransportError::Session(HandshakeError::Trust(TrustError::Unverified(_)))
    ));
    assert_eq!(lamp.device.listener.rejections(), vec![UNVERIFIED_MASTER.to_string()]);
    assert_eq!(lamp.trust.master_id(), None);
    master.stop().await;
}
