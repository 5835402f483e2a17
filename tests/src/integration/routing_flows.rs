//! # Routing Flows
//!
//! Addressed messages crossing an authenticated connection in both
//! directions, and what happens when the target or the sender is wrong.

use super::harness::{eventually, next_message, Event, RunningMaster, SelfResolver};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sh_02_handshake::max_envelope_size;
use sh_03_transport::{DeviceConnected, TransportConfig, DEVICE_CONNECTED};
use shared_bus::{HandlerError, MessageHandler, OutgoingRouter, RoutingError};
use shared_types::{AddressedMessage, DeviceId, Message, RoutingKey};
use std::sync::Arc;
use std::time::Duration;

const LIGHTS_SET: RoutingKey = RoutingKey::from_static("master/lights/set");
const LAMP_STATE: RoutingKey = RoutingKey::from_static("client/lamp/state");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct SetLight {
    room: String,
    on: bool,
}

/// Answers every request with `count` numbered replies.
struct ReplyBurst {
    router: Arc<OutgoingRouter>,
    count: u32,
}

#[async_trait]
impl MessageHandler for ReplyBurst {
    fn name(&self) -> &str {
        "reply-burst"
    }

    async fn handle(&self, message: &AddressedMessage) -> Result<(), HandlerError> {
        for n in 0..self.count {
            let body = Message::new(&n).map_err(|e| HandlerError::Failed(e.to_string()))?;
            self.router
                .send_reply(message, body)
                .await
                .map_err(|e| HandlerError::Failed(e.to_string()))?;
        }
        Ok(())
    }
}

// =============================================================================
// TEST GROUP 1: Delivery
// =============================================================================

#[tokio::test]
async fn test_request_and_reply_cross_the_connection() {
    let master = RunningMaster::start().await;
    let mut requests = master.device.inbox(&[LIGHTS_SET]);

    let lamp = master.enroll("lamp");
    let mut replies = lamp.device.inbox(&[LIGHTS_SET.reply()]);
    let connection = lamp.client.connect(master.addr).await.unwrap();

    let body = SetLight {
        room: "kitchen".to_string(),
        on: true,
    };
    let sent = lamp
        .device
        .router
        .send_message_to_master(LIGHTS_SET, Message::new(&body).unwrap())
        .await
        .unwrap();

    let request = next_message(&mut requests).await.expect("request delivered");
    assert_eq!(request.id, sent.id);
    assert_eq!(request.from, lamp.id());
    assert_eq!(request.to, master.id());
    assert_eq!(request.message.decode::<SetLight>().unwrap(), body);

    master
        .device
        .router
        .send_reply(&request, Message::new(&"done").unwrap())
        .await
        .unwrap();

    let reply = next_message(&mut replies).await.expect("reply delivered");
    assert!(reply.answers(&sent));
    assert_eq!(reply.routing_key, LIGHTS_SET.reply());
    assert_eq!(reply.message.decode::<String>().unwrap(), "done");

    connection.close().await.unwrap();
    master.stop().await;
}

#[tokio::test]
async fn test_master_pushes_to_client() {
    let master = RunningMaster::start().await;
    let lamp = master.enroll("lamp");
    let mut state = lamp.device.inbox(&[LAMP_STATE]);
    let connection = lamp.client.connect(master.addr).await.unwrap();

    let lamp_id = lamp.id();
    assert!(eventually(|| master.device.ctx.connections.is_connected(&lamp_id)).await);

    for on in [true, false] {
        master
            .device
            .router
            .send_message(lamp_id, LAMP_STATE, Message::new(&on).unwrap())
            .await
            .unwrap();
    }

    // in order, each exactly once
    let first = next_message(&mut state).await.unwrap();
    let second = next_message(&mut state).await.unwrap();
    assert!(first.message.decode::<bool>().unwrap());
    assert!(!second.message.decode::<bool>().unwrap());
    assert_ne!(first.id, second.id);

    connection.close().await.unwrap();
    master.stop().await;
}

#[tokio::test]
async fn test_master_sees_device_connected_event() {
    let master = RunningMaster::start().await;
    let mut events = master.device.inbox(&[DEVICE_CONNECTED]);

    let lamp = master.enroll("lamp");
    let connection = lamp.client.connect(master.addr).await.unwrap();

    let envelope = next_message(&mut events).await.expect("event dispatched");
    assert_eq!(envelope.from, master.id());
    assert_eq!(envelope.to, master.id());
    assert_eq!(
        envelope.message.decode::<DeviceConnected>().unwrap(),
        DeviceConnected {
            device_id: lamp.id(),
            name: "lamp".to_string(),
            is_connection_local: true,
        }
    );

    connection.close().await.unwrap();
    master.stop().await;
}

#[tokio::test]
async fn test_handler_replies_beyond_outbox_capacity() {
    let master = RunningMaster::start().await;
    let burst = TransportConfig::for_testing().outbox_capacity as u32 + 44;
    master
        .device
        .ctx
        .dispatcher
        .register_handler(
            Arc::new(ReplyBurst {
                router: master.device.router.clone(),
                count: burst,
            }),
            &[LIGHTS_SET],
        )
        .unwrap();

    let lamp = master.enroll("lamp");
    let mut replies = lamp.device.inbox(&[LIGHTS_SET.reply()]);
    let connection = lamp.client.connect(master.addr).await.unwrap();

    let body = SetLight {
        room: "hall".to_string(),
        on: true,
    };
    let sent = lamp
        .device
        .router
        .send_message_to_master(LIGHTS_SET, Message::new(&body).unwrap())
        .await
        .unwrap();

    // every reply arrives, in the order the handler sent them
    for n in 0..burst {
        let reply = next_message(&mut replies)
            .await
            .unwrap_or_else(|| panic!("reply {n} of {burst} delivered"));
        assert!(reply.answers(&sent));
        assert_eq!(reply.message.decode::<u32>().unwrap(), n);
    }
    assert!(connection.is_open());

    connection.close().await.unwrap();
    master.stop().await;
}

#[tokio::test]
async fn test_largest_message_fits_one_frame() {
    let master = RunningMaster::start().await;
    let lamp = master.enroll("lamp");
    let mut state = lamp.device.inbox(&[LAMP_STATE]);
    let connection = lamp.client.connect(master.addr).await.unwrap();
    let lamp_id = lamp.id();
    assert!(eventually(|| master.device.ctx.connections.is_connected(&lamp_id)).await);

    let limit = max_envelope_size(TransportConfig::for_testing().max_frame_size);
    let empty = AddressedMessage::new(master.id(), lamp_id, LAMP_STATE, Message::from_bytes(Vec::new()));
    let padding = limit - empty.encoded_len().unwrap();

    let sent = master
        .device
        .router
        .send_message(lamp_id, LAMP_STATE, Message::from_bytes(vec![0x5A; padding]))
        .await
        .unwrap();
    assert_eq!(sent.encoded_len().unwrap(), limit);

    let received = next_message(&mut state).await.expect("full-size message delivered");
    assert_eq!(received, sent);

    connection.close().await.unwrap();
    master.stop().await;
}

// =============================================================================
// TEST GROUP 2: Failures
// =============================================================================

#[tokio::test]
async fn test_send_to_unconnected_device() {
    let master = RunningMaster::start().await;
    let lamp = master.enroll("lamp");
    let mut state = lamp.device.inbox(&[LAMP_STATE]);
    let connection = lamp.client.connect(master.addr).await.unwrap();
    let lamp_id = lamp.id();
    assert!(eventually(|| master.device.ctx.connections.is_connected(&lamp_id)).await);

    let stranger = DeviceId::new([7; 32]);
    let err = master
        .device
        .router
        .send_message(stranger, LAMP_STATE, Message::new(&true).unwrap())
        .await
        .unwrap_err();
    assert_eq!(err, RoutingError::NoConnection { target: stranger });

    // the failed send leaves the lamp's connection alone
    assert!(master.device.ctx.connections.is_connected(&lamp_id));
    assert!(connection.is_open());
    master
        .device
        .router
        .send_message(lamp_id, LAMP_STATE, Message::new(&false).unwrap())
        .await
        .unwrap();
    let pushed = next_message(&mut state).await.expect("lamp still reachable");
    assert!(!pushed.message.decode::<bool>().unwrap());

    connection.close().await.unwrap();
    master.stop().await;
}

#[tokio::test]
async fn test_oversized_message_is_refused_and_connection_survives() {
    let master = RunningMaster::start().await;
    let lamp = master.enroll("lamp");
    let mut state = lamp.device.inbox(&[LAMP_STATE]);
    let connection = lamp.client.connect(master.addr).await.unwrap();
    let lamp_id = lamp.id();
    assert!(eventually(|| master.device.ctx.connections.is_connected(&lamp_id)).await);

    let max_frame_size = TransportConfig::for_testing().max_frame_size;
    let err = master
        .device
        .router
        .send_message(lamp_id, LAMP_STATE, Message::from_bytes(vec![0; max_frame_size]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RoutingError::MessageTooLarge { target, size, max }
            if target == lamp_id && size > max_frame_size && max == max_envelope_size(max_frame_size)
    ));

    master
        .device
        .router
        .send_message(lamp_id, LAMP_STATE, Message::new(&true).unwrap())
        .await
        .unwrap();
    let pushed = next_message(&mut state).await.expect("small push still delivered");
    assert!(pushed.message.decode::<bool>().unwrap());
    assert!(connection.is_open());
    assert!(master.device.ctx.connections.is_connected(&lamp_id));
    assert!(!master.device.listener.saw(&Event::Disconnected(Some(lamp_id))));

    connection.close().await.unwrap();
    master.stop().await;
}

#[tokio::test]
async fn test_closed_connection_is_no_longer_routable() {
    let master = RunningMaster::start().await;
    let lamp = master.enroll("lamp");
    let connection = lamp.client.connect(master.addr).await.unwrap();
    let lamp_id = lamp.id();
    assert!(eventually(|| master.device.ctx.connections.is_connected(&lamp_id)).await);

    connection.close().await.unwrap();
    assert!(eventually(|| !master.device.ctx.connections.is_connected(&lamp_id)).await);

    let err = master
        .device
        .router
        .send_message(lamp_id, LAMP_STATE, Message::new(&true).unwrap())
        .await
        .unwrap_err();
    assert_eq!(err, RoutingError::NoConnection { target: lamp_id });
    assert!(lamp.device.ctx.connections.is_empty());
    master.stop().await;
}

#[tokio::test]
async fn test_forged_sender_closes_connection() {
    let master = RunningMaster::start().await;
    let mut requests = master.device.inbox(&[LIGHTS_SET]);
    let lamp = master.enroll("lamp");
    let mut connection = lamp.client.connect(master.addr).await.unwrap();

    // same connection, but envelopes claim to come from someone else
    let impostor = OutgoingRouter::new(
        DeviceId::new([0x66; 32]),
        lamp.device.ctx.dispatcher.clone(),
        lamp.device.ctx.connections.clone(),
        Arc::new(SelfResolver(master.id())),
    );
    impostor
        .send_message_to_master(LIGHTS_SET, Message::new(&"forged").unwrap())
        .await
        .unwrap();

    let lamp_id = lamp.id();
    assert!(eventually(|| master.device.listener.saw(&Event::Disconnected(Some(lamp_id)))).await);
    // EOF or reset, depending on what was still in flight
    let _ = tokio::time::timeout(Duration::from_secs(2), connection.closed())
        .await
        .expect("client notices the close");
    assert!(!connection.is_open());
    assert!(next_message(&mut requests).await.is_none());
    master.stop().await;
}
