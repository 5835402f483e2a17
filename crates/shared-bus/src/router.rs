//! # Outgoing Router
//!
//! Addresses messages to local handlers, to the master, or to any connected
//! device. Retry policy belongs to the caller: a send to a device without a
//! live connection fails immediately.
//!
//! ```text
//! send_message(to, key, msg)
//!        │
//!        ├── to == local id ──→ IncomingDispatcher::dispatch   (no serialization)
//!        │
//!        └── otherwise ───────→ ConnectionRegistry[to] ──→ connection outbox
//!                                   │
//!                                   ├── missing ──→ RoutingError::NoConnection
//!                                   └── too large ──→ RoutingError::MessageTooLarge
//! ```

use crate::connections::ConnectionRegistry;
use crate::dispatcher::IncomingDispatcher;
use crate::errors::RoutingError;
use shared_types::{AddressedMessage, Component, DeviceId, Message, RoutingKey};
use std::sync::Arc;
use tracing::{debug, warn};

/// Source of the master's identity.
pub trait MasterResolver: Send + Sync {
    /// The master's id, if known.
    fn master_id(&self) -> Option<DeviceId>;
}

/// Outbound half of the routing layer.
pub struct OutgoingRouter {
    local_id: DeviceId,
    dispatcher: Arc<IncomingDispatcher>,
    connections: Arc<ConnectionRegistry>,
    master: Arc<dyn MasterResolver>,
}

impl OutgoingRouter {
    /// Create a router for the device `local_id`.
    pub fn new(
        local_id: DeviceId,
        dispatcher: Arc<IncomingDispatcher>,
        connections: Arc<ConnectionRegistry>,
        master: Arc<dyn MasterResolver>,
    ) -> Self {
        Self {
            local_id,
            dispatcher,
            connections,
            master,
        }
    }

    /// This device's id, used as `from` on everything we send.
    #[must_use]
    pub fn local_id(&self) -> DeviceId {
        self.local_id
    }

    /// Send to `to`. Returns the envelope that was sent.
    pub async fn send_message(
        &self,
        to: DeviceId,
        routing_key: RoutingKey,
        message: Message,
    ) -> Result<AddressedMessage, RoutingError> {
        let envelope = AddressedMessage::new(self.local_id, to, routing_key, message);
        self.deliver(envelope).await
    }

    /// Send to the master.
    pub async fn send_message_to_master(
        &self,
        routing_key: RoutingKey,
        message: Message,
    ) -> Result<AddressedMessage, RoutingError> {
        let master = self.master.master_id().ok_or(RoutingError::MasterUnknown)?;
        self.send_message(master, routing_key, message).await
    }

    /// Deliver straight to the local dispatcher, without touching the network.
    pub async fn send_message_local(
        &self,
        routing_key: RoutingKey,
        message: Message,
    ) -> Result<AddressedMessage, RoutingError> {
        self.send_message(self.local_id, routing_key, message).await
    }

    /// Answer `original`: swapped sender/target, same correlation, reply key.
    pub async fn send_reply(
        &self,
        original: &AddressedMessage,
        message: Message,
    ) -> Result<AddressedMessage, RoutingError> {
        let mut reply = AddressedMessage::reply_to(original, message);
        // We may be answering a loopback message addressed to ourselves.
        reply.from = self.local_id;
        self.deliver(reply).await
    }

    async fn deliver(&self, envelope: AddressedMessage) -> Result<AddressedMessage, RoutingError> {
        if envelope.to == self.local_id {
            debug!(key = %envelope.routing_key, "[Router] local delivery");
            self.dispatcher.dispatch(&envelope).await?;
            return Ok(envelope);
        }

        let target = envelope.to;
        let connection = self.connections.get(&target).ok_or_else(|| {
            warn!(
                to = %target.to_short_text(),
                key = %envelope.routing_key,
                "[Router] no connection to target"
            );
            RoutingError::NoConnection { target }
        })?;

        if let Some(max) = connection.max_message_size() {
            let size = envelope
                .encoded_len()
                .map_err(|e| RoutingError::Encode(e.to_string()))?;
            if size > max {
                warn!(
                    to = %target.to_short_text(),
                    key = %envelope.routing_key,
                    size,
                    max,
                    "[Router] message too large for connection"
                );
                return Err(RoutingError::MessageTooLarge { target, size, max });
            }
        }

        debug!(
            to = %target.to_short_text(),
            key = %envelope.routing_key,
            id = %envelope.id,
            "[Router] queued for remote delivery"
        );
        connection
            .sender()
            .send(envelope.clone())
            .await
            .map_err(|_| RoutingError::ConnectionClosed { target })?;
        Ok(envelope)
    }
}

impl Component for OutgoingRouter {}
