//! Built-in message handlers.

use async_trait::async_trait;
use parking_lot::RwLock;
use sh_03_transport::{DeviceConnected, DEVICE_CONNECTED};
use shared_bus::{HandlerError, MessageHandler, RegisteredKeys};
use shared_types::{AddressedMessage, DeviceId, RoutingKey};
use tracing::info;

/// Logs every device that finishes its handshake with the master and
/// remembers who was seen.
#[derive(Debug, Default)]
pub struct DeviceConnectedLogger {
    keys: RegisteredKeys,
    seen: RwLock<Vec<DeviceConnected>>,
}

impl DeviceConnectedLogger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Devices that connected since start, oldest first.
    #[must_use]
    pub fn seen(&self) -> Vec<DeviceConnected> {
        self.seen.read().clone()
    }

    /// Whether `id` connected since start.
    #[must_use]
    pub fn has_seen(&self, id: &DeviceId) -> bool {
        self.seen.read().iter().any(|event| &event.device_id == id)
    }
}

#[async_trait]
impl MessageHandler for DeviceConnectedLogger {
    fn name(&self) -> &str {
        "device-connected-logger"
    }

    async fn handle(&self, message: &AddressedMessage) -> Result<(), HandlerError> {
        if message.routing_key != DEVICE_CONNECTED {
            return Err(HandlerError::UnexpectedKey {
                key: message.routing_key.clone(),
            });
        }
        let event: DeviceConnected = message
            .message
            .decode()
            .map_err(|e| self.keys.invalid_message(message, &e.to_string()))?;

        info!(
            device = %event.device_id.to_short_text(),
            name = %event.name,
            local = event.is_connection_local,
            "Device connected"
        );
        self.seen.write().push(event);
        Ok(())
    }

    fn handler_added(&self, key: &RoutingKey) {
        self.keys.added(key);
    }

    fn handler_removed(&self, key: &RoutingKey) {
        self.keys.removed(key);
    }
}
