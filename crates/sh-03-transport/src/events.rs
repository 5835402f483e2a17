//! Local events published by the transport.

use serde::{Deserialize, Serialize};
use shared_types::{DeviceId, RoutingKey};

/// Dispatched locally on the master each time a client finishes its handshake.
pub const DEVICE_CONNECTED: RoutingKey = RoutingKey::from_static("master/device/connected");

/// Payload of [`DEVICE_CONNECTED`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConnected {
    pub device_id: DeviceId,
    pub name: String,
    pub is_connection_local: bool,
}
