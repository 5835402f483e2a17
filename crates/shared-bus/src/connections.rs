//! # Connection Registry
//!
//! Maps authenticated peer identities to the outbound queue of their live
//! connection. Written by the transport when a handshake finishes or a
//! connection closes, read by the [`OutgoingRouter`](crate::OutgoingRouter)
//! on every send.

use parking_lot::RwLock;
use shared_types::{AddressedMessage, Component, DeviceId};
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

/// Outbound side of one secured connection.
#[derive(Debug, Clone)]
pub struct PeerConnection {
    /// Distinguishes successive connections of the same device.
    pub connection_id: Uuid,
    /// Remote socket address.
    pub remote_addr: SocketAddr,
    /// Whether the peer is on the local network.
    pub is_local: bool,
    sender: mpsc::Sender<AddressedMessage>,
    max_message_size: Option<usize>,
}

impl PeerConnection {
    /// New handle around a connection's outbound queue.
    #[must_use]
    pub fn new(remote_addr: SocketAddr, is_local: bool, sender: mpsc::Sender<AddressedMessage>) -> Self {
        Self {
            connection_id: Uuid::new_v4(),
            remote_addr,
            is_local,
            sender,
            max_message_size: None,
        }
    }

    /// Refuse envelopes whose encoding exceeds `max` bytes.
    #[must_use]
    pub fn with_max_message_size(mut self, max: usize) -> Self {
        self.max_message_size = Some(max);
        self
    }

    /// Outbound queue.
    #[must_use]
    pub fn sender(&self) -> &mpsc::Sender<AddressedMessage> {
        &self.sender
    }

    /// Largest envelope the connection can carry, if limited.
    #[must_use]
    pub fn max_message_size(&self) -> Option<usize> {
        self.max_message_size
    }
}

/// Live connections by peer identity.
#[derive(Default)]
pub struct ConnectionRegistry {
    peers: RwLock<HashMap<DeviceId, PeerConnection>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finished connection, returning the one it replaces.
    pub fn register(&self, peer: DeviceId, connection: PeerConnection) -> Option<PeerConnection> {
        info!(
            peer = %peer.to_short_text(),
            addr = %connection.remote_addr,
            local = connection.is_local,
            "[Connections] peer connected"
        );
        self.peers.write().insert(peer, connection)
    }

    /// Remove `peer` if its current connection is `connection_id`.
    ///
    /// A stale connection closing late cannot remove its replacement.
    pub fn unregister(&self, peer: &DeviceId, connection_id: Uuid) -> bool {
        let mut peers = self.peers.write();
        match peers.get(peer) {
            Some(current) if current.connection_id == connection_id => {
                peers.remove(peer);
                debug!(peer = %peer.to_short_text(), "[Connections] peer disconnected");
                true
            }
            _ => false,
        }
    }

    /// Current connection of `peer`.
    #[must_use]
    pub fn get(&self, peer: &DeviceId) -> Option<PeerConnection> {
        self.peers.read().get(peer).cloned()
    }

    /// Whether `peer` has a live connection.
    #[must_use]
    pub fn is_connected(&self, peer: &DeviceId) -> bool {
        self.peers.read().contains_key(peer)
    }

    /// Snapshot of connected peers.
    #[must_use]
    pub fn connected_devices(&self) -> Vec<DeviceId> {
        self.peers.read().keys().copied().collect()
    }

    /// Number of live connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    /// Whether there are no live connections.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.peers.read().is_empty()
    }
}

impl Component for ConnectionRegistry {
    fn destroy(&self) {
        // Dropping the senders ends every connection's outbound loop.
        self.peers.write().clear();
    }
}
