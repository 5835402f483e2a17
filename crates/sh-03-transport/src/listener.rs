//! Connection lifecycle callbacks for the surrounding application.

use parking_lot::RwLock;
use sh_02_handshake::HandshakeOutcome;
use shared_types::DeviceId;
use std::net::SocketAddr;
use std::sync::Arc;

/// Observer of connection lifecycle events. Every method defaults to a no-op.
pub trait ConnectionListener: Send + Sync {
    /// A master address became known.
    fn on_master_found(&self, _addr: SocketAddr) {}

    /// A connection attempt is starting.
    fn on_connecting(&self, _host: &str, _port: u16) {}

    /// A handshake finished.
    fn on_connected(&self, _peer: &HandshakeOutcome) {}

    /// A connection closed. `peer` is `None` if it never authenticated.
    fn on_disconnected(&self, _peer: Option<DeviceId>) {}

    /// The handshake was refused or violated trust.
    fn on_rejected(&self, _message: &str) {}
}

/// Shared, growable set of listeners.
#[derive(Clone, Default)]
pub struct Listeners {
    inner: Arc<RwLock<Vec<Arc<dyn ConnectionListener>>>>,
}

impl Listeners {
    /// No listeners.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a listener.
    pub fn add(&self, listener: Arc<dyn ConnectionListener>) {
        self.inner.write().push(listener);
    }

    /// Number of listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Whether there are no listeners.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Call `f` on every listener. The set is snapshotted first, so a
    /// listener may add another without deadlocking.
    pub fn notify(&self, f: impl Fn(&dyn ConnectionListener)) {
        let snapshot: Vec<_> = self.inner.read().clone();
        for listener in &snapshot {
            f(listener.as_ref());
        }
    }
}

impl std::fmt::Debug for Listeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listeners").field("len", &self.len()).finish()
    }
}
