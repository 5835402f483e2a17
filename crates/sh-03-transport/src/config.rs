//! Transport timing and limits.

use shared_bus::DEFAULT_OUTBOX_CAPACITY;
use std::time::Duration;

/// Default master port.
pub const DEFAULT_PORT: u16 = 13131;

/// Default maximum frame size (1 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Per-connection timing and limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// TCP connect timeout (client only).
    pub connect_timeout: Duration,
    /// Time allowed from accept/connect to a finished handshake.
    pub handshake_timeout: Duration,
    /// Close when nothing was read for this long.
    pub reader_idle: Duration,
    /// Ping when nothing was written for this long (finished sessions only).
    pub writer_idle: Duration,
    /// Close when nothing was read or written for this long.
    pub all_idle: Duration,
    /// Largest accepted frame.
    pub max_frame_size: usize,
    /// Queue depth between the router and a connection.
    pub outbox_capacity: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(15),
            reader_idle: Duration::from_secs(60),
            writer_idle: Duration::from_secs(20),
            all_idle: Duration::from_secs(120),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            outbox_capacity: DEFAULT_OUTBOX_CAPACITY,
        }
    }
}

impl TransportConfig {
    /// Short timeouts for tests.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            connect_timeout: Duration::from_secs(2),
            handshake_timeout: Duration::from_secs(2),
            reader_idle: Duration::from_secs(3),
            writer_idle: Duration::from_millis(500),
            all_idle: Duration::from_secs(5),
            ..Self::default()
        }
    }
}
