//! Routing error types.

use crate::handler::HandlerError;
use shared_types::{DeviceId, RoutingKey};
use thiserror::Error;

/// Delivery failures. Local to the caller; they never tear down unrelated
/// connections.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RoutingError {
    /// A handler must be registered for at least one key.
    #[error("Handler registration needs at least one routing key")]
    EmptyKeySet,

    /// Nobody is registered for this key.
    #[error("No handler registered for {key}")]
    NoHandler { key: RoutingKey },

    /// No live connection to the target device.
    #[error("No connection to device {target:?}")]
    NoConnection { target: DeviceId },

    /// The connection went away while the message was being queued.
    #[error("Connection to device {target:?} closed")]
    ConnectionClosed { target: DeviceId },

    /// The envelope does not fit in one frame of the target's connection.
    #[error("Message of {size} bytes exceeds the {max} byte limit of the connection to {target:?}")]
    MessageTooLarge {
        target: DeviceId,
        size: usize,
        max: usize,
    },

    /// The envelope could not be encoded for the network.
    #[error("Message could not be encoded: {0}")]
    Encode(String),

    /// The master's identity is not known yet.
    #[error("Master identity is not known")]
    MasterUnknown,

    /// A handler rejected the message.
    #[error("Handler {handler} rejected message on {key}: {source}")]
    Handler {
        handler: String,
        key: RoutingKey,
        #[source]
        source: HandlerError,
    },
}
