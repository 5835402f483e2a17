//! # Message Handlers
//!
//! A handler is registered with the [`IncomingDispatcher`](crate::IncomingDispatcher)
//! for a non-empty set of routing keys and must accept every message it is
//! given for those keys. A handler that cannot make sense of a message says
//! so with [`HandlerError::InvalidMessage`]; it never drops it silently.

use async_trait::async_trait;
use parking_lot::RwLock;
use shared_types::{AddressedMessage, RoutingKey};
use std::collections::HashSet;
use thiserror::Error;

/// Errors a handler reports back to the dispatcher.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HandlerError {
    /// The handler is registered for this key but cannot process the message.
    #[error("Invalid message for {key}: {reason}")]
    InvalidMessage { key: RoutingKey, reason: String },

    /// The handler was given a key it never registered for.
    #[error("Handler is not registered for {key}")]
    UnexpectedKey { key: RoutingKey },

    /// Processing failed for another reason.
    #[error("Handler failed: {0}")]
    Failed(String),
}

/// Consumer of routed messages.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Process one message.
    async fn handle(&self, message: &AddressedMessage) -> Result<(), HandlerError>;

    /// Called once for every key this handler becomes registered for.
    fn handler_added(&self, _key: &RoutingKey) {}

    /// Called once for every key this handler stops being registered for.
    fn handler_removed(&self, _key: &RoutingKey) {}
}

/// Keys a handler is currently registered for.
///
/// Embed in a handler and forward `handler_added` / `handler_removed` to it
/// to get [`RegisteredKeys::invalid_message`] for free.
#[derive(Debug, Default)]
pub struct RegisteredKeys {
    keys: RwLock<HashSet<RoutingKey>>,
}

impl RegisteredKeys {
    /// Empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a registration.
    pub fn added(&self, key: &RoutingKey) {
        self.keys.write().insert(key.clone());
    }

    /// Record an unregistration.
    pub fn removed(&self, key: &RoutingKey) {
        self.keys.write().remove(key);
    }

    /// Whether `key` is currently registered.
    #[must_use]
    pub fn contains(&self, key: &RoutingKey) -> bool {
        self.keys.read().contains(key)
    }

    /// Number of registered keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.read().len()
    }

    /// Whether no key is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.read().is_empty()
    }

    /// Error for a message this handler cannot process.
    ///
    /// `InvalidMessage` if we are registered for its key (a bug on the
    /// sending side), `UnexpectedKey` otherwise (a bug in routing).
    #[must_use]
    pub fn invalid_message(&self, message: &AddressedMessage, reason: &str) -> HandlerError {
        let key = message.routing_key.clone();
        if self.contains(&key) {
            HandlerError::InvalidMessage {
                key,
                reason: reason.to_string(),
            }
        } else {
            HandlerError::UnexpectedKey { key }
        }
    }
}
