//! # Incoming Dispatcher
//!
//! Routes every [`AddressedMessage`] to the handlers registered for its
//! routing key. Shared by all connections and by local loopback sends.
//!
//! ## Concurrency
//!
//! The key → handlers map sits behind one `RwLock`. A registration inserts
//! all of its keys under a single write lock, and `dispatch` clones the
//! handler list under a read lock before invoking anything, so dispatch
//! never observes a half-applied registration and handlers run without any
//! lock held.

use crate::errors::RoutingError;
use crate::handler::MessageHandler;
use parking_lot::RwLock;
use shared_types::{AddressedMessage, Component, RoutingKey};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

type HandlerList = Vec<Arc<dyn MessageHandler>>;

fn same_handler(a: &Arc<dyn MessageHandler>, b: &Arc<dyn MessageHandler>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

/// Routing-key based message dispatcher.
#[derive(Default)]
pub struct IncomingDispatcher {
    handlers: RwLock<HashMap<RoutingKey, HandlerList>>,
    dispatched: AtomicU64,
    undeliverable: AtomicU64,
}

impl IncomingDispatcher {
    /// Create an empty dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `keys`.
    ///
    /// Keys the handler already holds are skipped, so re-registering is a
    /// no-op. Returns the number of newly claimed keys; the handler gets one
    /// `handler_added` call for each of them.
    pub fn register_handler(
        &self,
        handler: Arc<dyn MessageHandler>,
        keys: &[RoutingKey],
    ) -> Result<usize, RoutingError> {
        if keys.is_empty() {
            return Err(RoutingError::EmptyKeySet);
        }

        let mut added = Vec::with_capacity(keys.len());
        {
            let mut map = self.handlers.write();
            for key in keys {
                let list = map.entry(key.clone()).or_default();
                if list.iter().any(|h| same_handler(h, &handler)) {
                    continue;
                }
                list.push(handler.clone());
                added.push(key.clone());
            }
        }

        for key in &added {
            handler.handler_added(key);
        }
        debug!(
            handler = handler.name(),
            added = added.len(),
            requested = keys.len(),
            "[Dispatcher] handler registered"
        );
        Ok(added.len())
    }

    /// Unregister `handler` from `keys`. Returns the number of keys released.
    pub fn unregister_handler(&self, handler: &Arc<dyn MessageHandler>, keys: &[RoutingKey]) -> usize {
        let mut removed = Vec::new();
        {
            let mut map = self.handlers.write();
            for key in keys {
                let Some(list) = map.get_mut(key) else {
                    continue;
                };
                let before = list.len();
                list.retain(|h| !same_handler(h, handler));
                if list.len() != before {
                    removed.push(key.clone());
                }
                if list.is_empty() {
                    map.remove(key);
                }
            }
        }

        for key in &removed {
            handler.handler_removed(key);
        }
        removed.len()
    }

    /// Unregister `handler` from every key it holds.
    pub fn unregister_handler_everywhere(&self, handler: &Arc<dyn MessageHandler>) -> usize {
        let keys: Vec<RoutingKey> = self
            .handlers
            .read()
            .iter()
            .filter(|(_, list)| list.iter().any(|h| same_handler(h, handler)))
            .map(|(key, _)| key.clone())
            .collect();
        self.unregister_handler(handler, &keys)
    }

    /// Deliver `message` to every handler registered for its key.
    ///
    /// All handlers run even if one fails; the first failure is returned.
    /// Returns the number of handlers that accepted the message.
    pub async fn dispatch(&self, message: &AddressedMessage) -> Result<usize, RoutingError> {
        let handlers: HandlerList = self
            .handlers
            .read()
            .get(&message.routing_key)
            .cloned()
            .unwrap_or_default();

        if handlers.is_empty() {
            self.undeliverable.fetch_add(1, Ordering::Relaxed);
            warn!(
                key = %message.routing_key,
                from = %message.from.to_short_text(),
                id = %message.id,
                "[Dispatcher] undeliverable message, no handler registered"
            );
            return Err(RoutingError::NoHandler {
                key: message.routing_key.clone(),
            });
        }

        trace!(key = %message.routing_key, handlers = handlers.len(), "[Dispatcher] dispatching");

        let mut delivered = 0;
        let mut first_error = None;
        for handler in &handlers {
            match handler.handle(message).await {
                Ok(()) => delivered += 1,
                Err(source) => {
                    warn!(
                        handler = handler.name(),
                        key = %message.routing_key,
                        error = %source,
                        "[Dispatcher] handler rejected message"
                    );
                    first_error.get_or_insert(RoutingError::Handler {
                        handler: handler.name().to_string(),
                        key: message.routing_key.clone(),
                        source,
                    });
                }
            }
        }
        self.dispatched.fetch_add(1, Ordering::Relaxed);

        match first_error {
            Some(e) => Err(e),
            None => Ok(delivered),
        }
    }

    /// Snapshot of keys with at least one handler.
    #[must_use]
    pub fn registered_keys(&self) -> Vec<RoutingKey> {
        self.handlers.read().keys().cloned().collect()
    }

    /// Number of handlers registered for `key`.
    #[must_use]
    pub fn handler_count(&self, key: &RoutingKey) -> usize {
        self.handlers.read().get(key).map_or(0, Vec::len)
    }

    /// Total messages handed to at least one handler.
    #[must_use]
    pub fn messages_dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    /// Total messages nobody was registered for.
    #[must_use]
    pub fn messages_undeliverable(&self) -> u64 {
        self.undeliverable.load(Ordering::Relaxed)
    }
}

impl Component for IncomingDispatcher {
    fn destroy(&self) {
        let drained: Vec<(RoutingKey, HandlerList)> = self.handlers.write().drain().collect();
        for (key, list) in drained {
            for handler in list {
                handler.handler_removed(&key);
            }
        }
    }
}

#[cfg(test)]
mod tests;
