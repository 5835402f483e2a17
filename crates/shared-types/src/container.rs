//! # Component Container - Typed Lookup and Lifecycle
//!
//! Holds the long-lived services of a node (dispatcher, router, trust store,
//! device keys, ...) keyed by their concrete type.
//!
//! ## Lifecycle
//!
//! - `register` rejects a second component of the same type, then calls
//!   [`Component::init`] with the container so the component can look up
//!   the services it depends on.
//! - `shutdown` calls [`Component::destroy`] in reverse registration order.
//!
//! ```rust,ignore
//! let container = Container::new();
//! container.register(Arc::new(IncomingDispatcher::new()))?;
//! container.register(Arc::new(OutgoingRouter::new(local_id, dispatcher)))?;
//!
//! let router = container.require::<OutgoingRouter>()?;
//!
//! container.shutdown();
//! ```

use crate::errors::ContainerError;
use parking_lot::RwLock;
use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Lifecycle hooks of a container-managed service.
pub trait Component: Send + Sync + 'static {
    /// Called once after registration. The container lock is not held.
    fn init(&self, _container: &Container) -> Result<(), ContainerError> {
        Ok(())
    }

    /// Called on unregister or shutdown.
    fn destroy(&self) {}
}

struct Entry {
    name: &'static str,
    instance: Arc<dyn Any + Send + Sync>,
    lifecycle: Arc<dyn Component>,
}

#[derive(Default)]
struct Registry {
    components: HashMap<TypeId, Entry>,
    order: Vec<TypeId>,
}

/// Typed component registry.
#[derive(Default)]
pub struct Container {
    inner: RwLock<Registry>,
}

impl Container {
    /// Create an empty container.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component and run its init hook.
    ///
    /// If `init` fails the component is removed again and the error returned.
    pub fn register<T: Component>(&self, component: Arc<T>) -> Result<(), ContainerError> {
        let key = TypeId::of::<T>();
        let name = type_name::<T>();
        {
            let mut inner = self.inner.write();
            if inner.components.contains_key(&key) {
                return Err(ContainerError::AlreadyRegistered(name));
            }
            let instance: Arc<dyn Any + Send + Sync> = component.clone();
            let lifecycle: Arc<dyn Component> = component.clone();
            inner.components.insert(
                key,
                Entry {
                    name,
                    instance,
                    lifecycle,
                },
            );
            inner.order.push(key);
        }

        if let Err(e) = component.init(self) {
            warn!(component = name, error = %e, "[Container] init failed, unregistering");
            self.remove_entry(key);
            return Err(e);
        }

        debug!(component = name, "[Container] registered");
        Ok(())
    }

    /// Look up a component.
    #[must_use]
    pub fn get<T: Component>(&self) -> Option<Arc<T>> {
        let instance = self
            .inner
            .read()
            .components
            .get(&TypeId::of::<T>())
            .map(|e| e.instance.clone())?;
        instance.downcast::<T>().ok()
    }

    /// Look up a component that must be present.
    pub fn require<T: Component>(&self) -> Result<Arc<T>, ContainerError> {
        self.get::<T>()
            .ok_or(ContainerError::Missing(type_name::<T>()))
    }

    /// Whether a component of type `T` is registered.
    #[must_use]
    pub fn contains<T: Component>(&self) -> bool {
        self.inner.read().components.contains_key(&TypeId::of::<T>())
    }

    /// Remove a component, running its destroy hook.
    pub fn unregister<T: Component>(&self) -> Option<Arc<T>> {
        let entry = self.remove_entry(TypeId::of::<T>())?;
        entry.lifecycle.destroy();
        debug!(component = entry.name, "[Container] unregistered");
        entry.instance.downcast::<T>().ok()
    }

    /// Number of registered components.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().components.len()
    }

    /// Whether the container is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Destroy every component, newest first.
    pub fn shutdown(&self) {
        let entries: Vec<Entry> = {
            let mut inner = self.inner.write();
            let order = std::mem::take(&mut inner.order);
            order
                .into_iter()
                .rev()
                .filter_map(|key| inner.components.remove(&key))
                .collect()
        };

        info!("[Container] Shutting down {} components", entries.len());
        for entry in entries {
            debug!(component = entry.name, "[Container] destroying");
            entry.lifecycle.destroy();
        }
    }

    fn remove_entry(&self, key: TypeId) -> Option<Entry> {
        let mut inner = self.inner.write();
        let entry = inner.components.remove(&key)?;
        inner.order.retain(|k| *k != key);
        Some(entry)
    }
}
