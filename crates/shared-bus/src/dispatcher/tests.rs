//! Tests for the Incoming Dispatcher

use super::*;
use crate::handler::{HandlerError, RegisteredKeys};
use async_trait::async_trait;
use parking_lot::Mutex;
use shared_types::{DeviceId, Message};

// =============================================================================
// TEST HELPERS
// =============================================================================

const LIGHTS: RoutingKey = RoutingKey::from_static("client/lights");
const DOOR: RoutingKey = RoutingKey::from_static("client/door");

#[derive(Default)]
struct Recorder {
    keys: RegisteredKeys,
    seen: Mutex<Vec<RoutingKey>>,
    added: Mutex<Vec<RoutingKey>>,
    removed: Mutex<Vec<RoutingKey>>,
}

#[async_trait]
impl MessageHandler for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }

    async fn handle(&self, message: &AddressedMessage) -> Result<(), HandlerError> {
        self.seen.lock().push(message.routing_key.clone());
        Ok(())
    }

    fn handler_added(&self, key: &RoutingKey) {
        self.keys.added(key);
        self.added.lock().push(key.clone());
    }

    fn handler_removed(&self, key: &RoutingKey) {
        self.keys.removed(key);
        self.removed.lock().push(key.clone());
    }
}

#[derive(Default)]
struct Picky {
    keys: RegisteredKeys,
}

#[async_trait]
impl MessageHandler for Picky {
    fn name(&self) -> &str {
        "picky"
    }

    async fn handle(&self, message: &AddressedMessage) -> Result<(), HandlerError> {
        Err(self.keys.invalid_message(message, "payload is not a lamp command"))
    }

    fn handler_added(&self, key: &RoutingKey) {
        self.keys.added(key);
    }
}

fn message(key: RoutingKey) -> AddressedMessage {
    let local = DeviceId::new([7; 32]);
    AddressedMessage::new(local, local, key, Message::from_bytes(vec![1, 2, 3]))
}

// =============================================================================
// TEST GROUP 1: Registration
// =============================================================================

#[test]
fn test_register_notifies_each_key() {
    let dispatcher = IncomingDispatcher::new();
    let recorder = Arc::new(Recorder::default());

    let added = dispatcher
        .register_handler(recorder.clone(), &[LIGHTS, DOOR])
        .unwrap();

    assert_eq!(added, 2);
    assert_eq!(*recorder.added.lock(), vec![LIGHTS, DOOR]);
    assert_eq!(dispatcher.handler_count(&LIGHTS), 1);
}

#[test]
fn test_reregistration_is_noop() {
    let dispatcher = IncomingDispatcher::new();
    let recorder = Arc::new(Recorder::default());

    dispatcher.register_handler(recorder.clone(), &[LIGHTS]).unwrap();
    let added = dispatcher
        .register_handler(recorder.clone(), &[LIGHTS, DOOR])
        .unwrap();

    assert_eq!(added, 1);
    assert_eq!(dispatcher.handler_count(&LIGHTS), 1);
    assert_eq!(*recorder.added.lock(), vec![LIGHTS, DOOR]);
}

#[test]
fn test_empty_key_set_rejected() {
    let dispatcher = IncomingDispatcher::new();
    let result = dispatcher.register_handler(Arc::new(Recorder::default()), &[]);
    assert_eq!(result, Err(RoutingError::EmptyKeySet));
}

#[test]
fn test_unregister_notifies_and_cleans_up() {
    let dispatcher = IncomingDispatcher::new();
    let recorder = Arc::new(Recorder::default());
    let handle: Arc<dyn MessageHandler> = recorder.clone();

    dispatcher.register_handler(handle.clone(), &[LIGHTS, DOOR]).unwrap();
    assert_eq!(dispatcher.unregister_handler_everywhere(&handle), 2);

    assert!(dispatcher.registered_keys().is_empty());
    assert_eq!(recorder.removed.lock().len(), 2);
    assert!(recorder.keys.is_empty());
}

// =============================================================================
// TEST GROUP 2: Dispatch
// =============================================================================

#[tokio::test]
async fn test_dispatch_reaches_all_handlers_for_key() {
    let dispatcher = IncomingDispatcher::new();
    let a = Arc::new(Recorder::default());
    let b = Arc::new(Recorder::default());
    dispatcher.register_handler(a.clone(), &[LIGHTS]).unwrap();
    dispatcher.register_handler(b.clone(), &[LIGHTS, DOOR]).unwrap();

    let delivered = dispatcher.dispatch(&message(LIGHTS)).await.unwrap();

    assert_eq!(delivered, 2);
    assert_eq!(*a.seen.lock(), vec![LIGHTS]);
    assert_eq!(*b.seen.lock(), vec![LIGHTS]);
    assert_eq!(dispatcher.messages_dispatched(), 1);
}

#[tokio::test]
async fn test_undeliverable_is_reported() {
    let dispatcher = IncomingDispatcher::new();
    dispatcher
        .register_handler(Arc::new(Recorder::default()), &[DOOR])
        .unwrap();

    let result = dispatcher.dispatch(&message(LIGHTS)).await;

    assert_eq!(result, Err(RoutingError::NoHandler { key: LIGHTS }));
    assert_eq!(dispatcher.messages_undeliverable(), 1);
}

#[tokio::test]
async fn test_invalid_message_surfaces() {
    let dispatcher = IncomingDispatcher::new();
    let recorder = Arc::new(Recorder::default());
    dispatcher.register_handler(Arc::new(Picky::default()), &[LIGHTS]).unwrap();
    dispatcher.register_handler(recorder.clone(), &[LIGHTS]).unwrap();

    let result = dispatcher.dispatch(&message(LIGHTS)).await;

    assert!(matches!(
        result,
        Err(RoutingError::Handler {
            source: HandlerError::InvalidMessage { .. },
            ..
        })
    ));
    // the other handler still ran
    assert_eq!(recorder.seen.lock().len(), 1);
}

#[tokio::test]
async fn test_destroy_releases_all_handlers() {
    let dispatcher = IncomingDispatcher::new();
    let recorder = Arc::new(Recorder::default());
    dispatcher.register_handler(recorder.clone(), &[LIGHTS, DOOR]).unwrap();

    dispatcher.destroy();

    assert!(dispatcher.registered_keys().is_empty());
    assert_eq!(recorder.removed.lock().len(), 2);
    assert!(dispatcher.dispatch(&message(LIGHTS)).await.is_err());
}

#[tokio::test]
async fn test_concurrent_registration_and_dispatch() {
    let dispatcher = Arc::new(IncomingDispatcher::new());
    let recorder = Arc::new(Recorder::default());
    dispatcher.register_handler(recorder.clone(), &[LIGHTS]).unwrap();

    let mut tasks = Vec::new();
    for i in 0..16 {
        let dispatcher = dispatcher.clone();
        tasks.push(tokio::spawn(async move {
            let key = RoutingKey::new(format!("dynamic/{i}"));
            dispatcher
                .register_handler(Arc::new(Recorder::default()), &[key])
                .unwrap();
            dispatcher.dispatch(&message(LIGHTS)).await.unwrap()
        }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap(), 1);
    }

    assert_eq!(recorder.seen.lock().len(), 16);
    assert_eq!(dispatcher.registered_keys().len(), 17);
}
