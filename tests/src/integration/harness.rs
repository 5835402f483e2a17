//! # Test Harness
//!
//! Builds complete devices (keys, dispatcher, connection registry, router)
//! and a running master on an ephemeral loopback port.

use async_trait::async_trait;
use parking_lot::Mutex;
use sh_02_handshake::{
    DeviceRegistry, HandshakeOutcome, InMemoryDeviceRegistry, InMemoryTrustStore, StaticTokens,
};
use sh_03_transport::{
    Client, ConnectionListener, Server, TransportConfig, TransportContext, TransportError,
};
use shared_bus::{
    ConnectionRegistry, HandlerError, IncomingDispatcher, MasterResolver, MessageHandler,
    OutgoingRouter,
};
use shared_crypto::DeviceKeys;
use shared_types::{AddressedMessage, DeviceId, RoutingKey};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

// =============================================================================
// DEVICES
// =============================================================================

/// Master id as seen by the master itself.
pub struct SelfResolver(pub DeviceId);

impl MasterResolver for SelfResolver {
    fn master_id(&self) -> Option<DeviceId> {
        Some(self.0)
    }
}

/// One device's routing stack.
pub struct Device {
    pub keys: Arc<DeviceKeys>,
    pub ctx: TransportContext,
    pub router: Arc<OutgoingRouter>,
    pub listener: Arc<RecordingListener>,
}

impl Device {
    /// A device whose router resolves the master through `master`.
    pub fn new(name: &str, config: TransportConfig, master: Option<Arc<dyn MasterResolver>>) -> Self {
        let keys = Arc::new(DeviceKeys::generate(name));
        let ctx = TransportContext::new(
            keys.clone(),
            Arc::new(IncomingDispatcher::new()),
            Arc::new(ConnectionRegistry::new()),
        )
        .with_config(config);
        let local_id = ctx.local_id();
        let master: Arc<dyn MasterResolver> = match master {
            Some(master) => master,
            None => Arc::new(SelfResolver(local_id)),
        };
        let router = Arc::new(OutgoingRouter::new(
            local_id,
            ctx.dispatcher.clone(),
            ctx.connections.clone(),
            master,
        ));
        let listener = Arc::new(RecordingListener::default());
        ctx.listeners.add(listener.clone());
        Self {
            keys,
            ctx,
            router,
            listener,
        }
    }

    #[must_use]
    pub fn id(&self) -> DeviceId {
        self.ctx.local_id()
    }

    /// Register an inbox for `keys`.
    pub fn inbox(&self, keys: &[RoutingKey]) -> mpsc::UnboundedReceiver<AddressedMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        let inbox = Arc::new(Inbox { tx });
        self.ctx
            .dispatcher
            .register_handler(inbox, keys)
            .expect("inbox registration");
        rx
    }
}

/// Client device with its trust store and tokens.
pub struct ClientDevice {
    pub device: Device,
    pub trust: Arc<InMemoryTrustStore>,
    pub tokens: Arc<StaticTokens>,
    pub client: Client,
}

impl ClientDevice {
    pub fn new(name: &str, trust: InMemoryTrustStore, tokens: StaticTokens) -> Self {
        Self::with_config(name, trust, tokens, TransportConfig::for_testing())
    }

    pub fn with_config(
        name: &str,
        trust: InMemoryTrustStore,
        tokens: StaticTokens,
        config: TransportConfig,
    ) -> Self {
        let trust = Arc::new(trust);
        let tokens = Arc::new(tokens);
        let resolver: Arc<dyn MasterResolver> = trust.clone();
        let device = Device::new(name, config, Some(resolver));
        let client = Client::new(device.ctx.clone(), trust.clone(), tokens.clone());
        Self {
            device,
            trust,
            tokens,
            client,
        }
    }

    #[must_use]
    pub fn id(&self) -> DeviceId {
        self.device.id()
    }
}

// =============================================================================
// MASTER FIXTURE
// =============================================================================

/// A master listening on `127.0.0.1:<ephemeral>`.
pub struct RunningMaster {
    pub device: Device,
    pub registry: Arc<InMemoryDeviceRegistry>,
    pub addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<Result<(), TransportError>>,
}

impl RunningMaster {
    pub async fn start() -> Self {
        Self::start_with(TransportConfig::for_testing()).await
    }

    pub async fn start_with(config: TransportConfig) -> Self {
        let device = Device::new("master", config, None);
        let registry = Arc::new(InMemoryDeviceRegistry::new());
        let server = Server::bind(
            "127.0.0.1:0".parse().expect("loopback address"),
            device.ctx.clone(),
            registry.clone(),
        )
        .await
        .expect("bind");
        let addr = server.local_addr().expect("bound address");
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(server.run(shutdown_rx));
        Self {
            device,
            registry,
            addr,
            shutdown,
            task,
        }
    }

    #[must_use]
    pub fn id(&self) -> DeviceId {
        self.device.id()
    }

    /// Issue a fresh active registration token.
    pub fn issue_token(&self) -> sh_01_bootstrap::RegistrationToken {
        let token = sh_01_bootstrap::RegistrationToken::random();
        self.registry
            .issue_active_token(token.clone())
            .expect("issue token");
        token
    }

    /// A client that knows this master's id and holds a fresh active token.
    pub fn enroll(&self, name: &str) -> ClientDevice {
        ClientDevice::new(
            name,
            InMemoryTrustStore::with_master_id(self.id()),
            StaticTokens::with_active(self.issue_token()),
        )
    }

    /// Stop accepting, close every connection and wait for the server.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        self.task
            .await
            .expect("server task")
            .expect("server result");
    }
}

// =============================================================================
// OBSERVERS
// =============================================================================

/// Connection lifecycle event, as seen by a [`RecordingListener`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    MasterFound(SocketAddr),
    Connecting(String, u16),
    Connected(DeviceId),
    Disconnected(Option<DeviceId>),
    Rejected(String),
}

/// Records every callback in order.
#[derive(Debug, Default)]
pub struct RecordingListener {
    events: Mutex<Vec<Event>>,
}

impl RecordingListener {
    #[must_use]
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    #[must_use]
    pub fn rejections(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Rejected(reason) => Some(reason),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn saw(&self, event: &Event) -> bool {
        self.events.lock().contains(event)
    }
}

impl ConnectionListener for RecordingListener {
    fn on_master_found(&self, addr: SocketAddr) {
        self.events.lock().push(Event::MasterFound(addr));
    }

    fn on_connecting(&self, host: &str, port: u16) {
        self.events.lock().push(Event::Connecting(host.to_string(), port));
    }

    fn on_connected(&self, peer: &HandshakeOutcome) {
        self.events.lock().push(Event::Connected(peer.peer_id));
    }

    fn on_disconnected(&self, peer: Option<DeviceId>) {
        self.events.lock().push(Event::Disconnected(peer));
    }

    fn on_rejected(&self, message: &str) {
        self.events.lock().push(Event::Rejected(message.to_string()));
    }
}

/// Forwards every message to a channel.
struct Inbox {
    tx: mpsc::UnboundedSender<AddressedMessage>,
}

#[async_trait]
impl MessageHandler for Inbox {
    fn name(&self) -> &str {
        "test-inbox"
    }

    async fn handle(&self, message: &AddressedMessage) -> Result<(), HandlerError> {
        self.tx
            .send(message.clone())
            .map_err(|_| HandlerError::Failed("inbox dropped".to_string()))
    }
}

// =============================================================================
// HELPERS
// =============================================================================

/// Poll `condition` until it holds or two seconds pass.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}

/// Next message from an inbox, or `None` after two seconds.
pub async fn next_message(rx: &mut mpsc::UnboundedReceiver<AddressedMessage>) -> Option<AddressedMessage> {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .ok()
        .flatten()
}
