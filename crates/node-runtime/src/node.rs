//! # Node Wiring
//!
//! Builds the component container for one device and runs it in its role.
//!
//! ## Startup Sequence
//!
//! 1. Validate configuration
//! 2. Load (or create) the device keys
//! 3. Register the routing layer: dispatcher, connection registry, router
//! 4. Register role state: device registry (master) or trust store (client)
//! 5. Master: listen until shutdown. Client: connect once and stay connected
//!    until the master closes or shutdown is requested
//!
//! Teardown goes through [`Container::shutdown`], in reverse registration
//! order.

use crate::config::{NodeConfig, Role};
use crate::handlers::DeviceConnectedLogger;
use crate::storage::{load_or_create_keys, FileDeviceRegistry, FileTrustStore};
use anyhow::{bail, Context, Result};
use sh_01_bootstrap::{ConnectInformation, RegistrationToken};
use sh_02_handshake::{DeviceRegistry, StaticTokens, TrustStore};
use sh_03_transport::{
    Client, ConnectionListener, Listeners, Server, TransportContext, DEVICE_CONNECTED,
};
use shared_bus::{ConnectionRegistry, IncomingDispatcher, MasterResolver, OutgoingRouter};
use shared_crypto::DeviceKeys;
use shared_types::{Container, DeviceId};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// The master resolves itself.
struct LocalMaster(DeviceId);

impl MasterResolver for LocalMaster {
    fn master_id(&self) -> Option<DeviceId> {
        Some(self.0)
    }
}

/// One configured device.
pub struct Node {
    config: NodeConfig,
    keys: Arc<DeviceKeys>,
    container: Container,
    listeners: Listeners,
    device_log: Arc<DeviceConnectedLogger>,
}

impl Node {
    /// Load keys and state and wire the container. Does no network I/O.
    pub fn open(config: NodeConfig) -> Result<Self> {
        config.validate().context("invalid configuration")?;
        let data_dir = config.storage.data_dir.as_path();

        let keys = Arc::new(
            load_or_create_keys(data_dir, &config.node.name).context("loading device keys")?,
        );
        let local_id = DeviceId::from_certificate(keys.certificate());

        let container = Container::new();
        let dispatcher = Arc::new(IncomingDispatcher::new());
        let connections = Arc::new(ConnectionRegistry::new());
        container.register(dispatcher.clone())?;
        container.register(connections.clone())?;

        let master: Arc<dyn MasterResolver> = match config.node.role {
            Role::Master => {
                let registry = FileDeviceRegistry::open(data_dir).context("opening device registry")?;
                container.register(Arc::new(registry))?;
                Arc::new(LocalMaster(local_id))
            }
            Role::Client => {
                let trust = Arc::new(FileTrustStore::open(data_dir).context("opening trust store")?);
                container.register(trust.clone())?;
                trust
            }
        };
        container.register(Arc::new(OutgoingRouter::new(
            local_id,
            dispatcher.clone(),
            connections,
            master,
        )))?;

        let device_log = Arc::new(DeviceConnectedLogger::new());
        if config.node.role == Role::Master {
            dispatcher.register_handler(device_log.clone(), &[DEVICE_CONNECTED])?;
        }

        info!(
            id = %local_id.to_short_text(),
            name = %config.node.name,
            role = ?config.node.role,
            "Node initialized"
        );
        Ok(Self {
            config,
            keys,
            container,
            listeners: Listeners::new(),
            device_log,
        })
    }

    /// This device's id.
    #[must_use]
    pub fn local_id(&self) -> DeviceId {
        DeviceId::from_certificate(self.keys.certificate())
    }

    #[must_use]
    pub fn keys(&self) -> &Arc<DeviceKeys> {
        &self.keys
    }

    #[must_use]
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// The component container.
    #[must_use]
    pub fn container(&self) -> &Container {
        &self.container
    }

    /// The outbound router, for application handlers.
    pub fn router(&self) -> Result<Arc<OutgoingRouter>> {
        Ok(self.container.require::<OutgoingRouter>()?)
    }

    /// The inbound dispatcher, for registering application handlers.
    pub fn dispatcher(&self) -> Result<Arc<IncomingDispatcher>> {
        Ok(self.container.require::<IncomingDispatcher>()?)
    }

    /// Devices that connected to this master since start.
    #[must_use]
    pub fn device_log(&self) -> &Arc<DeviceConnectedLogger> {
        &self.device_log
    }

    /// Observe connection lifecycle events.
    pub fn add_listener(&self, listener: Arc<dyn ConnectionListener>) {
        self.listeners.add(listener);
    }

    fn transport_context(&self) -> Result<TransportContext> {
        Ok(TransportContext {
            keys: self.keys.clone(),
            dispatcher: self.container.require::<IncomingDispatcher>()?,
            connections: self.container.require::<ConnectionRegistry>()?,
            listeners: self.listeners.clone(),
            config: self.config.transport(),
        })
    }

    /// Issue a single-use active registration token and return the bootstrap
    /// information to hand to the new device.
    pub fn invite(&self) -> Result<ConnectInformation> {
        let registry = self.master_registry("invite")?;
        let token = RegistrationToken::random();
        registry.issue_active_token(token.clone())?;

        Ok(ConnectInformation::new(
            self.config.advertised_address()?,
            self.config.network.listen_addr.port(),
            self.local_id(),
            token,
        ))
    }

    /// Pre-admit `device` and return the passive token that proves this
    /// master to it on its first connection.
    pub fn invite_passive(&self, device: DeviceId) -> Result<RegistrationToken> {
        let registry = self.master_registry("invite --passive")?;
        let token = RegistrationToken::random();
        registry.expect_passive_registration(device, token.clone())?;
        Ok(token)
    }

    fn master_registry(&self, operation: &str) -> Result<Arc<FileDeviceRegistry>> {
        if self.config.node.role != Role::Master {
            bail!("`{operation}` is only available with role = \"master\"");
        }
        Ok(self.container.require::<FileDeviceRegistry>()?)
    }

    /// Run in the configured role until `shutdown` turns true.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<()> {
        match self.config.node.role {
            Role::Master => self.run_master(shutdown).await,
            Role::Client => self.run_client(shutdown).await,
        }
    }

    async fn run_master(&self, shutdown: watch::Receiver<bool>) -> Result<()> {
        let registry = self.container.require::<FileDeviceRegistry>()?;
        let server = Server::bind(
            self.config.network.listen_addr,
            self.transport_context()?,
            registry,
        )
        .await
        .with_context(|| format!("binding {}", self.config.network.listen_addr))?;

        server.run(shutdown).await?;
        Ok(())
    }

    async fn run_client(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let trust = self.container.require::<FileTrustStore>()?;
        let tokens = Arc::new(StaticTokens::new());

        let mut master_addr = self.config.network.master_addr;
        if let Some(info) = self.config.connect_information()? {
            trust
                .set_master_id(info.id)
                .context("bootstrap text names a different master than the one already trusted")?;
            tokens.set_active(Some(info.token.clone()));
            master_addr = Some(info.socket_addr());
        }
        tokens.set_passive(self.config.passive_token()?);

        let client = Client::new(self.transport_context()?, trust, tokens);
        if let Some(addr) = master_addr {
            client.master_found(addr);
        }

        let mut connection = client
            .connect_to_master()
            .await
            .context("connecting to master")?;

        let shutdown_requested = tokio::select! {
            result = connection.closed() => {
                result.context("connection to master failed")?;
                false
            }
            _ = shutdown.wait_for(|stop| *stop) => true,
        };
        if shutdown_requested {
            connection.close().await?;
        } else {
            info!("Master closed the connection");
        }
        Ok(())
    }

    /// Destroy all components in reverse registration order.
    pub fn shutdown(&self) {
        self.container.shutdown();
    }
}
