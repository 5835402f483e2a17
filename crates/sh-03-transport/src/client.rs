//! # Client Endpoint
//!
//! Connects to the master once its address is known (from discovery or
//! configuration), runs the client handshake and hands the authenticated
//! connection to the routing layer.

use crate::connection::{ConnectionDriver, TransportContext};
use crate::errors::TransportError;
use parking_lot::RwLock;
use sh_02_handshake::{ClientHandshake, HandshakeOutcome, TokenSource, TrustStore};
use shared_types::DeviceId;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{info, warn};

/// Client side of the network.
pub struct Client {
    ctx: TransportContext,
    trust: Arc<dyn TrustStore>,
    tokens: Arc<dyn TokenSource>,
    master_addr: RwLock<Option<SocketAddr>>,
}

impl Client {
    pub fn new(ctx: TransportContext, trust: Arc<dyn TrustStore>, tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            ctx,
            trust,
            tokens,
            master_addr: RwLock::new(None),
        }
    }

    /// Record where the master was found.
    pub fn master_found(&self, addr: SocketAddr) {
        info!(%addr, "[Client] master found");
        *self.master_addr.write() = Some(addr);
        self.ctx.listeners.notify(|l| l.on_master_found(addr));
    }

    /// Last known master address.
    #[must_use]
    pub fn master_addr(&self) -> Option<SocketAddr> {
        *self.master_addr.read()
    }

    /// Connect to the last known master address.
    pub async fn connect_to_master(&self) -> Result<ClientConnection, TransportError> {
        let addr = self.master_addr().ok_or(TransportError::MasterAddressUnknown)?;
        self.connect(addr).await
    }

    /// Connect to `addr` and wait for the handshake to finish.
    ///
    /// On success the connection keeps running in the background until the
    /// returned handle is closed, the peer disconnects or an idle timeout
    /// fires.
    pub async fn connect(&self, addr: SocketAddr) -> Result<ClientConnection, TransportError> {
        self.ctx
            .listeners
            .notify(|l| l.on_connecting(&addr.ip().to_string(), addr.port()));

        let connect_timeout = self.ctx.config.connect_timeout;
        let stream = match timeout(connect_timeout, TcpStream::connect(addr)).await {
            Ok(stream) => stream?,
            Err(_) => {
                return Err(TransportError::ConnectTimeout {
                    addr,
                    timeout: connect_timeout,
                })
            }
        };
        stream.set_nodelay(true)?;

        let handshake =
            ClientHandshake::new(self.ctx.keys.clone(), self.trust.clone(), self.tokens.clone());
        let (finished_tx, finished_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let driver =
            ConnectionDriver::new(self.ctx.clone(), handshake, addr).notify_finished(finished_tx);
        let mut task = tokio::spawn(driver.run(stream, shutdown_rx));

        match finished_rx.await {
            Ok(outcome) => {
                info!(
                    master = %outcome.peer_id.to_short_text(),
                    local = outcome.is_connection_local,
                    "[Client] connected"
                );
                Ok(ClientConnection {
                    outcome,
                    shutdown: shutdown_tx,
                    task,
                    joined: false,
                })
            }
            // The driver dropped the sender without finishing: it has failed.
            Err(_) => match (&mut task).await {
                Ok(Err(e)) => {
                    warn!(%addr, error = %e, "[Client] connection failed");
                    Err(e)
                }
                Ok(Ok(_)) => Err(TransportError::ClosedDuringHandshake),
                Err(join) => Err(TransportError::Io(std::io::Error::other(join))),
            },
        }
    }
}

/// Handle to an authenticated connection to the master.
#[derive(Debug)]
pub struct ClientConnection {
    outcome: HandshakeOutcome,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<Result<Option<DeviceId>, TransportError>>,
    joined: bool,
}

impl ClientConnection {
    /// What the handshake established.
    #[must_use]
    pub fn outcome(&self) -> &HandshakeOutcome {
        &self.outcome
    }

    /// The master's id.
    #[must_use]
    pub fn master_id(&self) -> DeviceId {
        self.outcome.peer_id
    }

    /// Whether the connection task is still running.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.task.is_finished()
    }

    /// Close the connection and wait for it to wind down.
    pub async fn close(mut self) -> Result<(), TransportError> {
        let _ = self.shutdown.send(true);
        self.closed().await
    }

    /// Wait until the connection ends on its own. Returns `Ok` immediately
    /// once the end has been observed.
    ///
    /// Cancel-safe: dropping the future leaves the connection running, and
    /// [`ClientConnection::close`] can still be called afterwards.
    pub async fn closed(&mut self) -> Result<(), TransportError> {
        if self.joined {
            return Ok(());
        }
        let result = Self::join(&mut self.task).await;
        self.joined = true;
        result
    }

    async fn join(
        task: &mut JoinHandle<Result<Option<DeviceId>, TransportError>>,
    ) -> Result<(), TransportError> {
        match task.await {
            Ok(result) => result.map(|_| ()),
            Err(join) => Err(TransportError::Io(std::io::Error::other(join))),
        }
    }
}
