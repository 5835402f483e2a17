//! # Master Endpoint
//!
//! Accepts client connections and runs the server handshake on each one.
//! Every accepted socket gets its own driver task; the accept loop only
//! spawns and reaps.

use crate::connection::{ConnectionDriver, TransportContext};
use crate::errors::TransportError;
use sh_02_handshake::{DeviceRegistry, ServerHandshake};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Master side of the network.
pub struct Server {
    listener: TcpListener,
    ctx: TransportContext,
    registry: Arc<dyn DeviceRegistry>,
}

impl Server {
    /// Bind the listening socket.
    pub async fn bind(
        addr: SocketAddr,
        ctx: TransportContext,
        registry: Arc<dyn DeviceRegistry>,
    ) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "[Server] listening");
        Ok(Self {
            listener,
            ctx,
            registry,
        })
    }

    /// The bound address (useful when binding port 0).
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `shutdown` turns true or its sender is dropped.
    /// Open connections are told to close and awaited before returning.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<(), TransportError> {
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, remote) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            // Per-socket failures (EMFILE, aborted handshakes) are not fatal.
                            warn!(error = %e, "[Server] accept failed");
                            continue;
                        }
                    };
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!(%remote, error = %e, "[Server] set_nodelay failed");
                    }
                    debug!(%remote, "[Server] accepted");

                    let handshake = ServerHandshake::new(
                        self.ctx.keys.clone(),
                        self.registry.clone(),
                        remote.ip(),
                    );
                    let driver = ConnectionDriver::new(self.ctx.clone(), handshake, remote);
                    connections.spawn(driver.run(stream, shutdown.clone()));
                }
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "[Server] connection task panicked");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(open = connections.len(), "[Server] shutting down");
        while let Some(joined) = connections.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "[Server] connection task panicked");
            }
        }
        Ok(())
    }
}
