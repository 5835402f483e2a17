//! # Connection Driver
//!
//! One task per connection, exclusive owner of its handshake and pipeline.
//!
//! ```text
//!             ┌────────────── reader task ──────────────┐
//!  socket ──► │ read_frame ──► mpsc ─────────────┐      │
//!             └──────────────────────────────────┼──────┘
//!                                                ▼
//!                          ┌───────────── driver (select!) ─────────────┐
//!                          │ frame   → pipeline → handshake | inbound ──┼──► dispatch task
//!  router ──► outbox ────► │ message → pipeline → socket   (finished)   │      (handlers)
//!                          │ timer   → ping | handshake/idle timeout    │
//!                          │ shutdown                                   │
//!                          └────────────────────────────────────────────┘
//! ```
//!
//! Frames are processed one at a time, in arrival order. A handshake or
//! security failure flushes whatever the handshake queued (a rejection
//! notice, for instance) and then closes the socket.
//!
//! Handlers never run on the driver. Authenticated messages go to a
//! per-connection dispatch task that handles them one at a time, in arrival
//! order, so a handler may send through this same connection (a burst of
//! replies larger than the outbox, for instance) while the driver keeps
//! writing.
//!
//! The router refuses envelopes that cannot fit in one frame; anything that
//! reaches the outbox oversized anyway is dropped with a warning and the
//! connection stays up.

use crate::config::TransportConfig;
use crate::errors::TransportError;
use crate::events::{DeviceConnected, DEVICE_CONNECTED};
use crate::framing::{read_frame, write_frame};
use crate::listener::Listeners;
use sh_02_handshake::{
    max_envelope_size, Handshake, HandshakeOutcome, HandshakeProgress, HandshakeState,
    ProtocolViolation, Role, SecureChannel, WireMessage,
};
use shared_bus::{ConnectionRegistry, IncomingDispatcher, PeerConnection, TimeBoundedNonceCache};
use shared_crypto::DeviceKeys;
use shared_types::{AddressedMessage, DeviceId, Message};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

/// Everything a connection shares with the rest of the node.
#[derive(Clone)]
pub struct TransportContext {
    pub keys: Arc<DeviceKeys>,
    pub dispatcher: Arc<IncomingDispatcher>,
    pub connections: Arc<ConnectionRegistry>,
    pub listeners: Listeners,
    pub config: TransportConfig,
}

impl TransportContext {
    /// Context with no listeners and default timing.
    pub fn new(
        keys: Arc<DeviceKeys>,
        dispatcher: Arc<IncomingDispatcher>,
        connections: Arc<ConnectionRegistry>,
    ) -> Self {
        Self {
            keys,
            dispatcher,
            connections,
            listeners: Listeners::new(),
            config: TransportConfig::default(),
        }
    }

    /// Replace the timing configuration.
    #[must_use]
    pub fn with_config(mut self, config: TransportConfig) -> Self {
        self.config = config;
        self
    }

    /// This device's id.
    #[must_use]
    pub fn local_id(&self) -> DeviceId {
        DeviceId::from_certificate(self.keys.certificate())
    }
}

// =============================================================================
// IDLE TIMERS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerEvent {
    HandshakeExpired,
    ReaderIdle,
    AllIdle,
    WriterIdle,
}

/// Read/write activity clocks.
struct IdleTimers {
    started: Instant,
    last_read: Instant,
    last_write: Instant,
}

impl IdleTimers {
    fn new(now: Instant) -> Self {
        Self {
            started: now,
            last_read: now,
            last_write: now,
        }
    }

    fn next_deadline(&self, config: &TransportConfig, finished: bool) -> Instant {
        let last_any = self.last_read.max(self.last_write);
        let mut deadline = (self.last_read + config.reader_idle).min(last_any + config.all_idle);
        if finished {
            deadline = deadline.min(self.last_write + config.writer_idle);
        } else {
            deadline = deadline.min(self.started + config.handshake_timeout);
        }
        deadline
    }

    fn expired(&self, config: &TransportConfig, finished: bool, now: Instant) -> Option<TimerEvent> {
        if !finished && now >= self.started + config.handshake_timeout {
            return Some(TimerEvent::HandshakeExpired);
        }
        if now >= self.last_read + config.reader_idle {
            return Some(TimerEvent::ReaderIdle);
        }
        if now >= self.last_read.max(self.last_write) + config.all_idle {
            return Some(TimerEvent::AllIdle);
        }
        if finished && now >= self.last_write + config.writer_idle {
            return Some(TimerEvent::WriterIdle);
        }
        None
    }
}

// =============================================================================
// DRIVER
// =============================================================================

/// Authenticated state of a finished connection.
struct Session {
    peer: DeviceId,
    connection_id: Uuid,
    nonces: TimeBoundedNonceCache,
}

/// Drives one connection from first byte to close.
pub(crate) struct ConnectionDriver<H> {
    ctx: TransportContext,
    handshake: H,
    channel: SecureChannel,
    remote: SocketAddr,
    session: Option<Session>,
    outbox_tx: Option<mpsc::Sender<AddressedMessage>>,
    inbound_tx: Option<mpsc::UnboundedSender<AddressedMessage>>,
    finished_tx: Option<oneshot::Sender<HandshakeOutcome>>,
}

impl<H: Handshake> ConnectionDriver<H> {
    pub(crate) fn new(ctx: TransportContext, handshake: H, remote: SocketAddr) -> Self {
        Self {
            ctx,
            handshake,
            channel: SecureChannel::new(),
            remote,
            session: None,
            outbox_tx: None,
            inbound_tx: None,
            finished_tx: None,
        }
    }

    /// Report the handshake outcome on `tx` once finished.
    pub(crate) fn notify_finished(mut self, tx: oneshot::Sender<HandshakeOutcome>) -> Self {
        self.finished_tx = Some(tx);
        self
    }

    /// Run until the peer closes, a fatal error occurs or `shutdown` fires.
    ///
    /// Returns the authenticated peer, if the handshake finished.
    pub(crate) async fn run(
        mut self,
        stream: TcpStream,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<Option<DeviceId>, TransportError> {
        let (mut reader, mut writer) = stream.into_split();
        let max_frame_size = self.ctx.config.max_frame_size;

        let (frames_tx, mut frames_rx) = mpsc::channel(16);
        let reader_task = tokio::spawn(async move {
            loop {
                let frame = read_frame(&mut reader, max_frame_size).await;
                let end = !matches!(frame, Ok(Some(_)));
                if frames_tx.send(frame).await.is_err() || end {
                    break;
                }
            }
        });

        let (outbox_tx, mut outbox_rx) = mpsc::channel(self.ctx.config.outbox_capacity);
        self.outbox_tx = Some(outbox_tx);

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        self.inbound_tx = Some(inbound_tx);
        tokio::spawn(dispatch_inbound(self.ctx.dispatcher.clone(), inbound_rx));

        let result = self
            .event_loop(&mut writer, &mut frames_rx, &mut outbox_rx, &mut shutdown)
            .await;

        // Messages already accepted are still handed to their handlers.
        self.inbound_tx = None;
        reader_task.abort();
        // Best effort; the peer may already be gone.
        let _ = writer.shutdown().await;
        self.close(&result);
        result.map(|()| self.session.as_ref().map(|s| s.peer))
    }

    async fn event_loop(
        &mut self,
        writer: &mut OwnedWriteHalf,
        frames_rx: &mut mpsc::Receiver<Result<Option<Vec<u8>>, TransportError>>,
        outbox_rx: &mut mpsc::Receiver<AddressedMessage>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(), TransportError> {
        let mut timers = IdleTimers::new(Instant::now());

        let started = self.handshake.start(&mut self.channel);
        self.flush(writer, &mut timers).await?;
        if let HandshakeProgress::Finished(outcome) = started? {
            self.finish(outcome);
        }

        loop {
            let finished = self.session.is_some();
            let deadline = timers.next_deadline(&self.ctx.config, finished);

            tokio::select! {
                frame = frames_rx.recv() => {
                    let frame = match frame {
                        Some(Ok(Some(frame))) => frame,
                        Some(Err(e)) => return Err(e),
                        Some(Ok(None)) | None if finished => {
                            debug!(remote = %self.remote, "[Connection] closed by peer");
                            return Ok(());
                        }
                        Some(Ok(None)) | None => return Err(TransportError::ClosedDuringHandshake),
                    };
                    timers.last_read = Instant::now();
                    let processed = self.on_frame(frame);
                    self.flush(writer, &mut timers).await?;
                    processed?;
                }
                message = outbox_rx.recv(), if finished => {
                    let Some(message) = message else {
                        debug!(remote = %self.remote, "[Connection] outbox closed, superseded or shut down");
                        return Ok(());
                    };
                    if self.fits_in_frame(&message) {
                        self.channel.send(&WireMessage::Message(message))?;
                        self.flush(writer, &mut timers).await?;
                    }
                }
                () = sleep_until(deadline) => {
                    match timers.expired(&self.ctx.config, finished, Instant::now()) {
                        Some(TimerEvent::HandshakeExpired) => {
                            return Err(TransportError::HandshakeTimeout(self.ctx.config.handshake_timeout));
                        }
                        Some(TimerEvent::ReaderIdle) => {
                            return Err(TransportError::IdleTimeout(self.ctx.config.reader_idle));
                        }
                        Some(TimerEvent::AllIdle) => {
                            return Err(TransportError::IdleTimeout(self.ctx.config.all_idle));
                        }
                        Some(TimerEvent::WriterIdle) => {
                            trace!(remote = %self.remote, "[Connection] ping");
                            self.channel.send(&WireMessage::Ping)?;
                            self.flush(writer, &mut timers).await?;
                        }
                        None => {}
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!(remote = %self.remote, "[Connection] shutting down");
                        return Ok(());
                    }
                }
            }
        }
    }

    fn on_frame(&mut self, frame: Vec<u8>) -> Result<(), TransportError> {
        let message = self.channel.receive(frame)?;

        let Some(session) = self.session.as_mut() else {
            let packet = match message {
                WireMessage::Handshake(packet) => packet,
                other => return Err(ProtocolViolation::PrematureTraffic(other.kind()).into()),
            };
            if let HandshakeProgress::Finished(outcome) =
                self.handshake.on_packet(packet, &mut self.channel)?
            {
                self.finish(outcome);
            }
            return Ok(());
        };

        match message {
            WireMessage::Handshake(packet) => Err(ProtocolViolation::UnexpectedPacket {
                state: HandshakeState::Finished,
                packet: packet.kind(),
            }
            .into()),
            WireMessage::Ping => {
                trace!(remote = %self.remote, "[Connection] ping received");
                Ok(())
            }
            WireMessage::Message(message) => {
                if message.from != session.peer {
                    return Err(TransportError::ForgedSender {
                        claimed: message.from,
                        peer: session.peer,
                    });
                }
                session.nonces.check_message(&message)?;

                let local_id = self.ctx.local_id();
                if message.to != local_id {
                    warn!(
                        to = %message.to.to_short_text(),
                        key = %message.routing_key,
                        "[Connection] dropping message addressed to another device"
                    );
                    return Ok(());
                }
                self.enqueue_inbound(message);
                Ok(())
            }
        }
    }

    fn finish(&mut self, outcome: HandshakeOutcome) {
        let Some(outbox_tx) = self.outbox_tx.take() else {
            return;
        };
        let connection = PeerConnection::new(self.remote, outcome.is_connection_local, outbox_tx)
            .with_max_message_size(max_envelope_size(self.ctx.config.max_frame_size));
        let connection_id = connection.connection_id;
        if let Some(previous) = self.ctx.connections.register(outcome.peer_id, connection) {
            debug!(
                peer = %outcome.peer_id.to_short_text(),
                previous = %previous.connection_id,
                "[Connection] replaced older connection"
            );
        }
        self.session = Some(Session {
            peer: outcome.peer_id,
            connection_id,
            nonces: TimeBoundedNonceCache::new(),
        });

        info!(
            peer = %outcome.peer_id.to_short_text(),
            remote = %self.remote,
            role = ?self.handshake.role(),
            "[Connection] handshake finished"
        );
        self.ctx.listeners.notify(|l| l.on_connected(&outcome));

        if self.handshake.role() == Role::Acceptor {
            if let Some(event) = device_connected_event(&self.ctx, &outcome) {
                self.enqueue_inbound(event);
            }
        }
        if let Some(tx) = self.finished_tx.take() {
            let _ = tx.send(outcome);
        }
    }

    fn enqueue_inbound(&self, message: AddressedMessage) {
        let Some(inbound) = &self.inbound_tx else {
            return;
        };
        if inbound.send(message).is_err() {
            warn!(remote = %self.remote, "[Connection] dispatch task is gone, message dropped");
        }
    }

    /// Whether `message` fits in one frame; oversized messages are dropped.
    fn fits_in_frame(&self, message: &AddressedMessage) -> bool {
        let max = max_envelope_size(self.ctx.config.max_frame_size);
        match message.encoded_len() {
            Ok(size) if size <= max => true,
            Ok(size) => {
                warn!(
                    key = %message.routing_key,
                    id = %message.id,
                    size,
                    max,
                    "[Connection] dropping message too large for one frame"
                );
                false
            }
            Err(e) => {
                warn!(key = %message.routing_key, error = %e, "[Connection] dropping unencodable message");
                false
            }
        }
    }

    async fn flush(
        &mut self,
        writer: &mut OwnedWriteHalf,
        timers: &mut IdleTimers,
    ) -> Result<(), TransportError> {
        while let Some(frame) = self.channel.next_outbound() {
            write_frame(writer, &frame, self.ctx.config.max_frame_size).await?;
            timers.last_write = Instant::now();
        }
        Ok(())
    }

    fn close(&mut self, result: &Result<(), TransportError>) {
        let peer = self.session.as_ref().map(|s| s.peer);
        if let Some(session) = &self.session {
            self.ctx
                .connections
                .unregister(&session.peer, session.connection_id);
        }

        match result {
            Ok(()) => debug!(remote = %self.remote, "[Connection] closed"),
            Err(e) => {
                warn!(remote = %self.remote, error = %e, "[Connection] closed with error");
                if peer.is_none() {
                    if let Some(reason) = e.rejection_reason() {
                        self.ctx.listeners.notify(|l| l.on_rejected(&reason));
                    }
                }
            }
        }
        self.ctx.listeners.notify(|l| l.on_disconnected(peer));
    }
}

/// Hand authenticated messages to local handlers, one at a time, in arrival
/// order. Ends once the driver drops its sender and the queue is drained.
async fn dispatch_inbound(
    dispatcher: Arc<IncomingDispatcher>,
    mut inbound: mpsc::UnboundedReceiver<AddressedMessage>,
) {
    while let Some(message) = inbound.recv().await {
        // Routing failures are local to this message.
        if let Err(e) = dispatcher.dispatch(&message).await {
            if message.routing_key == DEVICE_CONNECTED {
                debug!(error = %e, "[Connection] no consumer for device-connected event");
            } else {
                warn!(key = %message.routing_key, error = %e, "[Connection] dispatch failed");
            }
        }
    }
}

/// Loopback envelope telling local consumers on the master that a device
/// came online.
fn device_connected_event(ctx: &TransportContext, outcome: &HandshakeOutcome) -> Option<AddressedMessage> {
    let event = DeviceConnected {
        device_id: outcome.peer_id,
        name: outcome.peer_certificate.name().to_string(),
        is_connection_local: outcome.is_connection_local,
    };
    let local_id = ctx.local_id();
    match Message::new(&event) {
        Ok(message) => Some(AddressedMessage::new(local_id, local_id, DEVICE_CONNECTED, message)),
        Err(e) => {
            warn!(error = %e, "[Connection] could not encode device-connected event");
            None
        }
    }
}
