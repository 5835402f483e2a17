//! Transport errors.

use sh_02_handshake::{ChannelError, HandshakeError, ProtocolViolation};
use shared_bus::NonceError;
use shared_types::{DeviceId, MessageError};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Errors that end a connection, or prevent one from starting.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Frame of {size} bytes exceeds the {max} byte limit")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Connecting to {addr} timed out after {timeout:?}")]
    ConnectTimeout { addr: SocketAddr, timeout: Duration },

    #[error("Handshake did not finish within {0:?}")]
    HandshakeTimeout(Duration),

    #[error("No traffic for {0:?}")]
    IdleTimeout(Duration),

    /// Handshake failure, or a protocol/crypto failure on a live session.
    #[error("Session error: {0}")]
    Session(#[from] HandshakeError),

    #[error("Message claims sender {claimed} but the peer is {peer}")]
    ForgedSender { claimed: DeviceId, peer: DeviceId },

    #[error("Replay rejected: {0}")]
    Replay(#[from] NonceError),

    #[error("Message encoding failed: {0}")]
    Message(#[from] MessageError),

    #[error("Connection closed before the handshake finished")]
    ClosedDuringHandshake,

    #[error("No master address known")]
    MasterAddressUnknown,
}

impl TransportError {
    /// Reason for the rejected callback, if this error is a refusal of the
    /// peer rather than a network problem.
    #[must_use]
    pub fn rejection_reason(&self) -> Option<String> {
        match self {
            Self::Session(e) => Some(e.rejection_reason()),
            Self::ForgedSender { .. } | Self::Replay(_) => Some(self.to_string()),
            _ => None,
        }
    }
}

impl From<ChannelError> for TransportError {
    fn from(err: ChannelError) -> Self {
        Self::Session(err.into())
    }
}

impl From<ProtocolViolation> for TransportError {
    fn from(err: ProtocolViolation) -> Self {
        Self::Session(err.into())
    }
}
