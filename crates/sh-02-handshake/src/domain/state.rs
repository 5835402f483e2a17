//! Handshake states and results.

use shared_crypto::DeviceCertificate;
use shared_types::DeviceId;
use std::fmt;

/// Position of one side in the handshake.
///
/// ```text
/// Initiator (client)                     Acceptor (master)
/// ──────────────────                     ─────────────────
/// ExpectHello                            ExpectHello
///   │ Hello                                │ Hello
///   ▼                                      ▼
/// ExpectChap                             ExpectChap
///   │ Chap(challenge, response)            │ Chap(challenge, -)
///   ▼                                      ▼
/// ExpectState ◄──────────────┐           ExpectChapResponse
///   │ auth response          │             │ Chap(-, response)
///   ▼                        │             ▼
/// StateReceived ── retry ────┘           StateReceived ──► ExpectRegistration
///   │                                      │                 │ registration request
///   ▼                                      ▼                 ▼
/// Finished | Failed                      Finished | Failed ◄─┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandshakeState {
    /// Created, Hello not yet sent.
    NotStarted,
    /// Waiting for the peer's Hello.
    ExpectHello,
    /// Waiting for the peer's first CHAP packet.
    ExpectChap,
    /// Acceptor only: waiting for the initiator's answer to our challenge.
    ExpectChapResponse,
    /// Initiator only: waiting for the authentication response.
    ExpectState,
    /// Authentication data received and being evaluated.
    StateReceived,
    /// Acceptor only: an unknown initiator was asked to register.
    ExpectRegistration,
    /// Authenticated; application traffic may flow.
    Finished,
    /// Terminal failure; the connection must close.
    Failed,
}

impl HandshakeState {
    /// Whether no further transition is possible.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Failed)
    }
}

impl fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Which side of the connection we are.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Dials the master.
    Initiator,
    /// Accepts clients; always the master.
    Acceptor,
}

/// The authenticated peer.
#[derive(Debug, Clone, PartialEq)]
pub struct HandshakeOutcome {
    /// Peer identity, derived from its certificate.
    pub peer_id: DeviceId,
    /// Peer certificate as presented in its Hello.
    pub peer_certificate: DeviceCertificate,
    /// Whether the connection is inside the home network.
    pub is_connection_local: bool,
}

/// Result of feeding one event into a handshake.
#[derive(Debug, Clone, PartialEq)]
pub enum HandshakeProgress {
    /// More packets are needed.
    Continue,
    /// The peer is authenticated.
    Finished(HandshakeOutcome),
}

impl HandshakeProgress {
    /// The outcome, if the handshake finished.
    #[must_use]
    pub fn outcome(&self) -> Option<&HandshakeOutcome> {
        match self {
            Self::Finished(outcome) => Some(outcome),
            Self::Continue => None,
        }
    }
}
