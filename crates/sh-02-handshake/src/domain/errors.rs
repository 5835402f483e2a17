//! Handshake error taxonomy.
//!
//! Every failure falls in one of four categories:
//!
//! | Category   | Meaning                                              |
//! |------------|------------------------------------------------------|
//! | Protocol   | Packet out of order, malformed, or wrong role        |
//! | Trust      | Identity mismatch, unverified master, pin conflict   |
//! | Crypto     | A pipeline stage could not seal, open, or verify     |
//! | Rejected   | The master answered with a negative auth response   |

use super::state::HandshakeState;
use shared_crypto::CryptoError;
use shared_types::DeviceId;
use thiserror::Error;

/// Failure inside a single pipeline stage.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StageError {
    /// Outbound frame could not be sealed.
    #[error("[{stage}] seal failed: {source}")]
    Seal {
        stage: &'static str,
        source: CryptoError,
    },

    /// Inbound frame could not be opened.
    #[error("[{stage}] open failed: {source}")]
    Open {
        stage: &'static str,
        source: CryptoError,
    },

    /// Inbound frame carried no valid signature from the peer.
    #[error("[{stage}] signature rejected: {source}")]
    Signature {
        stage: &'static str,
        source: CryptoError,
    },
}

/// Pipeline structure errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// A stage with this name is already installed.
    #[error("Stage '{0}' already present")]
    DuplicateStage(&'static str),

    /// The anchor or target stage is missing.
    #[error("Stage '{0}' not found")]
    StageNotFound(&'static str),
}

/// Errors moving a message through the secured channel.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ChannelError {
    /// A stage failed.
    #[error(transparent)]
    Stage(#[from] StageError),

    /// Frame did not decode to a wire message, or the message did not encode.
    #[error("Codec error: {0}")]
    Codec(String),
}

/// Trust store and registry failures.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TrustError {
    /// Presented identity differs from the pinned one.
    #[error("Identity mismatch: expected {expected}, got {actual}")]
    IdentityMismatch { expected: DeviceId, actual: DeviceId },

    /// A different master certificate is already pinned.
    #[error("A different master certificate is already pinned")]
    Conflict,

    /// Peer proved itself twice and the proofs disagree.
    #[error("Master identity and registration token disagree")]
    ConflictingProof,

    /// Peer's identity could not be established.
    #[error("{0}")]
    Unverified(String),

    /// Peer certificate is not validly self-signed.
    #[error("Invalid peer certificate: {0}")]
    InvalidCertificate(CryptoError),

    /// The registration token was redeemed before and cannot be issued again.
    #[error("Registration token was already redeemed")]
    TokenSpent,

    /// Backing store failed.
    #[error("Trust storage error: {0}")]
    Storage(String),
}

/// Packet-level protocol violations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolViolation {
    /// Packet not valid in the current state.
    #[error("Unexpected {packet} in state {state:?}")]
    UnexpectedPacket {
        state: HandshakeState,
        packet: &'static str,
    },

    /// Application traffic arrived before the handshake finished.
    #[error("{0} received before the handshake finished")]
    PrematureTraffic(&'static str),

    /// CHAP packet lacks a required field.
    #[error("Malformed CHAP packet")]
    MalformedChap,

    /// CHAP response does not echo our challenge.
    #[error("CHAP response does not match our challenge")]
    ChallengeMismatch,

    /// Peer announced the wrong role in Hello.
    #[error("Peer role mismatch: expected is_master={expected}")]
    RoleMismatch { expected: bool },
}

/// Handshake failure.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum HandshakeError {
    #[error("Protocol violation: {0}")]
    Protocol(#[from] ProtocolViolation),

    #[error("Trust violation: {0}")]
    Trust(#[from] TrustError),

    #[error("Cryptographic failure: {0}")]
    Crypto(StageError),

    #[error("Codec failure: {0}")]
    Codec(String),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Authentication refused, with the message sent on the wire.
    #[error("Authentication rejected: {0}")]
    Rejected(String),
}

impl HandshakeError {
    /// Human-readable reason reported to connection listeners.
    #[must_use]
    pub fn rejection_reason(&self) -> String {
        match self {
            Self::Rejected(message) => message.clone(),
            Self::Trust(TrustError::Unverified(message)) => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<ChannelError> for HandshakeError {
    fn from(err: ChannelError) -> Self {
        match err {
            ChannelError::Stage(stage) => Self::Crypto(stage),
            ChannelError::Codec(reason) => Self::Codec(reason),
        }
    }
}
