//! # Domain Layer
//!
//! Packets, states, the frame pipeline and its security stages. No I/O.

pub mod channel;
pub mod errors;
pub mod packets;
pub mod pipeline;
pub mod security;
pub mod state;

pub use channel::SecureChannel;
pub use errors::{
    ChannelError, HandshakeError, PipelineError, ProtocolViolation, StageError, TrustError,
};
pub use packets::{Challenge, HandshakePacket, WireMessage, CHALLENGE_LENGTH, WIRE_TAG_LEN};
pub use pipeline::{names, FrameStage, LoggingStage, Pipeline};
pub use security::{
    max_envelope_size, SecurityPipelineFactory, SecurityStages, FRAME_PROTECTION_OVERHEAD,
};
pub use state::{HandshakeOutcome, HandshakeProgress, HandshakeState, Role};
