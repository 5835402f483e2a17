//! # Secure Handshake
//!
//! Mutual authentication between a client and the master, and the frame
//! pipeline that protects everything exchanged afterwards.
//!
//! ## Protocol
//!
//! ```text
//! Client                                            Master
//!   │ ── Hello(cert, is_master=false) ───────────────► │   clear
//!   │ ◄─────────────── Hello(cert, is_master=true) ─── │   clear
//!   │        both sides install the security stages     │
//!   │ ── Chap(c1, -) ─────────────────────────────────► │   sealed + signed
//!   │ ◄────────────────────────────── Chap(c2, c1) ─── │
//!   │ ── Chap(-, c2) ─────────────────────────────────► │
//!   │ ◄──────────── ServerAuthenticationResponse ───── │
//!   │ [── ActiveRegistrationRequest(token) ──────────► │   unknown client, once
//!   │ ◄──────────── ServerAuthenticationResponse ───]  │
//! ```
//!
//! ## Architecture
//!
//! - **Domain:** packets, states, pipeline, security stages (no I/O)
//! - **Ports:** [`TrustStore`], [`TokenSource`], [`DeviceRegistry`]
//! - **Handshake:** [`ClientHandshake`] and [`ServerHandshake`]
//! - **Adapters:** in-memory port implementations

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod adapters;
pub mod domain;
pub mod handshake;
pub mod ports;

pub use adapters::{InMemoryDeviceRegistry, InMemoryTrustStore, StaticTokens};
pub use domain::{
    max_envelope_size, names, ChannelError, FrameStage, HandshakeError, HandshakeOutcome,
    HandshakePacket, HandshakeProgress, HandshakeState, Pipeline, PipelineError,
    ProtocolViolation, Role, SecureChannel, SecurityPipelineFactory, SecurityStages, StageError,
    TrustError, WireMessage, FRAME_PROTECTION_OVERHEAD,
};
pub use handshake::{
    is_local_address, ClientHandshake, Handshake, ServerHandshake, TOKEN_REJECTED,
    UNKNOWN_CLIENT, UNVERIFIED_MASTER,
};
pub use ports::{DeviceRegistry, TokenSource, TrustStore};
