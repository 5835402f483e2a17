//! # Handshake State Machines
//!
//! Sans-IO: each side consumes decoded packets and writes replies into a
//! [`SecureChannel`], which already holds the frames for the socket. The
//! transport owns timers and I/O.
//!
//! Any error is terminal. The side enters [`HandshakeState::Failed`] and
//! refuses further input; the transport flushes queued frames (a rejection
//! notice, for instance) and closes.

mod client;
mod server;


pub use client::{ClientHandshake, UNVERIFIED_MASTER};
pub use server::{is_local_address, ServerHandshake, TOKEN_REJECTED, UNKNOWN_CLIENT};

use crate::domain::{
    HandshakeError, HandshakePacket, HandshakeProgress, HandshakeState, ProtocolViolation, Role,
    SecureChannel,
};
use rand::RngCore;

/// One side of a handshake.
pub trait Handshake: Send {
    /// Which side this is.
    fn role(&self) -> Role;

    /// Current state.
    fn state(&self) -> HandshakeState;

    /// Send our Hello.
    fn start(&mut self, channel: &mut SecureChannel) -> Result<HandshakeProgress, HandshakeError>;

    /// Feed one packet from the peer.
    fn on_packet(
        &mut self,
        packet: HandshakePacket,
        channel: &mut SecureChannel,
    ) -> Result<HandshakeProgress, HandshakeError>;
}

/// Move `state` from `expected` to `next`, or report `packet` as out of order.
pub(crate) fn advance(
    state: &mut HandshakeState,
    expected: HandshakeState,
    next: HandshakeState,
    packet: &'static str,
) -> Result<(), HandshakeError> {
    if *state != expected {
        return Err(ProtocolViolation::UnexpectedPacket {
            state: *state,
            packet,
        }
        .into());
    }
    *state = next;
    Ok(())
}

/// Fresh CHAP challenge from the OS CSPRNG.
pub(crate) fn new_challenge() -> [u8; crate::domain::CHALLENGE_LENGTH] {
    let mut challenge = [0u8; crate::domain::CHALLENGE_LENGTH];
    rand::rngs::OsRng.fill_bytes(&mut challenge);
    challenge
}
