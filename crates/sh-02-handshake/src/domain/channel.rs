//! # Secure Channel
//!
//! The frame pipeline plus an outbox of frames ready for the socket. The
//! handshake writes through it, so a packet sent right after the security
//! stages are installed is already protected.

use crate::domain::errors::{ChannelError, PipelineError};
use crate::domain::packets::WireMessage;
use crate::domain::pipeline::{names, Pipeline};
use std::collections::VecDeque;

/// Pipeline and pending outbound frames of one connection.
#[derive(Debug)]
pub struct SecureChannel {
    pipeline: Pipeline,
    outbox: VecDeque<Vec<u8>>,
}

impl SecureChannel {
    /// Fresh channel: plaintext, logging only.
    #[must_use]
    pub fn new() -> Self {
        Self {
            pipeline: Pipeline::with_logging(),
            outbox: VecDeque::new(),
        }
    }

    /// Encode `message`, run it outbound and queue the frame.
    pub fn send(&mut self, message: &WireMessage) -> Result<(), ChannelError> {
        let frame = self.pipeline.outbound(message.encode()?)?;
        self.outbox.push_back(frame);
        Ok(())
    }

    /// Run a socket frame inbound and decode it.
    pub fn receive(&mut self, frame: Vec<u8>) -> Result<WireMessage, ChannelError> {
        let bytes = self.pipeline.inbound(frame)?;
        WireMessage::decode(&bytes)
    }

    /// Next frame for the socket.
    pub fn next_outbound(&mut self) -> Option<Vec<u8>> {
        self.outbox.pop_front()
    }

    /// Take every queued frame.
    pub fn drain_outbound(&mut self) -> Vec<Vec<u8>> {
        self.outbox.drain(..).collect()
    }

    /// Whether frames are waiting for the socket.
    #[must_use]
    pub fn has_outbound(&self) -> bool {
        !self.outbox.is_empty()
    }

    /// Whether the security stages are installed.
    #[must_use]
    pub fn is_secured(&self) -> bool {
        self.pipeline.contains(names::ENCRYPTER)
    }

    /// Drop the handshake-only stages.
    pub fn finish_handshake(&mut self) -> Result<(), PipelineError> {
        if self.pipeline.contains(names::LOGGING) {
            self.pipeline.remove(names::LOGGING)?;
        }
        Ok(())
    }

    /// Pipeline access.
    #[must_use]
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Mutable pipeline access.
    pub fn pipeline_mut(&mut self) -> &mut Pipeline {
        &mut self.pipeline
    }
}

impl Default for SecureChannel {
    fn default() -> Self {
        Self::new()
    }
}
