//! # Frame Pipeline
//!
//! An ordered list of named stages that every frame crosses between the
//! socket and the wire codec. Stages can be inserted and removed while the
//! connection is live; the handshake uses this to switch on encryption
//! mid-stream.
//!
//! ```text
//!  socket                                                        codec
//!    │  index 0 ─────────────────────────────────────── index n-1  │
//!    │  [encrypter] [decrypter] [sig-checker] [sig-gen] [logging]   │
//!    │ ── inbound: head → tail ──────────────────────────────────►  │
//!    │ ◄───────────────────────────────── outbound: tail → head ──  │
//! ```

use crate::domain::errors::{PipelineError, StageError};
use tracing::trace;

/// Well-known stage names.
pub mod names {
    /// Seals outbound frames to the peer's exchange key.
    pub const ENCRYPTER: &str = "encrypter";
    /// Opens inbound frames with our exchange secret.
    pub const DECRYPTER: &str = "decrypter";
    /// Verifies the peer's signature on inbound frames.
    pub const SIGNATURE_CHECKER: &str = "signature-checker";
    /// Signs outbound frames with our identity key.
    pub const SIGNATURE_GENERATOR: &str = "signature-generator";
    /// Traces frames during the handshake.
    pub const LOGGING: &str = "logging";
}

/// One transformation step.
///
/// Both directions default to pass-through, so a stage only implements the
/// side it cares about.
pub trait FrameStage: Send {
    /// Transform a frame travelling from the socket toward the codec.
    fn inbound(&mut self, frame: Vec<u8>) -> Result<Vec<u8>, StageError> {
        Ok(frame)
    }

    /// Transform a frame travelling from the codec toward the socket.
    fn outbound(&mut self, frame: Vec<u8>) -> Result<Vec<u8>, StageError> {
        Ok(frame)
    }
}

struct NamedStage {
    name: &'static str,
    stage: Box<dyn FrameStage>,
}

/// Ordered, mutable stage list.
#[derive(Default)]
pub struct Pipeline {
    stages: Vec<NamedStage>,
}

impl Pipeline {
    /// Empty pipeline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The pipeline every connection starts with: just [`names::LOGGING`].
    #[must_use]
    pub fn with_logging() -> Self {
        let mut pipeline = Self::new();
        pipeline.stages.push(NamedStage {
            name: names::LOGGING,
            stage: Box::new(LoggingStage),
        });
        pipeline
    }

    /// Append at the codec end.
    pub fn add_last(
        &mut self,
        name: &'static str,
        stage: impl FrameStage + 'static,
    ) -> Result<(), PipelineError> {
        self.insert_at(self.stages.len(), name, Box::new(stage))
    }

    /// Insert at the socket end.
    pub fn add_first(
        &mut self,
        name: &'static str,
        stage: impl FrameStage + 'static,
    ) -> Result<(), PipelineError> {
        self.insert_at(0, name, Box::new(stage))
    }

    /// Insert immediately on the socket side of `anchor`.
    pub fn add_before(
        &mut self,
        anchor: &'static str,
        name: &'static str,
        stage: impl FrameStage + 'static,
    ) -> Result<(), PipelineError> {
        let index = self.position(anchor)?;
        self.insert_at(index, name, Box::new(stage))
    }

    /// Insert immediately on the codec side of `anchor`.
    pub fn add_after(
        &mut self,
        anchor: &'static str,
        name: &'static str,
        stage: impl FrameStage + 'static,
    ) -> Result<(), PipelineError> {
        let index = self.position(anchor)?;
        self.insert_at(index + 1, name, Box::new(stage))
    }

    /// Remove a stage by name.
    pub fn remove(&mut self, name: &'static str) -> Result<(), PipelineError> {
        let index = self.position(name)?;
        self.stages.remove(index);
        Ok(())
    }

    /// Whether a stage is installed.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.stages.iter().any(|s| s.name == name)
    }

    /// Stage names from socket to codec.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name).collect()
    }

    /// Run a frame from the socket through every stage, head to tail.
    pub fn inbound(&mut self, mut frame: Vec<u8>) -> Result<Vec<u8>, StageError> {
        for entry in &mut self.stages {
            frame = entry.stage.inbound(frame)?;
        }
        Ok(frame)
    }

    /// Run a frame from the codec through every stage, tail to head.
    pub fn outbound(&mut self, mut frame: Vec<u8>) -> Result<Vec<u8>, StageError> {
        for entry in self.stages.iter_mut().rev() {
            frame = entry.stage.outbound(frame)?;
        }
        Ok(frame)
    }

    fn position(&self, name: &'static str) -> Result<usize, PipelineError> {
        self.stages
            .iter()
            .position(|s| s.name == name)
            .ok_or(PipelineError::StageNotFound(name))
    }

    fn insert_at(
        &mut self,
        index: usize,
        name: &'static str,
        stage: Box<dyn FrameStage>,
    ) -> Result<(), PipelineError> {
        if self.contains(name) {
            return Err(PipelineError::DuplicateStage(name));
        }
        self.stages.insert(index, NamedStage { name, stage });
        Ok(())
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Frame tracing during the handshake.
pub struct LoggingStage;

impl FrameStage for LoggingStage {
    fn inbound(&mut self, frame: Vec<u8>) -> Result<Vec<u8>, StageError> {
        trace!(len = frame.len(), "[Pipeline] inbound frame");
        Ok(frame)
    }

    fn outbound(&mut self, frame: Vec<u8>) -> Result<Vec<u8>, StageError> {
        trace!(len = frame.len(), "[Pipeline] outbound frame");
        Ok(frame)
    }
}
