//! # Security Pipeline Factory
//!
//! Builds the four stages that protect a connection once the peer's
//! certificate is known.
//!
//! ## Frame protection
//!
//! Outbound: `sign(frame)` appends our 64-byte Ed25519 signature, then
//! `seal` encrypts `frame || signature` to the peer's X25519 key.
//! Inbound reverses it: open with our X25519 secret, then verify the trailing
//! signature against the peer's Ed25519 key and strip it.
//!
//! Encryption alone authenticates nothing: anyone can seal a frame to our
//! public key. The signature is what binds the frame to the peer's identity.

use crate::domain::errors::{PipelineError, StageError};
use crate::domain::packets::WIRE_TAG_LEN;
use crate::domain::pipeline::{names, FrameStage, Pipeline};
use shared_crypto::{
    open, seal, CryptoError, DeviceCertificate, DeviceKeys, Ed25519PublicKey, Ed25519Signature,
    X25519PublicKey, SEAL_OVERHEAD, SIGNATURE_LEN,
};
use std::sync::Arc;

/// Bytes the security stages add to every frame.
pub const FRAME_PROTECTION_OVERHEAD: usize = SIGNATURE_LEN + SEAL_OVERHEAD;

/// Largest encoded [`AddressedMessage`](shared_types::AddressedMessage) that
/// still fits in one secured frame of `max_frame_size` bytes.
#[must_use]
pub const fn max_envelope_size(max_frame_size: usize) -> usize {
    max_frame_size.saturating_sub(WIRE_TAG_LEN + FRAME_PROTECTION_OVERHEAD)
}

/// Seals outbound frames to the peer.
pub struct Encrypter {
    remote: X25519PublicKey,
}

impl FrameStage for Encrypter {
    fn outbound(&mut self, frame: Vec<u8>) -> Result<Vec<u8>, StageError> {
        seal(&self.remote, &frame).map_err(|source| StageError::Seal {
            stage: names::ENCRYPTER,
            source,
        })
    }
}

/// Opens inbound frames with our secret.
pub struct Decrypter {
    local: Arc<DeviceKeys>,
}

impl FrameStage for Decrypter {
    fn inbound(&mut self, frame: Vec<u8>) -> Result<Vec<u8>, StageError> {
        open(self.local.exchange_secret(), &frame).map_err(|source| StageError::Open {
            stage: names::DECRYPTER,
            source,
        })
    }
}

/// Verifies and strips the peer's trailing signature.
pub struct SignatureChecker {
    remote: Ed25519PublicKey,
}

impl FrameStage for SignatureChecker {
    fn inbound(&mut self, mut frame: Vec<u8>) -> Result<Vec<u8>, StageError> {
        let reject = |source| StageError::Signature {
            stage: names::SIGNATURE_CHECKER,
            source,
        };
        if frame.len() < SIGNATURE_LEN {
            return Err(reject(CryptoError::TruncatedFrame {
                minimum: SIGNATURE_LEN,
                actual: frame.len(),
            }));
        }
        let split = frame.len() - SIGNATURE_LEN;
        let signature = Ed25519Signature::from_slice(&frame[split..]).map_err(reject)?;
        self.remote
            .verify(&frame[..split], &signature)
            .map_err(reject)?;
        frame.truncate(split);
        Ok(frame)
    }
}

/// Appends our signature.
pub struct SignatureGenerator {
    local: Arc<DeviceKeys>,
}

impl FrameStage for SignatureGenerator {
    fn outbound(&mut self, mut frame: Vec<u8>) -> Result<Vec<u8>, StageError> {
        let signature = self.local.sign(&frame);
        frame.extend_from_slice(signature.as_bytes());
        Ok(frame)
    }
}

/// The stage set for one peer, ready to install.
pub struct SecurityStages {
    pub encrypter: Encrypter,
    pub decrypter: Decrypter,
    pub signature_checker: SignatureChecker,
    pub signature_generator: SignatureGenerator,
}

impl SecurityStages {
    /// Insert all four stages in front of [`names::LOGGING`].
    ///
    /// Resulting order, socket to codec:
    /// `encrypter, decrypter, signature-checker, signature-generator, logging`.
    pub fn install(self, pipeline: &mut Pipeline) -> Result<(), PipelineError> {
        pipeline.add_before(names::LOGGING, names::ENCRYPTER, self.encrypter)?;
        pipeline.add_before(names::LOGGING, names::DECRYPTER, self.decrypter)?;
        pipeline.add_before(names::LOGGING, names::SIGNATURE_CHECKER, self.signature_checker)?;
        pipeline.add_before(names::LOGGING, names::SIGNATURE_GENERATOR, self.signature_generator)?;
        Ok(())
    }
}

/// Creates [`SecurityStages`] from the local keys and the peer certificate.
pub struct SecurityPipelineFactory;

impl SecurityPipelineFactory {
    /// Stages protecting traffic between `local` and the holder of `remote`.
    pub fn create(
        local: Arc<DeviceKeys>,
        remote: &DeviceCertificate,
    ) -> Result<SecurityStages, CryptoError> {
        Ok(SecurityStages {
            encrypter: Encrypter {
                remote: remote.exchange_key(),
            },
            decrypter: Decrypter {
                local: local.clone(),
            },
            signature_checker: SignatureChecker {
                remote: remote.signing_key()?,
            },
            signature_generator: SignatureGenerator { local },
        })
    }
}
