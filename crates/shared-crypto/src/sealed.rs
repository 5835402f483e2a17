//! # Sealed Frames
//!
//! Public-key encryption of a single frame to a recipient's static X25519
//! key. Each frame carries its own ephemeral public key, so no session
//! state is shared between sender and receiver.
//!
//! ## Frame Layout
//!
//! ```text
//! ┌────────────────┬──────────────┬───────────────────────────────┐
//! │ ephemeral (32) │ nonce (24)   │ XChaCha20-Poly1305 ciphertext │
//! └────────────────┴──────────────┴───────────────────────────────┘
//! ```
//!
//! Key = BLAKE3-derive-key(`SEAL_CONTEXT`, shared || ephemeral || recipient).

use crate::exchange::{EphemeralSecret, X25519PublicKey, X25519StaticSecret};
use crate::hashing::blake3_derive_key;
use crate::symmetric::{self, Nonce, SecretKey, NONCE_LEN, TAG_LEN};
use crate::CryptoError;
use zeroize::Zeroize;

const SEAL_CONTEXT: &str = "secure-home sealed frame v1";

/// Bytes a sealed frame adds on top of its plaintext.
pub const SEAL_OVERHEAD: usize = 32 + NONCE_LEN + TAG_LEN;

const HEADER_LEN: usize = 32 + NONCE_LEN;

fn frame_key(shared: &[u8; 32], ephemeral: &[u8; 32], recipient: &[u8; 32]) -> SecretKey {
    let mut material = [0u8; 96];
    material[..32].copy_from_slice(shared);
    material[32..64].copy_from_slice(ephemeral);
    material[64..].copy_from_slice(recipient);
    let key = SecretKey::from_bytes(blake3_derive_key(SEAL_CONTEXT, &material));
    material.zeroize();
    key
}

/// Encrypt `plaintext` so that only the holder of `recipient`'s secret can read it.
pub fn seal(recipient: &X25519PublicKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let ephemeral = EphemeralSecret::generate();
    let ephemeral_pub = ephemeral.public_key();
    let shared = ephemeral.diffie_hellman(recipient);

    let key = frame_key(shared.as_bytes(), ephemeral_pub.as_bytes(), recipient.as_bytes());
    let (ciphertext, nonce) = symmetric::encrypt(&key, plaintext)?;

    let mut frame = Vec::with_capacity(HEADER_LEN + ciphertext.len());
    frame.extend_from_slice(ephemeral_pub.as_bytes());
    frame.extend_from_slice(nonce.as_bytes());
    frame.extend_from_slice(&ciphertext);
    Ok(frame)
}

/// Decrypt a frame produced by [`seal`] for our own static key.
pub fn open(local: &X25519StaticSecret, frame: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if frame.len() < HEADER_LEN + TAG_LEN {
        return Err(CryptoError::TruncatedFrame {
            minimum: HEADER_LEN + TAG_LEN,
            actual: frame.len(),
        });
    }

    let mut ephemeral_bytes = [0u8; 32];
    ephemeral_bytes.copy_from_slice(&frame[..32]);
    let mut nonce_bytes = [0u8; NONCE_LEN];
    nonce_bytes.copy_from_slice(&frame[32..HEADER_LEN]);

    let ephemeral_pub = X25519PublicKey::from_bytes(ephemeral_bytes);
    let shared = local.diffie_hellman(&ephemeral_pub);
    let key = frame_key(
        shared.as_bytes(),
        &ephemeral_bytes,
        local.public_key().as_bytes(),
    );

    symmetric::decrypt(&key, &frame[HEADER_LEN..], &Nonce::from_bytes(nonce_bytes))
}
