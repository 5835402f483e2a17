//! # Hashing
//!
//! - **SHA-256** for device fingerprints (a device id is the SHA-256 of its
//!   encoded public key, so it stays stable across implementations).
//! - **BLAKE3** in derive-key mode for per-frame key derivation.

use sha2::{Digest, Sha256};

/// 256-bit hash output.
pub type Hash = [u8; 32];

/// Hash data with SHA-256 (one-shot).
pub fn sha256(data: &[u8]) -> Hash {
    let digest = Sha256::digest(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// Derive key from context and input key material.
///
/// `context` must be a hard-coded, application-unique string.
pub fn blake3_derive_key(context: &str, key_material: &[u8]) -> [u8; 32] {
    let mut output = [0u8; 32];
    let mut hasher = blake3::Hasher::new_derive_key(context);
    hasher.update(key_material);
    let hash = hasher.finalize();
    output.copy_from_slice(hash.as_bytes());
    output
}
