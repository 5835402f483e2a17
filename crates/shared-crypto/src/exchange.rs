//! # X25519 Key Agreement
//!
//! Static and ephemeral Diffie-Hellman used by the sealed-frame layer.
//! A device's static X25519 secret is derived deterministically from its
//! Ed25519 seed, so a single 32-byte seed on disk is the whole identity.

use crate::signatures::Ed25519KeyPair;
use rand::rngs::OsRng;
use sha2::{Digest, Sha512};
use zeroize::Zeroize;

/// X25519 public key (32 bytes).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct X25519PublicKey(x25519_dalek::PublicKey);

impl X25519PublicKey {
    /// Create from raw Montgomery-form bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(x25519_dalek::PublicKey::from(bytes))
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }
}

/// Long-lived X25519 secret. Zeroized on drop by `x25519-dalek`.
pub struct X25519StaticSecret(x25519_dalek::StaticSecret);

impl X25519StaticSecret {
    /// Derive from an Ed25519 key pair: lower half of `SHA-512(seed)`.
    pub fn from_ed25519(keypair: &Ed25519KeyPair) -> Self {
        let mut seed = keypair.to_seed();
        let mut hash_bytes = [0u8; 64];
        hash_bytes.copy_from_slice(&Sha512::digest(seed));
        seed.zeroize();

        let mut secret_bytes = [0u8; 32];
        secret_bytes.copy_from_slice(&hash_bytes[..32]);
        hash_bytes.zeroize();

        let secret = x25519_dalek::StaticSecret::from(secret_bytes);
        secret_bytes.zeroize();
        Self(secret)
    }

    /// Derive the matching public key.
    pub fn public_key(&self) -> X25519PublicKey {
        X25519PublicKey(x25519_dalek::PublicKey::from(&self.0))
    }

    /// Static Diffie-Hellman with a remote public key.
    pub fn diffie_hellman(&self, their_public: &X25519PublicKey) -> SharedSecret {
        SharedSecret(*self.0.diffie_hellman(&their_public.0).as_bytes())
    }
}

/// Single-use X25519 secret, consumed by [`EphemeralSecret::diffie_hellman`].
pub struct EphemeralSecret {
    // StaticSecret so the public half can be read before the exchange.
    inner: x25519_dalek::StaticSecret,
}

impl EphemeralSecret {
    /// Generate from OS entropy.
    pub fn generate() -> Self {
        Self {
            inner: x25519_dalek::StaticSecret::random_from_rng(OsRng),
        }
    }

    /// Public half, sent alongside whatever this secret protects.
    pub fn public_key(&self) -> X25519PublicKey {
        X25519PublicKey(x25519_dalek::PublicKey::from(&self.inner))
    }

    /// Diffie-Hellman with a remote public key, consuming the secret.
    pub fn diffie_hellman(self, their_public: &X25519PublicKey) -> SharedSecret {
        SharedSecret(*self.inner.diffie_hellman(&their_public.0).as_bytes())
    }
}

/// Shared secret from an X25519 exchange. Zeroized on drop.
#[derive(Zeroize)]
#[zeroize(drop)]
pub struct SharedSecret([u8; 32]);

impl SharedSecret {
    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}
