//! # Shared Crypto - Device Identity and Frame Protection
//!
//! ## Components
//!
//! | Module | Algorithm | Use Case |
//! |--------|-----------|----------|
//! | `identity` | Ed25519 + X25519 | Device keys, self-signed certificates |
//! | `signatures` | Ed25519 | Certificate and per-frame signatures |
//! | `exchange` | X25519 | Static / ephemeral key agreement |
//! | `sealed` | X25519 + XChaCha20-Poly1305 | Per-frame public-key encryption |
//! | `symmetric` | XChaCha20-Poly1305 | AEAD core |
//! | `hashing` | SHA-256, BLAKE3 | Fingerprints, key derivation |
//!
//! ## Security Properties
//!
//! - **XChaCha20**: 192-bit nonce, constant-time, side-channel immune
//! - **Ed25519**: Deterministic nonces, no RNG dependency
//! - **Sealed frames**: fresh ephemeral key per frame, no shared session state

#![warn(missing_docs)]
#![warn(clippy::all)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod errors;
pub mod exchange;
pub mod hashing;
pub mod identity;
pub mod sealed;
pub mod signatures;
pub mod symmetric;

// Re-exports
pub use errors::CryptoError;
pub use exchange::{X25519PublicKey, X25519StaticSecret};
pub use hashing::{blake3_derive_key, sha256, Hash};
pub use identity::{DeviceCertificate, DeviceKeys, ENCODED_PUBLIC_KEY_LEN};
pub use sealed::{open, seal, SEAL_OVERHEAD};
pub use signatures::{Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature, SIGNATURE_LEN};
pub use symmetric::{decrypt, encrypt, Nonce, SecretKey};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
