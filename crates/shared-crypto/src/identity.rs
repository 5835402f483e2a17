//! # Device Identity Keys
//!
//! A device owns one Ed25519 seed. From it we derive:
//!
//! - the Ed25519 signing key (certificate and frame signatures)
//! - the X25519 exchange key (sealed frames addressed to this device)
//! - a self-signed [`DeviceCertificate`] binding both public halves to a name
//!
//! The certificate is what peers exchange in `Hello`; its encoded public key
//! is the input of the device fingerprint.

use crate::exchange::{X25519PublicKey, X25519StaticSecret};
use crate::signatures::{Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature, SIGNATURE_LEN};
use crate::CryptoError;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};

const CERTIFICATE_DOMAIN: &[u8] = b"secure-home/device-certificate/v1";

/// Length of [`DeviceCertificate::encoded_public_key`].
pub const ENCODED_PUBLIC_KEY_LEN: usize = 64;

// =============================================================================
// CERTIFICATE
// =============================================================================

/// Self-signed device certificate.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCertificate {
    name: String,
    signing_key: [u8; 32],
    exchange_key: [u8; 32],
    #[serde_as(as = "Bytes")]
    signature: [u8; SIGNATURE_LEN],
}

impl DeviceCertificate {
    fn signed_payload(name: &str, signing_key: &[u8; 32], exchange_key: &[u8; 32]) -> Vec<u8> {
        let mut payload = Vec::with_capacity(CERTIFICATE_DOMAIN.len() + 4 + name.len() + 64);
        payload.extend_from_slice(CERTIFICATE_DOMAIN);
        payload.extend_from_slice(&(name.len() as u32).to_be_bytes());
        payload.extend_from_slice(name.as_bytes());
        payload.extend_from_slice(signing_key);
        payload.extend_from_slice(exchange_key);
        payload
    }

    /// Human-readable device name chosen at key generation.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ed25519 key that signs this device's frames.
    pub fn signing_key(&self) -> Result<Ed25519PublicKey, CryptoError> {
        Ed25519PublicKey::from_bytes(self.signing_key)
    }

    /// X25519 key frames for this device are sealed to.
    pub fn exchange_key(&self) -> X25519PublicKey {
        X25519PublicKey::from_bytes(self.exchange_key)
    }

    /// Canonical public key encoding: `signing_key || exchange_key`.
    pub fn encoded_public_key(&self) -> [u8; ENCODED_PUBLIC_KEY_LEN] {
        let mut out = [0u8; ENCODED_PUBLIC_KEY_LEN];
        out[..32].copy_from_slice(&self.signing_key);
        out[32..].copy_from_slice(&self.exchange_key);
        out
    }

    /// Check the certificate was signed by the key it carries.
    pub fn verify_self_signature(&self) -> Result<(), CryptoError> {
        let key = self
            .signing_key()
            .map_err(|_| CryptoError::InvalidCertificate)?;
        let payload = Self::signed_payload(&self.name, &self.signing_key, &self.exchange_key);
        key.verify(&payload, &Ed25519Signature::from_bytes(self.signature))
            .map_err(|_| CryptoError::InvalidCertificate)
    }
}

// =============================================================================
// KEY PAIR
// =============================================================================

/// Private half of a device identity plus its certificate.
pub struct DeviceKeys {
    signing: Ed25519KeyPair,
    exchange: X25519StaticSecret,
    certificate: DeviceCertificate,
}

impl DeviceKeys {
    /// Generate a fresh identity.
    pub fn generate(name: impl Into<String>) -> Self {
        Self::from_signing_key(name.into(), Ed25519KeyPair::generate())
    }

    /// Restore an identity from its stored seed.
    pub fn from_seed(name: impl Into<String>, seed: [u8; 32]) -> Self {
        Self::from_signing_key(name.into(), Ed25519KeyPair::from_seed(seed))
    }

    fn from_signing_key(name: String, signing: Ed25519KeyPair) -> Self {
        let exchange = X25519StaticSecret::from_ed25519(&signing);
        let signing_key = *signing.public_key().as_bytes();
        let exchange_key = *exchange.public_key().as_bytes();
        let payload = DeviceCertificate::signed_payload(&name, &signing_key, &exchange_key);
        let signature = *signing.sign(&payload).as_bytes();

        Self {
            signing,
            exchange,
            certificate: DeviceCertificate {
                name,
                signing_key,
                exchange_key,
                signature,
            },
        }
    }

    /// Our self-signed certificate.
    pub fn certificate(&self) -> &DeviceCertificate {
        &self.certificate
    }

    /// Sign a message with the device key.
    pub fn sign(&self, message: &[u8]) -> Ed25519Signature {
        self.signing.sign(message)
    }

    /// Static secret used to open frames sealed to us.
    pub fn exchange_secret(&self) -> &X25519StaticSecret {
        &self.exchange
    }

    /// Seed for persistence. Handle with care.
    pub fn to_seed(&self) -> [u8; 32] {
        self.signing.to_seed()
    }
}

impl std::fmt::Debug for DeviceKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceKeys")
            .field("certificate", &self.certificate)
            .finish_non_exhaustive()
    }
}
