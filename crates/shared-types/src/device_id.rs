//! # Device Identity
//!
//! A device is named by the SHA-256 fingerprint of its certificate's encoded
//! public key. Equality and hashing are on the raw 32 bytes; the base64 text
//! form is for display, config files and bootstrap codes only.

use crate::errors::DeviceIdError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use shared_crypto::{sha256, DeviceCertificate};
use std::fmt;
use std::str::FromStr;

/// Length of a device id in bytes.
pub const ID_LENGTH: usize = 32;

/// Characters of the text form shown by [`DeviceId::to_short_text`].
pub const SHORT_TEXT_LENGTH: usize = 7;

/// 32-byte device identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceId([u8; ID_LENGTH]);

impl DeviceId {
    /// Sentinel used before any real identity has been negotiated.
    pub const NO_DEVICE: DeviceId = DeviceId([0u8; ID_LENGTH]);

    /// Wrap raw bytes.
    #[must_use]
    pub const fn new(bytes: [u8; ID_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Fingerprint a certificate: `SHA-256(encoded public key)`.
    #[must_use]
    pub fn from_certificate(certificate: &DeviceCertificate) -> Self {
        Self(sha256(&certificate.encoded_public_key()))
    }

    /// Parse from a byte slice of exactly 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DeviceIdError> {
        let arr: [u8; ID_LENGTH] = bytes.try_into().map_err(|_| DeviceIdError::InvalidLength {
            expected: ID_LENGTH,
            actual: bytes.len(),
        })?;
        Ok(Self(arr))
    }

    /// Parse the text form produced by [`DeviceId::to_text`].
    pub fn from_text(text: &str) -> Result<Self, DeviceIdError> {
        let bytes = STANDARD
            .decode(text.trim())
            .map_err(|e| DeviceIdError::InvalidEncoding(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    /// Raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; ID_LENGTH] {
        &self.0
    }

    /// Base64 text form.
    #[must_use]
    pub fn to_text(&self) -> String {
        STANDARD.encode(self.0)
    }

    /// First seven characters of the text form. Logs and UI only.
    #[must_use]
    pub fn to_short_text(&self) -> String {
        let mut text = self.to_text();
        text.truncate(SHORT_TEXT_LENGTH);
        text
    }

    /// Whether this is [`DeviceId::NO_DEVICE`].
    #[must_use]
    pub fn is_no_device(&self) -> bool {
        *self == Self::NO_DEVICE
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl fmt::Debug for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceId({})", self.to_short_text())
    }
}

impl FromStr for DeviceId {
    type Err = DeviceIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_text(s)
    }
}
