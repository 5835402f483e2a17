//! # Registration Tokens
//!
//! A registration token is a 35-byte pre-shared secret that lets one device
//! be admitted once. 35 bytes always encode to 48 base64 characters, which
//! keeps the bootstrap record fixed-width.
//!
//! - **Active** token: issued by the master, carried to the client out of
//!   band, and presented by the client in `ActiveRegistrationRequest`.
//! - **Passive** token: generated by the client and shown to the master, who
//!   returns it in its authentication response to prove its identity to a
//!   client that does not know the master yet.

use crate::errors::BootstrapError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};
use std::fmt;

/// Raw token length in bytes.
pub const TOKEN_LENGTH: usize = 35;

/// Length of the base64 text form of a token.
pub const TOKEN_BASE64_LENGTH: usize = 48;

/// Single-use registration secret.
#[serde_as]
#[derive(Clone, Eq, Serialize, Deserialize)]
pub struct RegistrationToken(#[serde_as(as = "Bytes")] [u8; TOKEN_LENGTH]);

impl RegistrationToken {
    /// Fresh token from the OS CSPRNG.
    #[must_use]
    pub fn random() -> Self {
        let mut bytes = [0u8; TOKEN_LENGTH];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Wrap raw bytes.
    #[must_use]
    pub const fn new(bytes: [u8; TOKEN_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Parse raw bytes of exactly [`TOKEN_LENGTH`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BootstrapError> {
        let arr: [u8; TOKEN_LENGTH] =
            bytes
                .try_into()
                .map_err(|_| BootstrapError::InvalidTokenLength {
                    expected: TOKEN_LENGTH,
                    actual: bytes.len(),
                })?;
        Ok(Self(arr))
    }

    /// Parse the base64 text form.
    pub fn from_base64(text: &str) -> Result<Self, BootstrapError> {
        let bytes = STANDARD
            .decode(text.trim())
            .map_err(|e| BootstrapError::InvalidEncoding(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    /// Base64 text form, always [`TOKEN_BASE64_LENGTH`] characters.
    #[must_use]
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    /// Raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; TOKEN_LENGTH] {
        &self.0
    }
}

// Constant-time comparison.
impl PartialEq for RegistrationToken {
    fn eq(&self, other: &Self) -> bool {
        self.0
            .iter()
            .zip(other.0.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

impl fmt::Debug for RegistrationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self.to_base64();
        write!(f, "RegistrationToken({}…)", &text[..6])
    }
}
