//! Bootstrap code errors.

use shared_types::DeviceIdError;
use thiserror::Error;

/// Failures decoding a bootstrap code or token.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BootstrapError {
    /// Decoded record does not have the fixed length.
    #[error("Bootstrap record length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    /// Text is not valid base64.
    #[error("Invalid bootstrap encoding: {0}")]
    InvalidEncoding(String),

    /// Token does not decode to exactly 35 bytes.
    #[error("Invalid registration token: expected {expected} bytes, got {actual}")]
    InvalidTokenLength { expected: usize, actual: usize },

    /// Embedded device id is malformed.
    #[error(transparent)]
    DeviceId(#[from] DeviceIdError),
}
