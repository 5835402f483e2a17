//! # Error Types
//!
//! Errors shared by every crate that touches identities, messages or the
//! component container.

use thiserror::Error;

/// Invalid device identifier input.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeviceIdError {
    /// Decoded identifier is not exactly 32 bytes.
    #[error("Invalid device id length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// Text form is not valid base64.
    #[error("Invalid device id encoding: {0}")]
    InvalidEncoding(String),
}

/// Message payload (de)serialization failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MessageError {
    /// Payload could not be serialized.
    #[error("Failed to encode payload: {0}")]
    Encode(String),

    /// Payload bytes do not match the requested type.
    #[error("Failed to decode payload: {0}")]
    Decode(String),

    /// The message carries an error instead of a payload.
    #[error("Message carries error: {0}")]
    ErrorPayload(String),
}

/// Component container failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ContainerError {
    /// A component of this type is already registered.
    #[error("Component already registered: {0}")]
    AlreadyRegistered(&'static str),

    /// A required component is missing.
    #[error("Component not registered: {0}")]
    Missing(&'static str),

    /// A component's init hook failed.
    #[error("Component {component} failed to initialize: {reason}")]
    InitFailed {
        component: &'static str,
        reason: String,
    },
}
