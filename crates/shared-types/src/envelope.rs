//! # `AddressedMessage` Envelope
//!
//! The wrapper for every message that crosses the routing layer, whether it
//! stays on this device or travels over a secured connection.
//!
//! ## Properties
//!
//! - **Single routing key**: every envelope names exactly one [`RoutingKey`].
//! - **Correlation**: requests carry `correlation_id == id`; replies carry the
//!   id of the request they answer.
//! - **Envelope Authority**: `from` is the sole source of truth for the
//!   sender. For network traffic the transport checks it against the
//!   authenticated peer before anything is dispatched.

use crate::device_id::DeviceId;
use crate::errors::MessageError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Suffix appended by [`RoutingKey::reply`].
pub const REPLY_SUFFIX: &str = "/reply";

// =============================================================================
// ROUTING KEY
// =============================================================================

/// Stable identifier of a message category.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoutingKey(Cow<'static, str>);

impl RoutingKey {
    /// Key from a static string, usable in `const` items.
    #[must_use]
    pub const fn from_static(key: &'static str) -> Self {
        Self(Cow::Borrowed(key))
    }

    /// Key from an owned string.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(Cow::Owned(key.into()))
    }

    /// The key replies to this category are sent on.
    #[must_use]
    pub fn reply(&self) -> RoutingKey {
        RoutingKey::new(format!("{}{}", self.0, REPLY_SUFFIX))
    }

    /// Whether this is a reply key.
    #[must_use]
    pub fn is_reply(&self) -> bool {
        self.0.ends_with(REPLY_SUFFIX)
    }

    /// String form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for RoutingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RoutingKey({})", self.0)
    }
}

// =============================================================================
// MESSAGE
// =============================================================================

/// Body of a message: opaque application bytes or an error text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payload {
    /// bincode-encoded application payload.
    Data(Vec<u8>),
    /// The sender could not produce a payload.
    Error(String),
}

/// Application message. Payload semantics belong to the handlers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Unix timestamp (seconds) at creation.
    pub timestamp: u64,
    /// Message body.
    pub payload: Payload,
}

impl Message {
    /// Encode a typed payload.
    pub fn new<T: Serialize>(payload: &T) -> Result<Self, MessageError> {
        let bytes = bincode::serialize(payload).map_err(|e| MessageError::Encode(e.to_string()))?;
        Ok(Self::from_bytes(bytes))
    }

    /// Wrap already-encoded payload bytes.
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            timestamp: unix_now(),
            payload: Payload::Data(bytes),
        }
    }

    /// An error reply.
    #[must_use]
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            timestamp: unix_now(),
            payload: Payload::Error(text.into()),
        }
    }

    /// Whether this message carries an error.
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self.payload, Payload::Error(_))
    }

    /// Decode the payload as `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, MessageError> {
        match &self.payload {
            Payload::Data(bytes) => {
                bincode::deserialize(bytes).map_err(|e| MessageError::Decode(e.to_string()))
            }
            Payload::Error(text) => Err(MessageError::ErrorPayload(text.clone())),
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

// =============================================================================
// ENVELOPE
// =============================================================================

/// A message plus its routing metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressedMessage {
    /// Unique per envelope; doubles as the replay-protection nonce.
    pub id: Uuid,
    /// Id of the request this answers, or `id` for a request.
    pub correlation_id: Uuid,
    /// Sending device.
    pub from: DeviceId,
    /// Target device. Equal to `from` for local loopback.
    pub to: DeviceId,
    /// Category used to select handlers.
    pub routing_key: RoutingKey,
    /// Body.
    pub message: Message,
}

impl AddressedMessage {
    /// New request envelope.
    #[must_use]
    pub fn new(from: DeviceId, to: DeviceId, routing_key: RoutingKey, message: Message) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            correlation_id: id,
            from,
            to,
            routing_key,
            message,
        }
    }

    /// Reply envelope: sender and target swapped, correlation propagated,
    /// reply key derived from the original key.
    #[must_use]
    pub fn reply_to(original: &AddressedMessage, message: Message) -> Self {
        Self {
            id: Uuid::new_v4(),
            correlation_id: original.id,
            from: original.to,
            to: original.from,
            routing_key: original.routing_key.reply(),
            message,
        }
    }

    /// Whether this envelope answers `request`.
    #[must_use]
    pub fn answers(&self, request: &AddressedMessage) -> bool {
        self.correlation_id == request.id && self.correlation_id != self.id
    }

    /// Size of the bincode encoding of this envelope.
    pub fn encoded_len(&self) -> Result<usize, MessageError> {
        let size = bincode::serialized_size(self).map_err(|e| MessageError::Encode(e.to_string()))?;
        usize::try_from(size).map_err(|e| MessageError::Encode(e.to_string()))
    }
}
