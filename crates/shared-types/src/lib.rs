//! # Shared Types Crate
//!
//! Value types shared by every Secure Home crate: device identities, routing
//! keys, the `AddressedMessage` envelope and the typed component container.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: cross-crate types are defined here.
//! - **Byte Equality**: identities compare on raw bytes, never on text.
//! - **Envelope Authority**: an envelope's `from` is the only sender identity;
//!   payloads do not repeat it.

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod container;
pub mod device_id;
pub mod envelope;
pub mod errors;

pub use container::{Component, Container};
pub use device_id::{DeviceId, ID_LENGTH};
pub use envelope::{AddressedMessage, Message, Payload, RoutingKey};
pub use errors::*;
