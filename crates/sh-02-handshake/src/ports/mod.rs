//! Port definitions for the handshake.

pub mod outbound;

pub use outbound::{DeviceRegistry, TokenSource, TrustStore};
