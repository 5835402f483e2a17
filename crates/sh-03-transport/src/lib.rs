//! # Transport
//!
//! TCP endpoints for the home network. The master runs a [`Server`]; every
//! other device runs a [`Client`] that connects to it once its address is
//! known.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! accept/connect ─► handshake (sh-02) ─► registered in ConnectionRegistry
//!                                              │
//!                 ping on writer idle ◄────────┤
//!                                              ▼
//!          close on reader/all idle, error, peer EOF or shutdown
//!                                              │
//!                                              ▼
//!                                 unregistered, listeners notified
//! ```
//!
//! ## Security
//!
//! - Nothing but handshake packets is accepted before the handshake finishes
//! - The `from` of every inbound message must equal the authenticated peer
//! - Replayed messages are rejected by a per-connection nonce cache
//! - Frames above the configured limit close the connection before allocation

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod client;
pub mod config;
pub mod connection;
pub mod errors;
pub mod events;
pub mod framing;
pub mod listener;
pub mod server;

pub use client::{Client, ClientConnection};
pub use config::{TransportConfig, DEFAULT_MAX_FRAME_SIZE, DEFAULT_PORT};
pub use connection::TransportContext;
pub use errors::TransportError;
pub use events::{DeviceConnected, DEVICE_CONNECTED};
pub use framing::{read_frame, write_frame};
pub use listener::{ConnectionListener, Listeners};
pub use server::Server;
