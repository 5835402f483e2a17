//! # Shared Bus - Message Routing
//!
//! The steady-state owner of every secured connection: once a handshake has
//! finished, inbound messages flow through the [`IncomingDispatcher`] and
//! outbound messages are addressed by the [`OutgoingRouter`].
//!
//! ## Flow
//!
//! ```text
//! ┌──────────────┐  send_message()   ┌────────────────┐   outbox   ┌────────────┐
//! │   Handler    │ ────────────────→ │ OutgoingRouter │ ─────────→ │ Connection │
//! │              │                   └────────────────┘            └────────────┘
//! │              │                        │ local                        │
//! │              │       handle()         ▼                              │ inbound
//! │              │ ←──────────────── ┌────────────────────┐ ←────────────┘
//! └──────────────┘                   │ IncomingDispatcher │
//!                                    └────────────────────┘
//! ```
//!
//! ## Security
//!
//! - **Envelope-Only Identity:** `from` on network traffic is checked against
//!   the authenticated peer by the transport before dispatch
//! - **Time-Bounded Nonce Cache:** rejects replayed network messages

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod connections;
pub mod dispatcher;
pub mod errors;
pub mod handler;
pub mod nonce_cache;
pub mod router;

// Re-export main types
pub use connections::{ConnectionRegistry, PeerConnection};
pub use dispatcher::IncomingDispatcher;
pub use errors::RoutingError;
pub use handler::{HandlerError, MessageHandler, RegisteredKeys};
pub use nonce_cache::{NonceError, TimeBoundedNonceCache};
pub use router::{MasterResolver, OutgoingRouter};

/// Outbound messages buffered per connection before senders wait.
pub const DEFAULT_OUTBOX_CAPACITY: usize = 256;
