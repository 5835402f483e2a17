//! # Secure Home Test Suite
//!
//! Cross-crate tests that run real master and client endpoints against each
//! other over loopback TCP.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── harness.rs          # devices, master fixture, recording listener, inbox
//!     ├── handshake_flows.rs  # registration paths and trust failures
//!     ├── routing_flows.rs    # messages across an authenticated connection
//!     ├── lifecycle.rs        # timeouts, keep-alive, shutdown, hostile peers
//!     └── node_flows.rs       # node-runtime wiring end to end
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p sh-tests
//! cargo test -p sh-tests integration::lifecycle::
//! ```

#![allow(dead_code)]
#![allow(clippy::unwrap_used, clippy::expect_used)]

pub mod integration;
