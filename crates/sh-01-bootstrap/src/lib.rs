//! # Bootstrap Codes
//!
//! Introduces a new device to the network out of band.
//!
//! - [`RegistrationToken`] - 35-byte single-use admission secret
//! - [`ConnectInformation`] - address, port, identity and token packed into
//!   one fixed-width, base64-encoded record
//!
//! ## Example
//!
//! ```rust
//! use sh_01_bootstrap::{ConnectInformation, RegistrationToken};
//! use shared_types::DeviceId;
//! use std::net::Ipv4Addr;
//!
//! let info = ConnectInformation::new(
//!     Ipv4Addr::new(192, 168, 1, 2),
//!     13131,
//!     DeviceId::new([7u8; 32]),
//!     RegistrationToken::random(),
//! );
//! let code = info.encode();
//! assert_eq!(ConnectInformation::decode(&code).unwrap(), info);
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod connect_info;
pub mod errors;
pub mod token;

pub use connect_info::{ConnectInformation, DATA_LENGTH};
pub use errors::BootstrapError;
pub use token::{RegistrationToken, TOKEN_BASE64_LENGTH, TOKEN_LENGTH};
