//! # Connect Information Codec
//!
//! The record a new device needs to find and join the network, packed into
//! a fixed-width binary layout and then base64-encoded as a whole so it can
//! travel through an optical code or a copy-paste.
//!
//! ```text
//! ┌─────────────┬───────────┬─────────────────┬──────────────────────────┐
//! │ IPv4 (4)    │ port (2)  │ device id (32)  │ token, base64 text (48)  │
//! │             │ big-endian│                 │                          │
//! └─────────────┴───────────┴─────────────────┴──────────────────────────┘
//!                       total 86 bytes before the outer base64
//! ```
//!
//! Decoding checks the total length exactly: a truncated or padded code is
//! rejected instead of decoding into shifted fields.

use crate::errors::BootstrapError;
use crate::token::{RegistrationToken, TOKEN_BASE64_LENGTH};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use shared_types::{DeviceId, ID_LENGTH};
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::str::FromStr;

/// IPv4 address length.
pub const ADDRESS_LENGTH: usize = 4;

/// Port length.
pub const PORT_LENGTH: usize = 2;

/// Decoded record length.
pub const DATA_LENGTH: usize = ADDRESS_LENGTH + PORT_LENGTH + ID_LENGTH + TOKEN_BASE64_LENGTH;

/// Bootstrap record: where to connect, who to expect there, what to present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectInformation {
    /// Address of the device that issued the code.
    pub address: Ipv4Addr,
    /// Port it listens on.
    pub port: u16,
    /// Its identity.
    pub id: DeviceId,
    /// Single-use registration token.
    pub token: RegistrationToken,
}

impl ConnectInformation {
    /// Build a record.
    #[must_use]
    pub fn new(address: Ipv4Addr, port: u16, id: DeviceId, token: RegistrationToken) -> Self {
        Self {
            address,
            port,
            id,
            token,
        }
    }

    /// Socket address to connect to.
    #[must_use]
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.address, self.port))
    }

    /// Fixed-width binary form.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(DATA_LENGTH);
        buf.extend_from_slice(&self.address.octets());
        buf.extend_from_slice(&self.port.to_be_bytes());
        buf.extend_from_slice(self.id.as_bytes());
        buf.extend_from_slice(self.token.to_base64().as_bytes());
        buf
    }

    /// Parse the fixed-width binary form.
    pub fn from_bytes(data: &[u8]) -> Result<Self, BootstrapError> {
        if data.len() != DATA_LENGTH {
            return Err(BootstrapError::LengthMismatch {
                expected: DATA_LENGTH,
                actual: data.len(),
            });
        }

        let (address, rest) = data.split_at(ADDRESS_LENGTH);
        let (port, rest) = rest.split_at(PORT_LENGTH);
        let (id, token) = rest.split_at(ID_LENGTH);

        let address = Ipv4Addr::new(address[0], address[1], address[2], address[3]);
        let port = u16::from_be_bytes([port[0], port[1]]);
        let id = DeviceId::from_bytes(id)?;
        let token_text = std::str::from_utf8(token)
            .map_err(|e| BootstrapError::InvalidEncoding(e.to_string()))?;
        let token = RegistrationToken::from_base64(token_text)?;

        Ok(Self::new(address, port, id, token))
    }

    /// Transport-safe text form.
    #[must_use]
    pub fn encode(&self) -> String {
        STANDARD.encode(self.to_bytes())
    }

    /// Parse the text form produced by [`ConnectInformation::encode`].
    pub fn decode(text: &str) -> Result<Self, BootstrapError> {
        let data = STANDARD
            .decode(text.trim())
            .map_err(|e| BootstrapError::InvalidEncoding(e.to_string()))?;
        Self::from_bytes(&data)
    }
}

impl fmt::Display for ConnectInformation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for ConnectInformation {
    type Err = BootstrapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}
