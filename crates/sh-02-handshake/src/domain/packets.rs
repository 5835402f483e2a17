//! # Wire Packets
//!
//! Everything that crosses a connection is one [`WireMessage`], encoded with
//! bincode and then passed through the frame pipeline.

use crate::domain::errors::ChannelError;
use serde::{Deserialize, Serialize};
use sh_01_bootstrap::RegistrationToken;
use shared_crypto::DeviceCertificate;
use shared_types::AddressedMessage;

/// Bytes the bincode variant tag of a [`WireMessage`] adds to its content.
pub const WIRE_TAG_LEN: usize = 4;

/// CHAP challenge length.
pub const CHALLENGE_LENGTH: usize = 32;

/// A CHAP challenge or response.
pub type Challenge = [u8; CHALLENGE_LENGTH];

/// Authentication exchange between a client and the master.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HandshakePacket {
    /// First packet from each side, sent in the clear.
    Hello {
        certificate: DeviceCertificate,
        is_master: bool,
    },

    /// Challenge-response. The first CHAP of a side carries only a
    /// challenge; later ones carry the response to the peer's challenge.
    Chap {
        challenge: Option<Challenge>,
        response: Option<Challenge>,
    },

    /// Master's verdict on the client.
    ServerAuthenticationResponse {
        is_authenticated: bool,
        message: Option<String>,
        passive_registration_token: Option<RegistrationToken>,
        is_connection_local: bool,
    },

    /// Client presents an active registration token.
    ActiveRegistrationRequest { token: RegistrationToken },
}

impl HandshakePacket {
    /// Packet kind, for logs and protocol errors.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Hello { .. } => "Hello",
            Self::Chap { .. } => "Chap",
            Self::ServerAuthenticationResponse { .. } => "ServerAuthenticationResponse",
            Self::ActiveRegistrationRequest { .. } => "ActiveRegistrationRequest",
        }
    }
}

/// Top-level frame content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WireMessage {
    /// Handshake traffic; only valid before the handshake finishes.
    Handshake(HandshakePacket),
    /// Keepalive; only valid after the handshake finishes.
    Ping,
    /// Application message; only valid after the handshake finishes.
    Message(AddressedMessage),
}

impl WireMessage {
    /// Message kind, for logs and protocol errors.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Handshake(packet) => packet.kind(),
            Self::Ping => "Ping",
            Self::Message(_) => "Message",
        }
    }

    /// Serialize for the pipeline.
    pub fn encode(&self) -> Result<Vec<u8>, ChannelError> {
        bincode::serialize(self).map_err(|e| ChannelError::Codec(e.to_string()))
    }

    /// Deserialize a frame that left the pipeline.
    pub fn decode(bytes: &[u8]) -> Result<Self, ChannelError> {
        bincode::deserialize(bytes).map_err(|e| ChannelError::Codec(e.to_string()))
    }
}

impl From<HandshakePacket> for WireMessage {
    fn from(packet: HandshakePacket) -> Self {
        Self::Handshake(packet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_crypto::DeviceKeys;
    use shared_types::{DeviceId, Message, RoutingKey};

    #[test]
    fn test_hello_roundtrip_keeps_certificate_valid() {
        let keys = DeviceKeys::generate("thermostat");
        let msg = WireMessage::from(HandshakePacket::Hello {
            certificate: keys.certificate().clone(),
            is_master: false,
        });

        let decoded = WireMessage::decode(&msg.encode().unwrap()).unwrap();
        match decoded {
            WireMessage::Handshake(HandshakePacket::Hello { certificate, is_master }) => {
                assert!(!is_master);
                assert!(certificate.verify_self_signature().is_ok());
                assert_eq!(&certificate, keys.certificate());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_message_roundtrip() {
        let msg = WireMessage::Message(AddressedMessage::new(
            DeviceId::new([1; 32]),
            DeviceId::new([2; 32]),
            RoutingKey::from_static("light/set"),
            Message::from_bytes(vec![1, 2, 3]),
        ));
        assert_eq!(WireMessage::decode(&msg.encode().unwrap()).unwrap(), msg);
    }

    #[test]
    fn test_garbage_does_not_decode() {
        assert!(matches!(
            WireMessage::decode(&[0xFF, 0xFF, 0xFF, 0xFF, 0x01]),
            Err(ChannelError::Codec(_))
        ));
    }

    #[test]
    fn test_kinds() {
        assert_eq!(WireMessage::Ping.kind(), "Ping");
        let chap = HandshakePacket::Chap {
            challenge: None,
            response: None,
        };
        assert_eq!(WireMessage::from(chap).kind(), "Chap");
    }
}
