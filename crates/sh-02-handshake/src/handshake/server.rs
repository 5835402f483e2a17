//! Acceptor side: the master authenticating a client.
//!
//! The master answers the client's Hello with its own (still in the clear),
//! installs the security stages, then runs the mirrored CHAP exchange. A
//! device the registry does not know gets one chance to present an active
//! registration token.

use super::{advance, new_challenge, Handshake};
use crate::domain::{
    Challenge, HandshakeError, HandshakeOutcome, HandshakePacket, HandshakeProgress,
    HandshakeState, ProtocolViolation, Role, SecureChannel, SecurityPipelineFactory, TrustError,
    WireMessage,
};
use crate::ports::DeviceRegistry;
use sh_01_bootstrap::RegistrationToken;
use shared_crypto::{DeviceCertificate, DeviceKeys};
use shared_types::DeviceId;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Sent to a client the registry does not know.
pub const UNKNOWN_CLIENT: &str = "Unknown client, please register";

/// Sent when an active registration token is not accepted.
pub const TOKEN_REJECTED: &str = "Registration token rejected";

/// Whether `ip` belongs to the home network: loopback, RFC 1918, link-local
/// or IPv6 unique-local.
#[must_use]
pub fn is_local_address(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback() || v4.is_private() || v4.is_link_local(),
        IpAddr::V6(v6) => {
            if let Some(v4) = v6.to_ipv4_mapped() {
                return is_local_address(IpAddr::V4(v4));
            }
            let first = v6.segments()[0];
            v6.is_loopback() || (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfe80
        }
    }
}

/// Master handshake for one accepted connection.
pub struct ServerHandshake {
    keys: Arc<DeviceKeys>,
    registry: Arc<dyn DeviceRegistry>,
    is_connection_local: bool,
    state: HandshakeState,
    challenge: Option<Challenge>,
    client: Option<(DeviceId, DeviceCertificate)>,
}

impl ServerHandshake {
    /// New handshake for a client connecting from `remote`.
    pub fn new(keys: Arc<DeviceKeys>, registry: Arc<dyn DeviceRegistry>, remote: IpAddr) -> Self {
        Self {
            keys,
            registry,
            is_connection_local: is_local_address(remote),
            state: HandshakeState::NotStarted,
            challenge: None,
            client: None,
        }
    }

    /// Whether the client connects from the home network.
    #[must_use]
    pub fn is_connection_local(&self) -> bool {
        self.is_connection_local
    }

    fn dispatch(
        &mut self,
        packet: HandshakePacket,
        channel: &mut SecureChannel,
    ) -> Result<HandshakeProgress, HandshakeError> {
        match packet {
            HandshakePacket::Hello {
                certificate,
                is_master,
            } => self.handle_hello(certificate, is_master, channel),
            HandshakePacket::Chap {
                challenge: Some(challenge),
                response: None,
            } => self.handle_chap_challenge(challenge, channel),
            HandshakePacket::Chap {
                challenge: None,
                response: Some(response),
            } => self.handle_chap_response(response, channel),
            HandshakePacket::Chap { .. } => Err(ProtocolViolation::MalformedChap.into()),
            HandshakePacket::ActiveRegistrationRequest { token } => {
                self.handle_registration(token, channel)
            }
            other @ HandshakePacket::ServerAuthenticationResponse { .. } => {
                Err(ProtocolViolation::UnexpectedPacket {
                    state: self.state,
                    packet: other.kind(),
                }
                .into())
            }
        }
    }

    fn handle_hello(
        &mut self,
        certificate: DeviceCertificate,
        is_master: bool,
        channel: &mut SecureChannel,
    ) -> Result<HandshakeProgress, HandshakeError> {
        advance(
            &mut self.state,
            HandshakeState::ExpectHello,
            HandshakeState::ExpectChap,
            "Hello",
        )?;
        if is_master {
            return Err(ProtocolViolation::RoleMismatch { expected: false }.into());
        }
        certificate
            .verify_self_signature()
            .map_err(TrustError::InvalidCertificate)?;
        let client_id = DeviceId::from_certificate(&certificate);
        debug!(client = %client_id.to_short_text(), "[Handshake] client hello received");

        // Our Hello still goes out in the clear: the client has no keys yet.
        channel.send(&WireMessage::from(HandshakePacket::Hello {
            certificate: self.keys.certificate().clone(),
            is_master: true,
        }))?;
        SecurityPipelineFactory::create(self.keys.clone(), &certificate)
            .map_err(TrustError::InvalidCertificate)?
            .install(channel.pipeline_mut())?;
        self.client = Some((client_id, certificate));
        Ok(HandshakeProgress::Continue)
    }

    fn handle_chap_challenge(
        &mut self,
        their_challenge: Challenge,
        channel: &mut SecureChannel,
    ) -> Result<HandshakeProgress, HandshakeError> {
        advance(
            &mut self.state,
            HandshakeState::ExpectChap,
            HandshakeState::ExpectChapResponse,
            "Chap",
        )?;
        let challenge = new_challenge();
        self.challenge = Some(challenge);
        channel.send(&WireMessage::from(HandshakePacket::Chap {
            challenge: Some(challenge),
            response: Some(their_challenge),
        }))?;
        Ok(HandshakeProgress::Continue)
    }

    fn handle_chap_response(
        &mut self,
        response: Challenge,
        channel: &mut SecureChannel,
    ) -> Result<HandshakeProgress, HandshakeError> {
        advance(
            &mut self.state,
            HandshakeState::ExpectChapResponse,
            HandshakeState::StateReceived,
            "Chap",
        )?;
        if Some(response) != self.challenge {
            return Err(ProtocolViolation::ChallengeMismatch.into());
        }

        let (client_id, _) = self.client()?;
        if self.registry.is_registered(&client_id) {
            return self.accept(channel);
        }

        info!(client = %client_id.to_short_text(), "[Handshake] unknown client, requesting registration");
        self.respond(channel, false, Some(UNKNOWN_CLIENT.to_string()), None)?;
        advance(
            &mut self.state,
            HandshakeState::StateReceived,
            HandshakeState::ExpectRegistration,
            "Chap",
        )?;
        Ok(HandshakeProgress::Continue)
    }

    fn handle_registration(
        &mut self,
        token: RegistrationToken,
        channel: &mut SecureChannel,
    ) -> Result<HandshakeProgress, HandshakeError> {
        advance(
            &mut self.state,
            HandshakeState::ExpectRegistration,
            HandshakeState::StateReceived,
            "ActiveRegistrationRequest",
        )?;
        if self.registry.redeem_active_token(&token) {
            return self.accept(channel);
        }

        let (client_id, _) = self.client()?;
        warn!(client = %client_id.to_short_text(), "[Handshake] registration token rejected");
        self.respond(channel, false, Some(TOKEN_REJECTED.to_string()), None)?;
        Err(HandshakeError::Rejected(TOKEN_REJECTED.to_string()))
    }

    fn accept(&mut self, channel: &mut SecureChannel) -> Result<HandshakeProgress, HandshakeError> {
        let (client_id, certificate) = self.client()?;
        self.registry.register_device(&certificate)?;
        let passive = self.registry.take_passive_token(&client_id);

        self.respond(channel, true, None, passive)?;
        advance(
            &mut self.state,
            HandshakeState::StateReceived,
            HandshakeState::Finished,
            "accept",
        )?;
        channel.finish_handshake()?;
        info!(
            client = %client_id.to_short_text(),
            name = certificate.name(),
            local = self.is_connection_local,
            "[Handshake] client authenticated"
        );
        Ok(HandshakeProgress::Finished(HandshakeOutcome {
            peer_id: client_id,
            peer_certificate: certificate,
            is_connection_local: self.is_connection_local,
        }))
    }

    fn respond(
        &self,
        channel: &mut SecureChannel,
        is_authenticated: bool,
        message: Option<String>,
        passive_registration_token: Option<RegistrationToken>,
    ) -> Result<(), HandshakeError> {
        channel.send(&WireMessage::from(
            HandshakePacket::ServerAuthenticationResponse {
                is_authenticated,
                message,
                passive_registration_token,
                is_connection_local: self.is_connection_local,
            },
        ))?;
        Ok(())
    }

    fn client(&self) -> Result<(DeviceId, DeviceCertificate), HandshakeError> {
        self.client.clone().ok_or_else(|| {
            ProtocolViolation::UnexpectedPacket {
                state: self.state,
                packet: "Chap",
            }
            .into()
        })
    }
}

impl Handshake for ServerHandshake {
    fn role(&self) -> Role {
        Role::Acceptor
    }

    fn state(&self) -> HandshakeState {
        self.state
    }

    /// The master speaks second; starting only arms the Hello expectation.
    fn start(&mut self, _channel: &mut SecureChannel) -> Result<HandshakeProgress, HandshakeError> {
        let result = advance(
            &mut self.state,
            HandshakeState::NotStarted,
            HandshakeState::ExpectHello,
            "start",
        );
        if result.is_err() {
            self.state = HandshakeState::Failed;
        }
        result.map(|()| HandshakeProgress::Continue)
    }

    fn on_packet(
        &mut self,
        packet: HandshakePacket,
        channel: &mut SecureChannel,
    ) -> Result<HandshakeProgress, HandshakeError> {
        if self.state.is_terminal() {
            return Err(ProtocolViolation::UnexpectedPacket {
                state: self.state,
                packet: packet.kind(),
            }
            .into());
        }
        let result = self.dispatch(packet, channel);
        if result.is_err() {
            self.state = HandshakeState::Failed;
        }
        result
    }
}
