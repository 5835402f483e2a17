//! Initiator side: a client authenticating to the master.

use super::{advance, new_challenge, Handshake};
use crate::domain::{
    Challenge, HandshakeError, HandshakeOutcome, HandshakePacket, HandshakeProgress,
    HandshakeState, ProtocolViolation, Role, SecureChannel, SecurityPipelineFactory, TrustError,
    WireMessage,
};
use crate::ports::{TokenSource, TrustStore};
use sh_01_bootstrap::RegistrationToken;
use shared_crypto::{DeviceCertificate, DeviceKeys};
use shared_types::DeviceId;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Message used when the master's proof of identity is missing or wrong.
pub const UNVERIFIED_MASTER: &str = "Master is not verified yet sent invalid token";

/// Client handshake.
pub struct ClientHandshake {
    keys: Arc<DeviceKeys>,
    trust: Arc<dyn TrustStore>,
    tokens: Arc<dyn TokenSource>,
    state: HandshakeState,
    challenge: Option<Challenge>,
    master: Option<(DeviceId, DeviceCertificate)>,
    master_known_at_hello: bool,
    tried_register: bool,
}

impl ClientHandshake {
    /// New handshake for one connection attempt.
    pub fn new(
        keys: Arc<DeviceKeys>,
        trust: Arc<dyn TrustStore>,
        tokens: Arc<dyn TokenSource>,
    ) -> Self {
        Self {
            keys,
            trust,
            tokens,
            state: HandshakeState::NotStarted,
            challenge: None,
            master: None,
            master_known_at_hello: false,
            tried_register: false,
        }
    }

    /// Whether an active registration request was sent.
    #[must_use]
    pub fn tried_register(&self) -> bool {
        self.tried_register
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
                challenge,
                response,
            } => self.handle_chap(challenge, response, channel),
            HandshakePacket::ServerAuthenticationResponse {
                is_authenticated,
                message,
                passive_registration_token,
                is_connection_local,
            } => self.handle_auth_response(
                is_authenticated,
                message,
                passive_registration_token,
                is_connection_local,
                channel,
            ),
            other @ HandshakePacket::ActiveRegistrationRequest { .. } => {
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
        if !is_master {
            return Err(ProtocolViolation::RoleMismatch { expected: true }.into());
        }
        certificate
            .verify_self_signature()
            .map_err(TrustError::InvalidCertificate)?;

        let master_id = DeviceId::from_certificate(&certificate);
        self.master_known_at_hello = match self.trust.master_id() {
            Some(known) if known != master_id => {
                return Err(TrustError::IdentityMismatch {
                    expected: known,
                    actual: master_id,
                }
                .into());
            }
            Some(_) => {
                // Pins on first contact, checks the pinned certificate after.
                self.trust.pin_master_certificate(&certificate)?;
                true
            }
            None => false,
        };
        debug!(
            master = %master_id.to_short_text(),
            known = self.master_known_at_hello,
            "[Handshake] master hello received"
        );

        SecurityPipelineFactory::create(self.keys.clone(), &certificate)
            .map_err(TrustError::InvalidCertificate)?
            .install(channel.pipeline_mut())?;
        self.master = Some((master_id, certificate));

        let challenge = new_challenge();
        self.challenge = Some(challenge);
        channel.send(&WireMessage::from(HandshakePacket::Chap {
            challenge: Some(challenge),
            response: None,
        }))?;
        Ok(HandshakeProgress::Continue)
    }

    fn handle_chap(
        &mut self,
        challenge: Option<Challenge>,
        response: Option<Challenge>,
        channel: &mut SecureChannel,
    ) -> Result<HandshakeProgress, HandshakeError> {
        advance(
            &mut self.state,
            HandshakeState::ExpectChap,
            HandshakeState::ExpectState,
            "Chap",
        )?;
        let (Some(their_challenge), Some(response)) = (challenge, response) else {
            return Err(ProtocolViolation::MalformedChap.into());
        };
        if Some(response) != self.challenge {
            return Err(ProtocolViolation::ChallengeMismatch.into());
        }

        channel.send(&WireMessage::from(HandshakePacket::Chap {
            challenge: None,
            response: Some(their_challenge),
        }))?;
        Ok(HandshakeProgress::Continue)
    }

    fn handle_auth_response(
        &mut self,
        is_authenticated: bool,
        message: Option<String>,
        passive_token: Option<RegistrationToken>,
        is_connection_local: bool,
        channel: &mut SecureChannel,
    ) -> Result<HandshakeProgress, HandshakeError> {
        advance(
            &mut self.state,
            HandshakeState::ExpectState,
            HandshakeState::StateReceived,
            "ServerAuthenticationResponse",
        )?;

        if !is_authenticated {
            return self.handle_unauthenticated(message, channel);
        }

        let (master_id, certificate) = self
            .master
            .clone()
            .ok_or_else(|| TrustError::Unverified(UNVERIFIED_MASTER.to_string()))?;
        let expected = self.tokens.passive_registration_token();

        if self.master_known_at_hello {
            // Identity already proven by id; a token, if sent, must agree.
            if passive_token.is_some() && passive_token != expected {
                return Err(TrustError::ConflictingProof.into());
            }
        } else {
            match (&passive_token, &expected) {
                (Some(received), Some(expected)) if received == expected => {
                    self.trust.pin_master_certificate(&certificate)?;
                }
                _ => return Err(TrustError::Unverified(UNVERIFIED_MASTER.to_string()).into()),
            }
        }

        if self.trust.master_id() != Some(master_id) {
            return Err(TrustError::Unverified("Master is still unknown".to_string()).into());
        }

        advance(
            &mut self.state,
            HandshakeState::StateReceived,
            HandshakeState::Finished,
            "ServerAuthenticationResponse",
        )?;
        channel.finish_handshake()?;
        info!(
            master = %master_id.to_short_text(),
            local = is_connection_local,
            "[Handshake] authenticated to master"
        );
        Ok(HandshakeProgress::Finished(HandshakeOutcome {
            peer_id: master_id,
            peer_certificate: certificate,
            is_connection_local,
        }))
    }

    fn handle_unauthenticated(
        &mut self,
        message: Option<String>,
        channel: &mut SecureChannel,
    ) -> Result<HandshakeProgress, HandshakeError> {
        if !self.tried_register {
            if let Some(token) = self.tokens.active_registration_token() {
                self.tried_register = true;
                advance(
                    &mut self.state,
                    HandshakeState::StateReceived,
                    HandshakeState::ExpectState,
                    "ServerAuthenticationResponse",
                )?;
                debug!("[Handshake] not registered, presenting active token");
                channel.send(&WireMessage::from(HandshakePacket::ActiveRegistrationRequest {
                    token,
                }))?;
                return Ok(HandshakeProgress::Continue);
            }
        }

        let reason = message.unwrap_or_else(|| "Authentication failed".to_string());
        warn!(reason = %reason, "[Handshake] master refused authentication");
        Err(HandshakeError::Rejected(reason))
    }
}

impl Handshake for ClientHandshake {
    fn role(&self) -> Role {
        Role::Initiator
    }

    fn state(&self) -> HandshakeState {
        self.state
    }

    fn start(&mut self, channel: &mut SecureChannel) -> Result<HandshakeProgress, HandshakeError> {
        let result = advance(
            &mut self.state,
            HandshakeState::NotStarted,
            HandshakeState::ExpectHello,
            "start",
        )
        .and_then(|()| {
            channel
                .send(&WireMessage::from(HandshakePacket::Hello {
                    certificate: self.keys.certificate().clone(),
                    is_master: false,
                }))
                .map_err(HandshakeError::from)
        });
        match result {
            Ok(()) => {
                debug!("[Handshake] client hello sent");
                Ok(HandshakeProgress::Continue)
            }
            Err(e) => {
                self.state = HandshakeState::Failed;
                Err(e)
            }
        }
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
