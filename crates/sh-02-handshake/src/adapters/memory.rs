//! # In-Memory Adapters
//!
//! Lock-protected implementations of the driven ports. They also serve as
//! the state core of the file-backed stores in the node runtime, which
//! persist a snapshot after every mutation.

use crate::domain::TrustError;
use crate::ports::{DeviceRegistry, TokenSource, TrustStore};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sh_01_bootstrap::RegistrationToken;
use shared_bus::MasterResolver;
use shared_crypto::DeviceCertificate;
use shared_types::DeviceId;
use tracing::{debug, info};

// =============================================================================
// TRUST STORE
// =============================================================================

/// Persistable trust state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrustSnapshot {
    pub master_id: Option<DeviceId>,
    pub master_certificate: Option<DeviceCertificate>,
}

/// Client trust store held in memory.
#[derive(Debug, Default)]
pub struct InMemoryTrustStore {
    state: RwLock<TrustSnapshot>,
}

impl InMemoryTrustStore {
    /// Nothing known about the master.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Master id known in advance (from a bootstrap code).
    #[must_use]
    pub fn with_master_id(id: DeviceId) -> Self {
        Self::from_snapshot(TrustSnapshot {
            master_id: Some(id),
            master_certificate: None,
        })
    }

    /// Restore persisted state.
    #[must_use]
    pub fn from_snapshot(snapshot: TrustSnapshot) -> Self {
        Self {
            state: RwLock::new(snapshot),
        }
    }

    /// Copy of the current state.
    #[must_use]
    pub fn snapshot(&self) -> TrustSnapshot {
        self.state.read().clone()
    }
}

impl MasterResolver for InMemoryTrustStore {
    fn master_id(&self) -> Option<DeviceId> {
        self.state.read().master_id
    }
}

impl TrustStore for InMemoryTrustStore {
    fn master_certificate(&self) -> Option<DeviceCertificate> {
        self.state.read().master_certificate.clone()
    }

    fn set_master_id(&self, id: DeviceId) -> Result<(), TrustError> {
        let mut state = self.state.write();
        match state.master_id {
            Some(known) if known != id => Err(TrustError::IdentityMismatch {
                expected: known,
                actual: id,
            }),
            _ => {
                state.master_id = Some(id);
                Ok(())
            }
        }
    }

    fn pin_master_certificate(&self, certificate: &DeviceCertificate) -> Result<(), TrustError> {
        let id = DeviceId::from_certificate(certificate);
        let mut state = self.state.write();

        if let Some(known) = state.master_id {
            if known != id {
                return Err(TrustError::IdentityMismatch {
                    expected: known,
                    actual: id,
                });
            }
        }
        match &state.master_certificate {
            Some(pinned) if pinned == certificate => Ok(()),
            Some(_) => Err(TrustError::Conflict),
            None => {
                state.master_id = Some(id);
                state.master_certificate = Some(certificate.clone());
                info!(master = %id.to_short_text(), "[TrustStore] master certificate pinned");
                Ok(())
            }
        }
    }
}

// =============================================================================
// TOKEN SOURCE
// =============================================================================

/// Tokens configured on a client.
#[derive(Debug, Default)]
pub struct StaticTokens {
    active: RwLock<Option<RegistrationToken>>,
    passive: RwLock<Option<RegistrationToken>>,
}

impl StaticTokens {
    /// No tokens.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Holding an active token from a bootstrap code.
    #[must_use]
    pub fn with_active(token: RegistrationToken) -> Self {
        let tokens = Self::new();
        tokens.set_active(Some(token));
        tokens
    }

    /// Holding a passive token shown to the master.
    #[must_use]
    pub fn with_passive(token: RegistrationToken) -> Self {
        let tokens = Self::new();
        tokens.set_passive(Some(token));
        tokens
    }

    /// Replace the active token.
    pub fn set_active(&self, token: Option<RegistrationToken>) {
        *self.active.write() = token;
    }

    /// Replace the passive token.
    pub fn set_passive(&self, token: Option<RegistrationToken>) {
        *self.passive.write() = token;
    }
}

impl TokenSource for StaticTokens {
    fn active_registration_token(&self) -> Option<RegistrationToken> {
        self.active.read().clone()
    }

    fn passive_registration_token(&self) -> Option<RegistrationToken> {
        self.passive.read().clone()
    }
}

// =============================================================================
// DEVICE REGISTRY
// =============================================================================

/// One admitted device. The certificate is unknown until the device's first
/// authenticated connection when it was admitted passively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisteredDevice {
    pub id: DeviceId,
    pub certificate: Option<DeviceCertificate>,
}

/// Persistable registry state.
///
/// `redeemed_tokens` remembers every active token that was used, so a copy
/// of the state taken before the redemption cannot make it valid again.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub devices: Vec<RegisteredDevice>,
    pub active_tokens: Vec<RegistrationToken>,
    pub passive_tokens: Vec<(DeviceId, RegistrationToken)>,
    #[serde(default)]
    pub redeemed_tokens: Vec<RegistrationToken>,
}

/// Master device registry held in memory.
#[derive(Debug, Default)]
pub struct InMemoryDeviceRegistry {
    state: RwLock<RegistrySnapshot>,
}

impl InMemoryDeviceRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore persisted state.
    #[must_use]
    pub fn from_snapshot(snapshot: RegistrySnapshot) -> Self {
        Self {
            state: RwLock::new(snapshot),
        }
    }

    /// Copy of the current state.
    #[must_use]
    pub fn snapshot(&self) -> RegistrySnapshot {
        self.state.read().clone()
    }

    /// Admitted device ids.
    #[must_use]
    pub fn devices(&self) -> Vec<DeviceId> {
        self.state.read().devices.iter().map(|d| d.id).collect()
    }

    /// Certificate recorded for `id`.
    #[must_use]
    pub fn certificate(&self, id: &DeviceId) -> Option<DeviceCertificate> {
        self.state
            .read()
            .devices
            .iter()
            .find(|d| &d.id == id)
            .and_then(|d| d.certificate.clone())
    }

    /// Fold in state written by another registry instance.
    ///
    /// Redemptions win over issues: a token redeemed on either side stays
    /// redeemed. Passive tokens are taken only for devices that have not
    /// connected yet. Returns the number of tokens added.
    pub fn merge(&self, other: &RegistrySnapshot) -> usize {
        let mut state = self.state.write();

        for token in &other.redeemed_tokens {
            if !state.redeemed_tokens.contains(token) {
                state.redeemed_tokens.push(token.clone());
            }
            state.active_tokens.retain(|t| t != token);
        }

        let mut added = 0usize;
        for token in &other.active_tokens {
            if !state.active_tokens.contains(token) && !state.redeemed_tokens.contains(token) {
                state.active_tokens.push(token.clone());
                added += 1;
            }
        }

        for (id, token) in &other.passive_tokens {
            let pending = state.passive_tokens.iter().any(|(p, _)| p == id);
            let connected = state
                .devices
                .iter()
                .any(|d| &d.id == id && d.certificate.is_some());
            if pending || connected {
                continue;
            }
            if !state.devices.iter().any(|d| &d.id == id) {
                state.devices.push(RegisteredDevice {
                    id: *id,
                    certificate: None,
                });
            }
            state.passive_tokens.push((*id, token.clone()));
            added += 1;
        }

        if added > 0 {
            debug!(added, "[Registry] merged tokens from another instance");
        }
        added
    }
}

impl DeviceRegistry for InMemoryDeviceRegistry {
    fn is_registered(&self, id: &DeviceId) -> bool {
        self.state.read().devices.iter().any(|d| &d.id == id)
    }

    fn register_device(&self, certificate: &DeviceCertificate) -> Result<DeviceId, TrustError> {
        let id = DeviceId::from_certificate(certificate);
        let mut state = self.state.write();
        match state.devices.iter_mut().find(|d| d.id == id) {
            Some(existing) => existing.certificate = Some(certificate.clone()),
            None => {
                state.devices.push(RegisteredDevice {
                    id,
                    certificate: Some(certificate.clone()),
                });
                info!(
                    device = %id.to_short_text(),
                    name = certificate.name(),
                    "[Registry] device registered"
                );
            }
        }
        Ok(id)
    }

    fn issue_active_token(&self, token: RegistrationToken) -> Result<(), TrustError> {
        let mut state = self.state.write();
        if state.redeemed_tokens.contains(&token) {
            return Err(TrustError::TokenSpent);
        }
        if !state.active_tokens.contains(&token) {
            state.active_tokens.push(token);
        }
        Ok(())
    }

    fn redeem_active_token(&self, token: &RegistrationToken) -> bool {
        let mut state = self.state.write();
        match state.active_tokens.iter().position(|t| t == token) {
            Some(index) => {
                let redeemed = state.active_tokens.swap_remove(index);
                state.redeemed_tokens.push(redeemed);
                true
            }
            None => false,
        }
    }

    fn expect_passive_registration(
        &self,
        id: DeviceId,
        token: RegistrationToken,
    ) -> Result<(), TrustError> {
        let mut state = self.state.write();
        if !state.devices.iter().any(|d| d.id == id) {
            state.devices.push(RegisteredDevice {
                id,
                certificate: None,
            });
        }
        state.passive_tokens.retain(|(pending, _)| pending != &id);
        state.passive_tokens.push((id, token));
        Ok(())
    }

    fn take_passive_token(&self, id: &DeviceId) -> Option<RegistrationToken> {
        let mut state = self.state.write();
        let index = state.passive_tokens.iter().position(|(pending, _)| pending == id)?;
        Some(state.passive_tokens.swap_remove(index).1)
    }
}
