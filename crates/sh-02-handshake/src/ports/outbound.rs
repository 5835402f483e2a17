//! # Driven Ports (Outbound SPI)
//!
//! What the handshake needs from the host: somewhere to pin the master's
//! identity, the tokens this device holds, and (on the master) the set of
//! admitted devices.
//!
//! All ports are synchronous. Implementations must make each call atomic;
//! several connections may run handshakes concurrently.

use crate::domain::TrustError;
use sh_01_bootstrap::RegistrationToken;
use shared_bus::MasterResolver;
use shared_crypto::DeviceCertificate;
use shared_types::DeviceId;

/// Client-side knowledge of the master.
///
/// The master id may be known before its certificate: a bootstrap code
/// carries the id, and the certificate is pinned on first contact.
pub trait TrustStore: MasterResolver {
    /// The pinned master certificate.
    fn master_certificate(&self) -> Option<DeviceCertificate>;

    /// Whether the master id is known.
    fn is_master_known(&self) -> bool {
        self.master_id().is_some()
    }

    /// Record the master id without a certificate.
    ///
    /// Fails with [`TrustError::IdentityMismatch`] if a different id is known.
    fn set_master_id(&self, id: DeviceId) -> Result<(), TrustError>;

    /// Pin `certificate` as the master's.
    ///
    /// Compare-and-set: fails with [`TrustError::IdentityMismatch`] when the
    /// certificate does not hash to a known master id, and with
    /// [`TrustError::Conflict`] when a different certificate is pinned.
    /// Pinning the same certificate again succeeds.
    fn pin_master_certificate(&self, certificate: &DeviceCertificate) -> Result<(), TrustError>;
}

/// Registration tokens held by a client.
pub trait TokenSource: Send + Sync {
    /// Token issued by the master, for active registration.
    fn active_registration_token(&self) -> Option<RegistrationToken>;

    /// Token this device showed to the master, expected back as proof.
    fn passive_registration_token(&self) -> Option<RegistrationToken>;
}

/// Master-side registry of admitted devices.
pub trait DeviceRegistry: Send + Sync {
    /// Whether `id` may connect without registering.
    fn is_registered(&self, id: &DeviceId) -> bool;

    /// Record an authenticated device's certificate. Idempotent.
    fn register_device(&self, certificate: &DeviceCertificate) -> Result<DeviceId, TrustError>;

    /// Make `token` redeemable once by any new device.
    fn issue_active_token(&self, token: RegistrationToken) -> Result<(), TrustError>;

    /// Consume an active token. `false` when unknown or already used.
    fn redeem_active_token(&self, token: &RegistrationToken) -> bool;

    /// Admit `id` ahead of its first connection; `token` is returned to it
    /// as proof of the master's identity.
    fn expect_passive_registration(
        &self,
        id: DeviceId,
        token: RegistrationToken,
    ) -> Result<(), TrustError>;

    /// Take the passive proof owed to `id`, if any.
    fn take_passive_token(&self, id: &DeviceId) -> Option<RegistrationToken>;
}
