//! File-backed master device registry.

use super::{load_json, save_json, StorageError};
use parking_lot::Mutex;
use sh_01_bootstrap::RegistrationToken;
use sh_02_handshake::adapters::RegistrySnapshot;
use sh_02_handshake::{DeviceRegistry, InMemoryDeviceRegistry, TrustError};
use shared_crypto::DeviceCertificate;
use shared_types::{Component, DeviceId};
use std::path::{Path, PathBuf};
use tracing::{error, warn};

/// Registry file name inside the data directory.
pub const REGISTRY_FILE: &str = "registry.json";

/// [`InMemoryDeviceRegistry`] that writes its state to disk after every change.
///
/// Tokens issued by `node-runtime invite` while the master is running land
/// only on disk. They are merged into memory before every change and when a
/// lookup misses, so the next save never drops them. Redeemed tokens are
/// recorded in the file too, so a writer holding an older copy of the state
/// cannot bring a spent token back.
///
/// Within one process, merge, change and save run under one lock.
#[derive(Debug)]
pub struct FileDeviceRegistry {
    path: PathBuf,
    inner: InMemoryDeviceRegistry,
    write_lock: Mutex<()>,
}

impl FileDeviceRegistry {
    /// Open the registry in `data_dir`.
    pub fn open(data_dir: &Path) -> Result<Self, StorageError> {
        let path = data_dir.join(REGISTRY_FILE);
        let snapshot: RegistrySnapshot = load_json(&path)?;
        Ok(Self {
            path,
            inner: InMemoryDeviceRegistry::from_snapshot(snapshot),
            write_lock: Mutex::new(()),
        })
    }

    /// Admitted device ids.
    #[must_use]
    pub fn devices(&self) -> Vec<DeviceId> {
        self.inner.devices()
    }

    /// Certificate recorded for `id`.
    #[must_use]
    pub fn certificate(&self, id: &DeviceId) -> Option<DeviceCertificate> {
        self.inner.certificate(id)
    }

    fn persist(&self) -> Result<(), TrustError> {
        save_json(&self.path, &self.inner.snapshot()).map_err(|e| TrustError::Storage(e.to_string()))
    }

    /// Pull in tokens issued or redeemed by another process.
    fn merge_from_disk(&self) {
        match load_json::<RegistrySnapshot>(&self.path) {
            Ok(disk) => {
                self.inner.merge(&disk);
            }
            Err(e) => warn!(error = %e, "[Registry] cannot re-read registry file"),
        }
    }
}

impl DeviceRegistry for FileDeviceRegistry {
    fn is_registered(&self, id: &DeviceId) -> bool {
        if self.inner.is_registered(id) {
            return true;
        }
        let _guard = self.write_lock.lock();
        self.merge_from_disk();
        self.inner.is_registered(id)
    }

    fn register_device(&self, certificate: &DeviceCertificate) -> Result<DeviceId, TrustError> {
        let id = DeviceId::from_certificate(certificate);
        if self.inner.certificate(&id).as_ref() == Some(certificate) {
            return Ok(id);
        }
        let _guard = self.write_lock.lock();
        self.merge_from_disk();
        self.inner.register_device(certificate)?;
        self.persist()?;
        Ok(id)
    }

    fn issue_active_token(&self, token: RegistrationToken) -> Result<(), TrustError> {
        let _guard = self.write_lock.lock();
        self.merge_from_disk();
        self.inner.issue_active_token(token)?;
        self.persist()
    }

    fn redeem_active_token(&self, token: &RegistrationToken) -> bool {
        let _guard = self.write_lock.lock();
        self.merge_from_disk();
        if !self.inner.redeem_active_token(token) {
            return false;
        }
        if let Err(e) = self.persist() {
            error!(error = %e, "[Registry] redeemed token could not be persisted");
        }
        true
    }

    fn expect_passive_registration(
        &self,
        id: DeviceId,
        token: RegistrationToken,
    ) -> Result<(), TrustError> {
        let _guard = self.write_lock.lock();
        self.merge_from_disk();
        self.inner.expect_passive_registration(id, token)?;
        self.persist()
    }

    fn take_passive_token(&self, id: &DeviceId) -> Option<RegistrationToken> {
        let _guard = self.write_lock.lock();
        self.merge_from_disk();
        let token = self.inner.take_passive_token(id)?;
        if let Err(e) = self.persist() {
            error!(error = %e, "[Registry] consumed passive token could not be persisted");
        }
        Some(token)
    }
}

impl Component for FileDeviceRegistry {}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_crypto::DeviceKeys;

    #[test]
    fn test_registration_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let lamp = DeviceKeys::generate("lamp");
        let token = RegistrationToken::random();

        let registry = FileDeviceRegistry::open(dir.path()).unwrap();
        registry.issue_active_token(token.clone()).unwrap();
        drop(registry);

        let registry = FileDeviceRegistry::open(dir.path()).unwrap();
        assert!(registry.redeem_active_token(&token));
        let id = registry.register_device(lamp.certificate()).unwrap();
        drop(registry);

        let registry = FileDeviceRegistry::open(dir.path()).unwrap();
        assert!(registry.is_registered(&id));
        assert!(!registry.redeem_active_token(&token));
        assert_eq!(registry.certificate(&id).as_ref(), Some(lamp.certificate()));
    }

    #[test]
    fn test_token_issued_by_another_process() {
        let dir = tempfile::tempdir().unwrap();
        let running = FileDeviceRegistry::open(dir.path()).unwrap();
        let lamp = DeviceKeys::generate("lamp");
        let lamp_id = DeviceId::from_certificate(lamp.certificate());

        let token = RegistrationToken::random();
        let passive = RegistrationToken::random();
        let cli = FileDeviceRegistry::open(dir.path()).unwrap();
        cli.issue_active_token(token.clone()).unwrap();
        cli.expect_passive_registration(lamp_id, passive.clone()).unwrap();
        drop(cli);

        assert!(running.is_registered(&lamp_id));
        assert_eq!(running.take_passive_token(&lamp_id), Some(passive));
        assert!(running.redeem_active_token(&token));
        assert!(!running.redeem_active_token(&token));

        // a later save by the running master keeps what the CLI wrote meanwhile
        let late = RegistrationToken::random();
        let cli = FileDeviceRegistry::open(dir.path()).unwrap();
        cli.issue_active_token(late.clone()).unwrap();
        running.register_device(lamp.certificate()).unwrap();
        let reopened = FileDeviceRegistry::open(dir.path()).unwrap();
        assert!(reopened.redeem_active_token(&late));
    }

    #[test]
    fn test_redeemed_token_stays_spent_after_stale_write() {
        let dir = tempfile::tempdir().unwrap();
        let token = RegistrationToken::random();

        let running = FileDeviceRegistry::open(dir.path()).unwrap();
        running.issue_active_token(token.clone()).unwrap();

        // opened while the token was still unused
        let cli = FileDeviceRegistry::open(dir.path()).unwrap();
        assert!(running.redeem_active_token(&token));

        cli.issue_active_token(RegistrationToken::random()).unwrap();
        assert!(!running.redeem_active_token(&token));
        assert!(!cli.redeem_active_token(&token));
        assert!(!FileDeviceRegistry::open(dir.path()).unwrap().redeem_active_token(&token));
    }

    #[test]
    fn test_old_file_contents_cannot_revive_token() {
        let dir = tempfile::tempdir().unwrap();
        let token = RegistrationToken::random();
        let running = FileDeviceRegistry::open(dir.path()).unwrap();
        running.issue_active_token(token.clone()).unwrap();
        let before = running.inner.snapshot();

        assert!(running.redeem_active_token(&token));
        // a writer that never saw the redemption puts the old state back
        save_json(&dir.path().join(REGISTRY_FILE), &before).unwrap();

        assert!(!running.redeem_active_token(&token));
        assert_eq!(
            running.issue_active_token(token.clone()),
            Err(TrustError::TokenSpent)
        );
    }

    #[test]
    fn test_concurrent_changes_are_all_kept() {
        let dir = tempfile::tempdir().unwrap();
        let registry = std::sync::Arc::new(FileDeviceRegistry::open(dir.path()).unwrap());
        let tokens: Vec<_> = (0..16).map(|_| RegistrationToken::random()).collect();

        let writers: Vec<_> = tokens
            .iter()
            .cloned()
            .map(|token| {
                let registry = registry.clone();
                std::thread::spawn(move || registry.issue_active_token(token).unwrap())
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let reopened = FileDeviceRegistry::open(dir.path()).unwrap();
        for token in &tokens {
            assert!(reopened.redeem_active_token(token));
        }
    }

    #[test]
    fn test_passive_token_taken_once_across_restart() {
        let dir = tempfile::tempdir().unwrap();
        let id = DeviceId::new([3; 32]);
        let token = RegistrationToken::random();

        let registry = FileDeviceRegistry::open(dir.path()).unwrap();
        registry.expect_passive_registration(id, token.clone()).unwrap();
        drop(registry);

        let registry = FileDeviceRegistry::open(dir.path()).unwrap();
        assert!(registry.is_registered(&id));
        assert_eq!(registry.take_passive_token(&id), Some(token));
        drop(registry);

        let registry = FileDeviceRegistry::open(dir.path()).unwrap();
        assert_eq!(registry.take_passive_token(&id), None);
        assert_eq!(registry.devices(), vec![id]);
    }
}
