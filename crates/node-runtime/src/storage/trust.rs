//! File-backed client trust store.

use super::{load_json, save_json, StorageError};
use parking_lot::Mutex;
use sh_02_handshake::adapters::TrustSnapshot;
use sh_02_handshake::{InMemoryTrustStore, TrustError, TrustStore};
use shared_bus::MasterResolver;
use shared_crypto::DeviceCertificate;
use shared_types::{Component, DeviceId};
use std::path::{Path, PathBuf};

/// Trust file name inside the data directory.
pub const TRUST_FILE: &str = "trust.json";

/// [`InMemoryTrustStore`] that writes its state to disk after every change.
/// Changes and saves are serialized, so the file always holds the latest state.
#[derive(Debug)]
pub struct FileTrustStore {
    path: PathBuf,
    inner: InMemoryTrustStore,
    write_lock: Mutex<()>,
}

impl FileTrustStore {
    /// Open the store in `data_dir`.
    pub fn open(data_dir: &Path) -> Result<Self, StorageError> {
        let path = data_dir.join(TRUST_FILE);
        let snapshot: TrustSnapshot = load_json(&path)?;
        Ok(Self {
            path,
            inner: InMemoryTrustStore::from_snapshot(snapshot),
            write_lock: Mutex::new(()),
        })
    }

    fn persist(&self) -> Result<(), TrustError> {
        save_json(&self.path, &self.inner.snapshot()).map_err(|e| TrustError::Storage(e.to_string()))
    }
}

impl MasterResolver for FileTrustStore {
    fn master_id(&self) -> Option<DeviceId> {
        self.inner.master_id()
    }
}

impl TrustStore for FileTrustStore {
    fn master_certificate(&self) -> Option<DeviceCertificate> {
        self.inner.master_certificate()
    }

    fn set_master_id(&self, id: DeviceId) -> Result<(), TrustError> {
        if self.inner.master_id() == Some(id) {
            return Ok(());
        }
        let _guard = self.write_lock.lock();
        self.inner.set_master_id(id)?;
        self.persist()
    }

    fn pin_master_certificate(&self, certificate: &DeviceCertificate) -> Result<(), TrustError> {
        if self.inner.master_certificate().as_ref() == Some(certificate) {
            return Ok(());
        }
        let _guard = self.write_lock.lock();
        self.inner.pin_master_certificate(certificate)?;
        self.persist()
    }
}

impl Component for FileTrustStore {}
