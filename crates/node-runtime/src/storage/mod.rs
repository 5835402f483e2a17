//! # Persistence
//!
//! Everything a device must remember across restarts lives under
//! `storage.data_dir`:
//!
//! | File | Content | Roles |
//! |------|---------|-------|
//! | `device.key` | hex Ed25519 seed | all |
//! | `trust.json` | master id and pinned certificate | client |
//! | `registry.json` | admitted devices, pending tokens | master |
//!
//! Files are rewritten through a uniquely named temporary file in the same
//! directory and a rename, so a crash leaves either the old or the new state
//! and concurrent writers never share a temporary file.

pub mod keys;
pub mod registry;
pub mod trust;

pub use keys::{load_or_create_keys, KEY_FILE};
pub use registry::{FileDeviceRegistry, REGISTRY_FILE};
pub use trust::{FileTrustStore, TRUST_FILE};

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;

/// Persistence errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt state file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Corrupt key file {path}: {reason}")]
    InvalidKey { path: PathBuf, reason: String },
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
    move |source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Read a JSON state file, or `T::default()` if it does not exist yet.
pub(crate) fn load_json<T>(path: &Path) -> Result<T, StorageError>
where
    T: DeserializeOwned + Default,
{
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(T::default()),
        Err(e) => return Err(io_error(path)(e)),
    };
    serde_json::from_str(&text).map_err(|source| StorageError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Replace a JSON state file.
pub(crate) fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    let text = serde_json::to_string_pretty(value).map_err(|source| StorageError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    write_replacing(path, text.as_bytes())
}

pub(crate) fn write_replacing(path: &Path, data: &[u8]) -> Result<(), StorageError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(io_error(parent))?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(io_error(parent))?;
    let tmp_path = tmp.path().to_path_buf();
    tmp.write_all(data).map_err(io_error(&tmp_path))?;
    tmp.as_file().sync_all().map_err(io_error(&tmp_path))?;
    tmp.persist(path).map_err(|e| io_error(path)(e.error))?;
    Ok(())
}
