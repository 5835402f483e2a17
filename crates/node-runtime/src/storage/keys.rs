//! Device key persistence.

use super::{io_error, write_replacing, StorageError};
use shared_crypto::DeviceKeys;
use std::fs;
use std::path::Path;
use tracing::info;

/// Key file name inside the data directory.
pub const KEY_FILE: &str = "device.key";

/// Load the device keys from `data_dir`, generating and saving them on
/// first start.
///
/// The seed is stored, not the certificate, so renaming the device in the
/// configuration re-issues the certificate under the same keys. The device
/// id covers only the public keys and does not change.
pub fn load_or_create_keys(data_dir: &Path, name: &str) -> Result<DeviceKeys, StorageError> {
    let path = data_dir.join(KEY_FILE);
    match fs::read_to_string(&path) {
        Ok(text) => {
            let bytes = hex::decode(text.trim()).map_err(|e| StorageError::InvalidKey {
                path: path.clone(),
                reason: e.to_string(),
            })?;
            let seed: [u8; 32] = bytes.try_into().map_err(|b: Vec<u8>| StorageError::InvalidKey {
                path: path.clone(),
                reason: format!("expected 32 bytes, found {}", b.len()),
            })?;
            Ok(DeviceKeys::from_seed(name, seed))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let keys = DeviceKeys::generate(name);
            write_replacing(&path, hex::encode(keys.to_seed()).as_bytes())?;
            restrict_permissions(&path)?;
            info!(path = %path.display(), "Generated new device keys");
            Ok(keys)
        }
        Err(e) => Err(io_error(&path)(e)),
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<(), StorageError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(io_error(path))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<(), StorageError> {
    Ok(())
}
