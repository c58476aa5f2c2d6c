//! Private key files: `<keys_dir>/<identity>.key`, base64 PKCS#8.

use std::path::{Path, PathBuf};

use vn_crypto::{KeyManager, PrivateKey};

use crate::error::ClientError;

fn key_path(keys_dir: &Path, identity_id: &str) -> Result<PathBuf, ClientError> {
    let valid = !identity_id.is_empty()
        && identity_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@'))
        && !identity_id.starts_with('.');
    if !valid {
        return Err(ClientError::InvalidRequest(format!("unusable identity id {identity_id:?}")));
    }
    Ok(keys_dir.join(format!("{identity_id}.key")))
}

pub fn save_private_key(keys_dir: &Path, identity_id: &str, key: &PrivateKey) -> Result<PathBuf, ClientError> {
    let path = key_path(keys_dir, identity_id)?;
    std::fs::create_dir_all(keys_dir)?;
    let encoded = KeyManager::export_private_key(key)?;
    std::fs::write(&path, encoded.as_bytes())?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
    }

    tracing::info!(identity = identity_id, path = %path.display(), "private key written");
    Ok(path)
}

/// `Ok(None)` when no key has been generated for `identity_id` yet.
pub fn load_private_key(keys_dir: &Path, identity_id: &str) -> Result<Option<PrivateKey>, ClientError> {
    let path = key_path(keys_dir, identity_id)?;
    let text = match std::fs::read_to_string(&path) {
        Ok(text) => zeroize::Zeroizing::new(text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(KeyManager::import_private_key(&text)?))
}
