use std::path::{Path, PathBuf};

use directories::ProjectDirs;

use crate::error::ClientError;

pub const APP_QUALIFIER: &str = "com";
pub const APP_ORG: &str = "vanish";
pub const APP_NAME: &str = "vanish";

pub const DATA_DIR_ENV: &str = "VANISH_DATA_DIR";

/// `$VANISH_DATA_DIR`, else the platform data directory.
pub fn data_dir() -> Result<PathBuf, ClientError> {
    if let Ok(override_path) = std::env::var(DATA_DIR_ENV) {
        return Ok(PathBuf::from(override_path));
    }
    let dirs = ProjectDirs::from(APP_QUALIFIER, APP_ORG, APP_NAME)
        .ok_or_else(|| ClientError::Config("cannot determine data directory".into()))?;
    Ok(dirs.data_dir().to_path_buf())
}

pub fn settings_path(data_dir: &Path) -> PathBuf {
    data_dir.join("settings.json")
}

pub fn default_db_path(data_dir: &Path) -> PathBuf {
    data_dir.join("vanish.db")
}

pub fn keys_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("keys")
}

pub fn blobs_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("blobs")
}
