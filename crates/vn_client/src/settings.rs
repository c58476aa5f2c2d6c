//! Client settings, stored as JSON in the data directory.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use vn_crypto::keys::DEFAULT_MODULUS_BITS;
use vn_proto::{AutoDeleteMode, SendPolicy};
use vn_store::sweeper::DEFAULT_BATCH_SIZE;

use crate::error::ClientError;

pub const DB_ENV: &str = "VANISH_DB";
pub const AUTO_DELETE_ENV: &str = "VANISH_AUTO_DELETE";
pub const SEND_POLICY_ENV: &str = "VANISH_SEND_POLICY";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendPolicySetting {
    #[default]
    Strict,
    /// Fall back to a receiver-only legacy ciphertext when the hybrid
    /// envelope cannot be built.
    LegacyFallback,
}

impl SendPolicySetting {
    pub fn for_receiver(self, receiver_id: &str) -> SendPolicy {
        match self {
            SendPolicySetting::Strict => SendPolicy::Strict,
            SendPolicySetting::LegacyFallback => {
                SendPolicy::LegacyFallback { recipient_id: receiver_id.to_string() }
            }
        }
    }
}

impl std::str::FromStr for SendPolicySetting {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "strict" => Ok(SendPolicySetting::Strict),
            "legacy_fallback" => Ok(SendPolicySetting::LegacyFallback),
            other => Err(ClientError::Config(format!("unknown send policy {other:?}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSettings {
    /// Mode applied to new messages when the sender does not pick one.
    #[serde(default)]
    pub auto_delete: AutoDeleteMode,
    #[serde(default)]
    pub send_policy: SendPolicySetting,
    pub modulus_bits: usize,
    pub sweep_interval_secs: u64,
    pub sweep_batch_size: usize,
    /// Overrides `<data_dir>/vanish.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<PathBuf>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            auto_delete: AutoDeleteMode::None,
            send_policy: SendPolicySetting::Strict,
            modulus_bits: DEFAULT_MODULUS_BITS,
            sweep_interval_secs: 60,
            sweep_batch_size: DEFAULT_BATCH_SIZE,
            db_path: None,
        }
    }
}

impl ClientSettings {
    /// Read settings from `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ClientError> {
        match std::fs::read(path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ClientError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }

    /// Apply `VANISH_DB`, `VANISH_AUTO_DELETE` and `VANISH_SEND_POLICY`.
    pub fn with_env(self) -> Result<Self, ClientError> {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ClientError> {
        if let Some(db) = lookup(DB_ENV) {
            self.db_path = Some(PathBuf::from(db));
        }
        if let Some(mode) = lookup(AUTO_DELETE_ENV) {
            self.auto_delete = mode.parse()?;
        }
        if let Some(policy) = lookup(SEND_POLICY_ENV) {
            self.send_policy = policy.parse()?;
        }
        Ok(self)
    }

    pub fn db_path(&self, data_dir: &Path) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| crate::paths::default_db_path(data_dir))
    }
}
