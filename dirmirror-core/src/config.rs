use crate::error::SyncError;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Connection and path settings for one mirror. Replaced wholesale on save,
/// never mutated while a run holds it.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SyncProfile {
    pub host: String,
    pub login: String,
    pub secret: String,
    pub remote_root: String,
    pub local_root: PathBuf,
}

impl SyncProfile {
    pub const FIELD_NAMES: [&'static str; 5] = ["host", "login", "secret", "remote path", "local path"];

    /// Names of the required fields that are empty.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let values = [
            self.host.is_empty(),
            self.login.is_empty(),
            self.secret.is_empty(),
            self.remote_root.is_empty(),
            self.local_root.as_os_str().is_empty(),
        ];
        Self::FIELD_NAMES
            .iter()
            .zip(values)
            .filter_map(|(name, empty)| empty.then_some(*name))
            .collect()
    }

    pub fn validate(&self) -> Result<(), SyncError> {
        let missing = self.missing_fields();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(SyncError::ConfigurationIncomplete { missing })
        }
    }
}

impl fmt::Debug for SyncProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncProfile")
            .field("host", &self.host)
            .field("login", &self.login)
            .field("secret", &"***")
            .field("remote_root", &self.remote_root)
            .field("local_root", &self.local_root)
            .finish()
    }
}

/// Process-level settings read from an optional YAML/JSON file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Where the encrypted profile lives. Defaults to the user config dir.
    pub settings_path: Option<PathBuf>,
    /// Accepted server keys, OpenSSH SHA256 fingerprints or base64 keys.
    pub host_fingerprints: Option<Vec<String>>,
    /// Base64 AES-256 key for the settings file. When unset the key is kept
    /// in the OS keyring.
    pub settings_key: Option<String>,
    /// tracing filter directive, e.g. `info` or `dirmirror_core=debug`.
    pub log: Option<String>,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("read config {} failed: {e}", path.display()))?;
        let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("");
        let cfg = match ext {
            "json" => serde_json::from_str(&text)?,
            _ => serde_yaml::from_str(&text)?,
        };
        Ok(cfg)
    }

    pub fn log_filter(&self) -> &str {
        self.log.as_deref().unwrap_or("info")
    }
}
