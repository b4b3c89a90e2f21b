//! Encrypted, per-user persistence of the [`SyncProfile`].
//!
//! The record is `host;login;secret;remote;local` as UTF-8, sealed with
//! AES-256-GCM. The file holds the 12-byte nonce followed by the ciphertext.
//! The key lives in the OS keyring of the current user, so the file is only
//! readable by that account on that machine.

use crate::config::SyncProfile;
use crate::error::StoreError;
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use keyring::Entry;
use rand::RngCore;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const KEY_BYTES: usize = 32;
const NONCE_BYTES: usize = 12;
const FIELD_COUNT: usize = 5;
const KEYRING_SERVICE: &str = "dirmirror";
const KEYRING_ACCOUNT: &str = "settings-key";

pub type Key = [u8; KEY_BYTES];

/// Supplies the encryption key for the settings file.
pub trait KeySource: Send + Sync {
    /// The stored key, or `None` if none was ever created.
    fn existing_key(&self) -> Result<Option<Key>, StoreError>;
    /// Generate and persist a fresh key.
    fn create_key(&self) -> Result<Key, StoreError>;
}

/// Key kept base64-encoded in the OS keyring.
#[derive(Debug, Clone)]
pub struct KeyringKeySource {
    service: String,
    account: String,
}

impl Default for KeyringKeySource {
    fn default() -> Self {
        Self {
            service: KEYRING_SERVICE.to_string(),
            account: KEYRING_ACCOUNT.to_string(),
        }
    }
}

impl KeyringKeySource {
    fn entry(&self) -> Result<Entry, StoreError> {
        Ok(Entry::new(&self.service, &self.account)?)
    }
}

impl KeySource for KeyringKeySource {
    fn existing_key(&self) -> Result<Option<Key>, StoreError> {
        match self.entry()?.get_password() {
            Ok(encoded) => {
                let bytes = BASE64.decode(encoded).map_err(|_| StoreError::MalformedKey)?;
                let key: Key = bytes.try_into().map_err(|_| StoreError::MalformedKey)?;
                Ok(Some(key))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn create_key(&self) -> Result<Key, StoreError> {
        let key = random_bytes::<KEY_BYTES>();
        self.entry()?.set_password(&BASE64.encode(key))?;
        debug!("created settings key in OS keyring");
        Ok(key)
    }
}

impl<K: KeySource + ?Sized> KeySource for Box<K> {
    fn existing_key(&self) -> Result<Option<Key>, StoreError> {
        (**self).existing_key()
    }

    fn create_key(&self) -> Result<Key, StoreError> {
        (**self).create_key()
    }
}

/// Fixed key, for headless setups without a keyring. Selected through the
/// `settings_key` entry of the app config.
#[derive(Clone)]
pub struct StaticKey(pub Key);

impl StaticKey {
    /// Parse a base64-encoded 32-byte key.
    pub fn from_base64(encoded: &str) -> Result<Self, StoreError> {
        let bytes = BASE64.decode(encoded.trim()).map_err(|_| StoreError::MalformedKey)?;
        let key: Key = bytes.try_into().map_err(|_| StoreError::MalformedKey)?;
        Ok(Self(key))
    }
}

impl KeySource for StaticKey {
    fn existing_key(&self) -> Result<Option<Key>, StoreError> {
        Ok(Some(self.0))
    }

    fn create_key(&self) -> Result<Key, StoreError> {
        Ok(self.0)
    }
}

/// `<config dir>/dirmirror/settings.data`
pub fn default_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("dirmirror").join("settings.data"))
}

pub struct ConfigStore<K = KeyringKeySource> {
    path: PathBuf,
    keys: K,
}

impl<K: KeySource> ConfigStore<K> {
    pub fn new(path: impl Into<PathBuf>, keys: K) -> Self {
        Self {
            path: path.into(),
            keys,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the saved profile. A missing file, a missing key or a record
    /// without exactly five fields all mean "no settings".
    pub fn load(&self) -> Result<Option<SyncProfile>, StoreError> {
        let blob = match fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        let Some(key) = self.keys.existing_key()? else {
            warn!("settings file exists but no key is stored, ignoring it");
            return Ok(None);
        };
        let plain = open(&key, &blob)?;
        let text = String::from_utf8(plain).map_err(|_| StoreError::Decrypt)?;
        let profile = decode_record(&text);
        if profile.is_none() {
            warn!("settings record in {} is malformed, ignoring it", self.path.display());
        }
        Ok(profile)
    }

    pub fn save(&self, profile: &SyncProfile) -> Result<(), StoreError> {
        let record = encode_record(profile)?;
        let key = match self.keys.existing_key()? {
            Some(k) => k,
            None => self.keys.create_key()?,
        };
        let blob = seal(&key, record.as_bytes())?;

        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, blob).map_err(io_err)?;
        fs::rename(&tmp, &self.path).map_err(io_err)?;
        debug!("settings saved to {}", self.path.display());
        Ok(())
    }
}

fn encode_record(profile: &SyncProfile) -> Result<String, StoreError> {
    let local = profile.local_root.to_string_lossy();
    let fields = [
        profile.host.as_str(),
        profile.login.as_str(),
        profile.secret.as_str(),
        profile.remote_root.as_str(),
        &*local,
    ];
    for (name, value) in SyncProfile::FIELD_NAMES.iter().zip(fields) {
        if value.contains(';') {
            return Err(StoreError::InvalidField(*name));
        }
    }
    Ok(fields.join(";"))
}

fn decode_record(text: &str) -> Option<SyncProfile> {
    let fields: Vec<&str> = text.split(';').collect();
    let [host, login, secret, remote_root, local_root]: [&str; FIELD_COUNT] = fields.try_into().ok()?;
    Some(SyncProfile {
        host: host.to_string(),
        login: login.to_string(),
        secret: secret.to_string(),
        remote_root: remote_root.to_string(),
        local_root: PathBuf::from(local_root),
    })
}

fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

fn seal(key: &Key, plaintext: &[u8]) -> Result<Vec<u8>, StoreError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| StoreError::Encrypt)?;
    let iv = random_bytes::<NONCE_BYTES>();
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&iv), plaintext)
        .map_err(|_| StoreError::Encrypt)?;
    let mut blob = iv.to_vec();
    blob.extend_from_slice(&ciphertext);
    Ok(blob)
}

fn open(key: &Key, blob: &[u8]) -> Result<Vec<u8>, StoreError> {
    if blob.len() < NONCE_BYTES {
        return Err(StoreError::Decrypt);
    }
    let (iv, ciphertext) = blob.split_at(NONCE_BYTES);
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| StoreError::Decrypt)?;
    cipher
        .decrypt(Nonce::from_slice(iv), ciphertext)
        .map_err(|_| StoreError::Decrypt)
}
