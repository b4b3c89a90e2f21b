use std::path::PathBuf;

/// Failure of a single sync run. Every variant is turned into status text by
/// the coordinator; none of them escape the run.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("missing required settings: {}", .missing.join(", "))]
    ConfigurationIncomplete { missing: Vec<&'static str> },

    #[error("connection failed: {0:#}")]
    ConnectionFailure(anyhow::Error),

    #[error("transfer of {path} failed: {error:#}")]
    TransferFailure { path: String, error: anyhow::Error },

    #[error("cannot watch local directory: {0}")]
    WatcherMisconfigured(String),
}

impl SyncError {
    pub(crate) fn transfer(path: impl Into<String>, error: impl Into<anyhow::Error>) -> Self {
        Self::TransferFailure {
            path: path.into(),
            error: error.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("settings file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("OS keyring unavailable: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("stored settings key is malformed")]
    MalformedKey,

    #[error("settings could not be decrypted for this user")]
    Decrypt,

    #[error("settings encryption failed")]
    Encrypt,

    #[error("field `{0}` must not contain ';'")]
    InvalidField(&'static str),
}
