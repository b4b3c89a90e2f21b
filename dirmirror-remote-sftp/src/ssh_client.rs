use russh::client::Handler;
use russh::keys::{HashAlg, PublicKey, PublicKeyBase64};
use tracing::{info, warn};

/// SSH client callbacks; only the server key check matters here.
pub(crate) struct HostKeyCheck {
    pub host: String,
    pub allowed_fingerprints: Option<Vec<String>>, // OpenSSH SHA256 or raw base64 keys
}

pub(crate) fn key_allowed(allowed: &[String], fingerprint: &str, key_b64: &str) -> bool {
    allowed.iter().any(|s| s == fingerprint || s == key_b64)
}

impl Handler for HostKeyCheck {
    type Error = anyhow::Error;

    async fn check_server_key(&mut self, server_public_key: &PublicKey) -> Result<bool, Self::Error> {
        let fingerprint = server_public_key.fingerprint(HashAlg::Sha256).to_string();
        match &self.allowed_fingerprints {
            Some(allowed) => {
                let ok = key_allowed(allowed, &fingerprint, &server_public_key.public_key_base64());
                if !ok {
                    warn!("{} presented unknown host key {fingerprint}", self.host);
                }
                Ok(ok)
            }
            None => {
                info!("{} host key {fingerprint} accepted (no fingerprint list)", self.host);
                Ok(true)
            }
        }
    }
}
