//! SFTP transport for dirmirror, built on `russh` and `russh-sftp`.

mod ssh_client;
mod utils;

use crate::ssh_client::HostKeyCheck;
use crate::utils::{remote_exists, split_host_port, wire_path};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use dirmirror_core::{Connector, RemoteSession};
use russh::client::{AuthResult, Handle};
use russh::Disconnect;
use russh_sftp::client::SftpSession;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tracing::{debug, info};

// upper bound on a stalled server holding up a run
const INACTIVITY_TIMEOUT: Duration = Duration::from_secs(60);

fn client_config() -> russh::client::Config {
    russh::client::Config {
        inactivity_timeout: Some(INACTIVITY_TIMEOUT),
        ..Default::default()
    }
}

/// Opens password-authenticated SFTP sessions.
#[derive(Debug, Clone, Default)]
pub struct SftpConnector {
    allowed_fingerprints: Option<Vec<String>>,
}

impl SftpConnector {
    pub fn new(allowed_fingerprints: Option<Vec<String>>) -> Self {
        Self { allowed_fingerprints }
    }
}

#[async_trait]
impl Connector for SftpConnector {
    async fn connect(&self, host: &str, login: &str, secret: &str) -> Result<Box<dyn RemoteSession>> {
        let remote = SftpRemote::connect(host, login, secret, self.allowed_fingerprints.clone()).await?;
        Ok(Box::new(remote))
    }
}

pub struct SftpRemote {
    ssh: Handle<HostKeyCheck>,
    sftp: SftpSession,
}

impl SftpRemote {
    pub async fn connect(
        host_with_port: &str,
        user: &str,
        password: &str,
        allowed_fingerprints: Option<Vec<String>>,
    ) -> Result<Self> {
        let (host, port) = split_host_port(host_with_port)?;
        let handler = HostKeyCheck {
            host: host.clone(),
            allowed_fingerprints,
        };

        let mut ssh = russh::client::connect(Arc::new(client_config()), (host.as_str(), port), handler)
            .await
            .with_context(|| format!("cannot reach {host}:{port}"))?;
        let res = ssh.authenticate_password(user, password).await?;
        if let AuthResult::Failure {
            remaining_methods,
            partial_success,
        } = res
        {
            return Err(anyhow!(
                "authentication failed for {user}@{host}, remaining_methods: {:?}, partial_success: {}",
                remaining_methods,
                partial_success
            ));
        }
        let channel = ssh.channel_open_session().await?;
        channel.request_subsystem(true, "sftp").await?;
        let sftp = SftpSession::new(channel.into_stream()).await?;
        info!("connected to {user}@{host}:{port}");
        Ok(Self { ssh, sftp })
    }
}

#[async_trait]
impl RemoteSession for SftpRemote {
    async fn upload_file(&self, reader: &mut (dyn AsyncRead + Unpin + Send), remote: &str) -> Result<u64> {
        let mut remote_file = self
            .sftp
            .create(remote)
            .await
            .with_context(|| format!("cannot open {remote} for writing"))?;
        let written = tokio::io::copy(reader, &mut remote_file).await?;
        remote_file.shutdown().await?;
        debug!("wrote {written} bytes to {remote}");
        Ok(written)
    }

    async fn exists(&self, remote: &str) -> Result<bool> {
        Ok(remote_exists(&self.sftp, remote).await?)
    }

    async fn create_dir(&self, remote: &str) -> Result<()> {
        self.sftp
            .create_dir(wire_path(remote))
            .await
            .with_context(|| format!("cannot create directory {remote}"))
    }

    async fn disconnect(self: Box<Self>) -> Result<()> {
        let SftpRemote { ssh, sftp } = *self;
        drop(sftp);
        ssh.disconnect(Disconnect::ByApplication, "", "en").await?;
        debug!("session closed");
        Ok(())
    }
}
