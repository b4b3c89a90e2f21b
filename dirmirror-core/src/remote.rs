use anyhow::Result;
use async_trait::async_trait;
use tokio::io::AsyncRead;

/// Opens authenticated sessions to the remote host.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, host: &str, login: &str, secret: &str) -> Result<Box<dyn RemoteSession>>;
}

/// One authenticated session, private to a single mirror run.
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// Stream `reader` to `remote`, creating or truncating the remote file.
    async fn upload_file(&self, reader: &mut (dyn AsyncRead + Unpin + Send), remote: &str) -> Result<u64>;
    async fn exists(&self, remote: &str) -> Result<bool>;
    async fn create_dir(&self, remote: &str) -> Result<()>;
    async fn disconnect(self: Box<Self>) -> Result<()>;
}
