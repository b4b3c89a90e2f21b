//! In-memory transport used by the unit tests.

use crate::remote::{Connector, RemoteSession};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::Semaphore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Connect(String, String),
    Upload(String),
    Exists(String),
    CreateDir(String),
    Disconnect,
}

#[derive(Default)]
struct State {
    files: BTreeMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
    calls: Vec<Call>,
    fail_upload: Option<String>,
    fail_connect: bool,
    open_sessions: usize,
    max_open_sessions: usize,
    connects: usize,
    disconnects: usize,
}

/// Shared fake remote host. Cloning shares the state.
#[derive(Clone, Default)]
pub struct MockRemote {
    state: Arc<Mutex<State>>,
    // when set, every upload waits for a permit
    gate: Option<Arc<Semaphore>>,
}

impl MockRemote {
    pub fn with_dirs(dirs: &[&str]) -> Self {
        let remote = Self::default();
        remote.state().dirs.extend(dirs.iter().map(|d| d.to_string()));
        remote
    }

    pub fn gated(mut self) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        self.gate = Some(gate.clone());
        (self, gate)
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn session(&self) -> MockSession {
        MockSession { remote: self.clone() }
    }

    pub fn put_file(&self, path: &str, data: &[u8]) {
        self.state().files.insert(path.to_string(), data.to_vec());
    }

    pub fn fail_upload(&self, path: &str) {
        self.state().fail_upload = Some(path.to_string());
    }

    pub fn fail_connect(&self) {
        self.state().fail_connect = true;
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.state().files.get(path).cloned()
    }

    pub fn has_dir(&self, path: &str) -> bool {
        self.state().dirs.contains(path)
    }

    pub fn snapshot(&self) -> (BTreeMap<String, Vec<u8>>, BTreeSet<String>) {
        let s = self.state();
        (s.files.clone(), s.dirs.clone())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn connects(&self) -> usize {
        self.state().connects
    }

    pub fn disconnects(&self) -> usize {
        self.state().disconnects
    }

    pub fn max_open_sessions(&self) -> usize {
        self.state().max_open_sessions
    }
}

#[async_trait]
impl Connector for MockRemote {
    async fn connect(&self, host: &str, login: &str, _secret: &str) -> Result<Box<dyn RemoteSession>> {
        let mut s = self.state();
        s.calls.push(Call::Connect(host.to_string(), login.to_string()));
        if s.fail_connect {
            return Err(anyhow!("authentication failed"));
        }
        s.connects += 1;
        s.open_sessions += 1;
        s.max_open_sessions = s.max_open_sessions.max(s.open_sessions);
        drop(s);
        Ok(Box::new(self.session()))
    }
}

pub struct MockSession {
    remote: MockRemote,
}

#[async_trait]
impl RemoteSession for MockSession {
    async fn upload_file(&self, reader: &mut (dyn AsyncRead + Unpin + Send), remote: &str) -> Result<u64> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data).await?;
        if let Some(gate) = &self.remote.gate {
            gate.acquire().await?.forget();
        }
        let mut s = self.remote.state();
        s.calls.push(Call::Upload(remote.to_string()));
        if s.fail_upload.as_deref() == Some(remote) {
            return Err(anyhow!("permission denied"));
        }
        let len = data.len() as u64;
        s.files.insert(remote.to_string(), data);
        Ok(len)
    }

    async fn exists(&self, remote: &str) -> Result<bool> {
        let mut s = self.remote.state();
        s.calls.push(Call::Exists(remote.to_string()));
        Ok(s.dirs.contains(remote) || s.files.contains_key(remote))
    }

    async fn create_dir(&self, remote: &str) -> Result<()> {
        let mut s = self.remote.state();
        s.calls.push(Call::CreateDir(remote.to_string()));
        s.dirs.insert(remote.to_string());
        Ok(())
    }

    async fn disconnect(self: Box<Self>) -> Result<()> {
        let mut s = self.remote.state();
        s.calls.push(Call::Disconnect);
        s.disconnects += 1;
        s.open_sessions = s.open_sessions.saturating_sub(1);
        Ok(())
    }
}
