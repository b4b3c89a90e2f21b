use crate::{
    config::SyncProfile,
    error::SyncError,
    mirror::{mirror_dir, MirrorReport},
    remote::Connector,
    watcher::{ChangeWatcher, TriggerSource},
};
use chrono::{DateTime, Local};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

const COMMAND_QUEUE: usize = 16;

#[derive(Debug, Clone)]
pub enum Command {
    Sync(TriggerSource),
    Stop,
}

/// Latest outcome, shown to the user as a single status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatus {
    Idle,
    InProgress,
    Completed,
    Failed(String),
    ConfigurationIncomplete(Vec<&'static str>),
}

impl SyncStatus {
    pub fn is_finished(&self) -> bool {
        !matches!(self, SyncStatus::Idle | SyncStatus::InProgress)
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncStatus::Idle => f.write_str("Idle."),
            SyncStatus::InProgress => f.write_str("Sync in progress..."),
            SyncStatus::Completed => f.write_str("Sync completed successfully."),
            SyncStatus::Failed(detail) => write!(f, "Error while syncing data: {detail}"),
            SyncStatus::ConfigurationIncomplete(missing) => write!(
                f,
                "Please enter all required information (missing: {}).",
                missing.join(", ")
            ),
        }
    }
}

impl From<&SyncError> for SyncStatus {
    fn from(err: &SyncError) -> Self {
        match err {
            SyncError::ConfigurationIncomplete { missing } => SyncStatus::ConfigurationIncomplete(missing.clone()),
            other => SyncStatus::Failed(other.to_string()),
        }
    }
}

/// One mirror attempt, kept only until its outcome is reported.
#[derive(Debug)]
pub struct SyncRun {
    pub source: TriggerSource,
    pub started_at: DateTime<Local>,
    clock: Instant,
}

impl SyncRun {
    fn start(source: TriggerSource) -> Self {
        Self {
            source,
            started_at: Local::now(),
            clock: Instant::now(),
        }
    }
}

fn require_complete(profile: Option<&SyncProfile>) -> Result<&SyncProfile, SyncError> {
    let profile = profile.ok_or_else(|| SyncError::ConfigurationIncomplete {
        missing: SyncProfile::FIELD_NAMES.to_vec(),
    })?;
    profile.validate()?;
    Ok(profile)
}

/// Validate `profile`, open a session, mirror the local root and close the
/// session again. The session is disconnected exactly once whether or not the
/// walk succeeds; no connection is attempted for an incomplete profile.
pub async fn sync_once<C>(connector: &C, profile: Option<&SyncProfile>) -> Result<MirrorReport, SyncError>
where
    C: Connector + ?Sized,
{
    let profile = require_complete(profile)?;

    let session = connector
        .connect(&profile.host, &profile.login, &profile.secret)
        .await
        .map_err(SyncError::ConnectionFailure)?;
    let result = mirror_dir(session.as_ref(), &profile.local_root, &profile.remote_root).await;
    if let Err(e) = session.disconnect().await {
        warn!("disconnect from {} failed: {e:#}", profile.host);
    }
    result
}

/// Handle to a running coordinator. Dropping it shuts the coordinator down
/// once any in-flight run has finished.
#[derive(Debug)]
pub struct CoordinatorHandle {
    cmd_tx: mpsc::Sender<Command>,
    profile_tx: watch::Sender<Option<Arc<SyncProfile>>>,
    status_rx: watch::Receiver<SyncStatus>,
    join: JoinHandle<()>,
}

impl CoordinatorHandle {
    /// Ask for a manual run. Returns `false` only when the coordinator is gone;
    /// a full queue already guarantees a pending re-run.
    pub fn request_sync(&self) -> bool {
        !matches!(
            self.cmd_tx.try_send(Command::Sync(TriggerSource::Manual)),
            Err(mpsc::error::TrySendError::Closed(_))
        )
    }

    /// Replace the profile. Runs already in flight keep their snapshot; the
    /// watcher moves if the local root changed.
    pub fn update_profile(&self, profile: SyncProfile) {
        self.profile_tx.send_replace(Some(Arc::new(profile)));
    }

    pub fn profile(&self) -> Option<Arc<SyncProfile>> {
        self.profile_tx.borrow().clone()
    }

    pub fn status(&self) -> SyncStatus {
        self.status_rx.borrow().clone()
    }

    /// Status updates, safe to observe from any thread.
    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.status_rx.clone()
    }

    /// Stop after the current run, if any, and wait for the task to end.
    pub async fn shutdown(self) {
        let _ = self.cmd_tx.send(Command::Stop).await;
        let _ = self.join.await;
    }
}

struct Coordinator<C> {
    connector: C,
    profile_rx: watch::Receiver<Option<Arc<SyncProfile>>>,
    status_tx: watch::Sender<SyncStatus>,
    // handed to the watcher so filesystem events land in the same queue
    cmd_tx: mpsc::Sender<Command>,
    watcher: Option<ChangeWatcher>,
}

impl<C: Connector> Coordinator<C> {
    async fn run(mut self, mut cmd_rx: mpsc::Receiver<Command>) {
        self.rearm();
        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    let Some(Command::Sync(source)) = cmd else { break };
                    if !self.serve(source, &mut cmd_rx).await {
                        break;
                    }
                }
                changed = self.profile_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    self.rearm();
                }
            }
        }
        self.watcher = None;
        self.status_tx.send_replace(SyncStatus::Idle);
    }

    /// Run once for `source`, then once more if anything queued up meanwhile.
    /// Returns `false` when a stop was requested.
    async fn serve(&mut self, source: TriggerSource, cmd_rx: &mut mpsc::Receiver<Command>) -> bool {
        let mut next = Some(source);
        while let Some(source) = next.take() {
            self.run_once(source).await;
            loop {
                match cmd_rx.try_recv() {
                    Ok(Command::Sync(queued)) => {
                        next.get_or_insert(queued);
                    }
                    Ok(Command::Stop) | Err(mpsc::error::TryRecvError::Disconnected) => return false,
                    Err(mpsc::error::TryRecvError::Empty) => break,
                }
            }
        }
        true
    }

    async fn run_once(&mut self, source: TriggerSource) {
        let profile = self.profile_rx.borrow().clone();
        let run = SyncRun::start(source);

        if let Err(e) = require_complete(profile.as_deref()) {
            warn!("{source:?} sync refused: {e}");
            self.status_tx.send_replace(SyncStatus::from(&e));
            return;
        }

        info!("{:?} sync started at {}", run.source, run.started_at.format("%H:%M:%S"));
        self.status_tx.send_replace(SyncStatus::InProgress);
        let status = match sync_once(&self.connector, profile.as_deref()).await {
            Ok(_) => SyncStatus::Completed,
            Err(e) => {
                warn!("sync failed: {e}");
                SyncStatus::from(&e)
            }
        };
        info!("{:?} sync finished in {:?}: {status}", run.source, run.clock.elapsed());
        self.status_tx.send_replace(status);
    }

    /// Point the watcher at the current local root, leaving it alone if the
    /// root did not move.
    fn rearm(&mut self) {
        let root = self.profile_rx.borrow().as_ref().map(|p| p.local_root.clone());
        if let (Some(w), Some(root)) = (&self.watcher, &root) {
            if w.root() == root.as_path() {
                return;
            }
        }
        self.watcher = None;
        let Some(root) = root else {
            warn!("no local path configured, change watching disabled");
            return;
        };
        match ChangeWatcher::arm(&root, self.cmd_tx.clone(), Command::Sync(TriggerSource::FsEvent)) {
            Ok(w) => self.watcher = Some(w),
            Err(e) => warn!("{e}, change watching disabled"),
        }
    }
}

/// Start the coordinator task. Must be called inside a tokio runtime.
pub fn spawn_coordinator<C: Connector>(connector: C, profile: Option<SyncProfile>) -> CoordinatorHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_QUEUE);
    let (profile_tx, profile_rx) = watch::channel(profile.map(Arc::new));
    let (status_tx, status_rx) = watch::channel(SyncStatus::Idle);
    let coordinator = Coordinator {
        connector,
        profile_rx,
        status_tx,
        cmd_tx: cmd_tx.clone(),
        watcher: None,
    };
    let join = tokio::spawn(coordinator.run(cmd_rx));
    CoordinatorHandle {
        cmd_tx,
        profile_tx,
        status_rx,
        join,
    }
}
