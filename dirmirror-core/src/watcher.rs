use crate::error::SyncError;
use notify::event::ModifyKind;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// What asked for a mirror run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSource {
    Manual,
    FsEvent,
}

/// Whether a notify event should cause a sync. Reads and metadata-only
/// changes do not.
pub fn is_qualifying(kind: &EventKind) -> bool {
    match kind {
        EventKind::Create(_) | EventKind::Remove(_) => true,
        EventKind::Modify(ModifyKind::Metadata(_)) => false,
        EventKind::Modify(_) => true,
        _ => false,
    }
}

/// Recursive watch over the local root. Dropping it stops the watch.
pub struct ChangeWatcher {
    root: PathBuf,
    _inner: RecommendedWatcher,
}

impl ChangeWatcher {
    /// Start watching `root`; each qualifying event pushes one trigger into
    /// `tx` without blocking. A full channel means a run is already pending.
    pub fn arm<T>(root: &Path, tx: mpsc::Sender<T>, trigger: T) -> Result<Self, SyncError>
    where
        T: Clone + Send + 'static,
    {
        if root.as_os_str().is_empty() {
            return Err(SyncError::WatcherMisconfigured("local path is not set".into()));
        }
        if !root.is_dir() {
            return Err(SyncError::WatcherMisconfigured(format!(
                "{} is not a directory",
                root.display()
            )));
        }

        let mut inner = RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| match res {
                Ok(event) if is_qualifying(&event.kind) => {
                    debug!("change detected: {:?} {:?}", event.kind, event.paths);
                    if let Err(mpsc::error::TrySendError::Closed(_)) = tx.try_send(trigger.clone()) {
                        debug!("trigger channel closed, dropping event");
                    }
                }
                Ok(_) => {}
                Err(e) => warn!("watch error: {e}"),
            },
            notify::Config::default(),
        )
        .map_err(|e| SyncError::WatcherMisconfigured(e.to_string()))?;
        inner
            .watch(root, RecursiveMode::Recursive)
            .map_err(|e| SyncError::WatcherMisconfigured(e.to_string()))?;
        info!("watching {}", root.display());

        Ok(Self {
            root: root.to_path_buf(),
            _inner: inner,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, DataChange, MetadataKind, RemoveKind, RenameMode};
    use rstest::rstest;
    use std::time::Duration;

    #[rstest]
    #[case(EventKind::Create(CreateKind::File), true)]
    #[case(EventKind::Create(CreateKind::Folder), true)]
    #[case(EventKind::Modify(ModifyKind::Data(DataChange::Content)), true)]
    #[case(EventKind::Modify(ModifyKind::Name(RenameMode::Both)), true)]
    #[case(EventKind::Modify(ModifyKind::Any), true)]
    #[case(EventKind::Remove(RemoveKind::File), true)]
    #[case(EventKind::Modify(ModifyKind::Metadata(MetadataKind::AccessTime)), false)]
    #[case(EventKind::Access(AccessKind::Read), false)]
    #[case(EventKind::Other, false)]
    fn event_filter(#[case] kind: EventKind, #[case] expected: bool) {
        assert_eq!(is_qualifying(&kind), expected);
    }

    #[test]
    fn empty_root_is_rejected() {
        let (tx, _rx) = mpsc::channel(1);
        let err = ChangeWatcher::arm(Path::new(""), tx, TriggerSource::FsEvent).err();
        assert!(matches!(err, Some(SyncError::WatcherMisconfigured(_))));
    }

    #[test]
    fn missing_root_is_rejected() {
        let (tx, _rx) = mpsc::channel(1);
        let err = ChangeWatcher::arm(Path::new("/no/such/dir"), tx, TriggerSource::FsEvent).err();
        assert!(matches!(err, Some(SyncError::WatcherMisconfigured(_))));
    }

    #[tokio::test]
    async fn nested_change_emits_trigger() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        let (tx, mut rx) = mpsc::channel(8);
        let watcher = ChangeWatcher::arm(dir.path(), tx, TriggerSource::FsEvent).unwrap();
        assert_eq!(watcher.root(), dir.path());

        std::fs::write(dir.path().join("nested/new.txt"), b"x").unwrap();

        let got = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
        assert_eq!(got, Some(TriggerSource::FsEvent));
    }
}
