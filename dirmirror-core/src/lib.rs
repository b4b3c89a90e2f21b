//! Core library for dirmirror – one-way local → remote directory mirroring.

mod config;
mod coordinator;
mod error;
mod mirror;
mod remote;
mod storage;
mod utils;
mod watcher;

#[cfg(test)]
mod testing;

pub use config::{AppConfig, SyncProfile};
pub use coordinator::{spawn_coordinator, sync_once, Command, CoordinatorHandle, SyncRun, SyncStatus};
pub use error::{StoreError, SyncError};
pub use mirror::{mirror_dir, MirrorReport};
pub use remote::{Connector, RemoteSession};
pub use storage::{default_settings_path, ConfigStore, Key, KeySource, KeyringKeySource, StaticKey};
pub use utils::{remote_dir, remote_file, remote_subdir};
pub use watcher::{is_qualifying, ChangeWatcher, TriggerSource};
