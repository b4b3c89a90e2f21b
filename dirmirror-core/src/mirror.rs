//! Recursive local → remote directory mirror.
//!
//! The walk is additive: remote entries with no local counterpart are left
//! alone, and every local file is uploaded on every run regardless of what
//! the remote already holds.

use crate::error::SyncError;
use crate::remote::RemoteSession;
use crate::utils::{remote_dir, remote_file, remote_subdir};
use anyhow::anyhow;
use std::cmp::Ordering;
use std::path::Path;
use tracing::{debug, info};
use walkdir::{DirEntry, WalkDir};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MirrorReport {
    pub files_uploaded: usize,
    pub bytes_uploaded: u64,
    pub dirs_created: usize,
}

// Files sort before directories, then by name.
fn files_first(a: &DirEntry, b: &DirEntry) -> Ordering {
    a.file_type()
        .is_dir()
        .cmp(&b.file_type().is_dir())
        .then_with(|| a.file_name().cmp(b.file_name()))
}

/// Mirror `local` onto `remote_root` through `session`.
///
/// Depth-first; at each level files are uploaded before descending into
/// subdirectories. A missing remote directory is created before anything is
/// written into it. The first local or remote error aborts the walk and
/// nothing already uploaded is rolled back.
pub async fn mirror_dir<S>(session: &S, local: &Path, remote_root: &str) -> Result<MirrorReport, SyncError>
where
    S: RemoteSession + ?Sized,
{
    let local_meta = tokio::fs::metadata(local)
        .await
        .map_err(|e| SyncError::transfer(local.display().to_string(), e))?;
    if !local_meta.is_dir() {
        return Err(SyncError::transfer(
            local.display().to_string(),
            anyhow!("not a directory"),
        ));
    }

    let mut report = MirrorReport::default();
    let root = remote_dir(remote_root);
    ensure_dir(session, &root, &mut report).await?;

    // remote directory for every ancestor of the current entry, indexed by depth
    let mut parents: Vec<String> = vec![root];
    let walker = WalkDir::new(local)
        .follow_links(true)
        .min_depth(1)
        .sort_by(files_first);

    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(local).display().to_string();
            SyncError::transfer(path, e)
        })?;
        parents.truncate(entry.depth());
        let parent = &parents[entry.depth() - 1];
        let name = entry.file_name().to_string_lossy();

        if entry.file_type().is_dir() {
            let remote = remote_subdir(parent, &name);
            ensure_dir(session, &remote, &mut report).await?;
            parents.push(remote);
        } else if entry.file_type().is_file() {
            let remote = remote_file(parent, &name);
            let mut file = tokio::fs::File::open(entry.path())
                .await
                .map_err(|e| SyncError::transfer(entry.path().display().to_string(), e))?;
            let bytes = session
                .upload_file(&mut file, &remote)
                .await
                .map_err(|e| SyncError::transfer(remote.clone(), e))?;
            debug!("uploaded {} -> {remote} ({bytes} bytes)", entry.path().display());
            report.files_uploaded += 1;
            report.bytes_uploaded += bytes;
        } else {
            debug!("skipping special file {}", entry.path().display());
        }
    }

    info!(
        "mirrored {} -> {}: {} files, {} bytes, {} new dirs",
        local.display(),
        parents[0],
        report.files_uploaded,
        report.bytes_uploaded,
        report.dirs_created
    );
    Ok(report)
}

async fn ensure_dir<S>(session: &S, remote: &str, report: &mut MirrorReport) -> Result<(), SyncError>
where
    S: RemoteSession + ?Sized,
{
    let exists = session
        .exists(remote)
        .await
        .map_err(|e| SyncError::transfer(remote, e))?;
    if !exists {
        session
            .create_dir(remote)
            .await
            .map_err(|e| SyncError::transfer(remote, e))?;
        report.dirs_created += 1;
    }
    Ok(())
}
