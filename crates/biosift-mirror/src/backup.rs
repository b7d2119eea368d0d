//! Dated backups of the mirror's output directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;

use crate::{MirrorError, COLLECTION_FILES};

/// Copies the mirrored collection files into a dated archive directory.
///
/// One archive per calendar day (UTC): re-running on the same day
/// replaces that day's archive, so with no intervening flush a rerun
/// reproduces identical contents. The manager reads only the mirror's
/// files, never the live store. Runs are serialized by an internal lock,
/// so a scheduled run and an on-demand run that overlap cannot tear down
/// each other's staging area.
#[derive(Clone)]
pub struct BackupManager {
    data_dir: PathBuf,
    backup_root: PathBuf,
    run_lock: Arc<tokio::sync::Mutex<()>>,
}

impl BackupManager {
    pub fn new(data_dir: impl Into<PathBuf>, backup_root: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            backup_root: backup_root.into(),
            run_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Run a backup for today. Returns the archive directory.
    pub async fn run_backup(&self) -> Result<PathBuf, MirrorError> {
        let _guard = self.run_lock.lock().await;
        let archive_dir = self.backup_root.join(Utc::now().format("%Y-%m-%d").to_string());

        // Stage into a temp sibling and rename, so a crash mid-copy never
        // leaves a half-filled dated directory.
        let staging = self.backup_root.join(".staging");
        if tokio::fs::try_exists(&staging).await? {
            tokio::fs::remove_dir_all(&staging).await?;
        }
        tokio::fs::create_dir_all(&staging).await?;

        let mut copied = 0u32;
        for file in COLLECTION_FILES {
            let src = self.data_dir.join(file);
            if copy_if_present(&src, &staging.join(file)).await? {
                copied += 1;
            }
        }

        if tokio::fs::try_exists(&archive_dir).await? {
            tokio::fs::remove_dir_all(&archive_dir).await?;
        }
        tokio::fs::rename(&staging, &archive_dir).await?;
        tracing::info!(archive = %archive_dir.display(), copied, "backup complete");
        Ok(archive_dir)
    }
}

async fn copy_if_present(src: &Path, dst: &Path) -> Result<bool, MirrorError> {
    match tokio::fs::copy(src, dst).await {
        Ok(_) => Ok(true),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err.into()),
    }
}

/// Spawn a background task that runs a backup on a fixed interval. Each
/// run refreshes the current UTC day's archive; past days are never
/// touched.
pub fn spawn_backup_schedule(manager: BackupManager, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            if let Err(err) = manager.run_backup().await {
                tracing::error!(error = %err, "scheduled backup failed");
            }
        }
    })
}
