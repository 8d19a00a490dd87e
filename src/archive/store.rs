use std::cmp::Reverse;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::error::ArchiveError;
use super::{Archive, ArchiveOutcome, PruneReport};
use crate::timeline::TimelineEntry;

pub const BACKUP_DIR_NAME: &str = "timeline_backups";
pub const DEFAULT_MAX_BACKUPS: usize = 10;

const FILE_PREFIX: &str = "timeline-";
const FILE_SUFFIX: &str = ".json";

#[derive(Debug, Clone, Serialize)]
pub struct BackupFile {
    pub path: PathBuf,
    pub name: String,
    pub modified: SystemTime,
    pub size: u64,
}

/// Rotating on-disk store of timeline snapshots.
///
/// Each archival cycle writes one `timeline-<timestamp>.json` file holding a
/// JSON array of entries, then deletes everything but the newest
/// `max_backups` files. Files are written to a hidden temp name, synced, and
/// renamed into place, so a reader never sees a partial backup.
pub struct BackupStore {
    dir: PathBuf,
    max_backups: usize,
    /// Serializes persist/prune so name allocation and rotation don't race.
    io_lock: Mutex<()>,
}

impl BackupStore {
    /// Open the store, creating `dir` (and parents) if needed.
    pub fn open(dir: impl Into<PathBuf>, max_backups: usize) -> Result<Self, ArchiveError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| ArchiveError::Bootstrap {
            path: dir.clone(),
            source,
        })?;
        if max_backups == 0 {
            tracing::warn!(dir = %dir.display(), "max_backups of 0 would delete every backup, keeping 1");
        }
        tracing::debug!(dir = %dir.display(), max_backups, "opened timeline backup store");
        Ok(Self {
            dir,
            max_backups: max_backups.max(1),
            io_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn max_backups(&self) -> usize {
        self.max_backups
    }

    /// Write `entries` to a new backup file and return its path.
    pub async fn persist(&self, entries: &[TimelineEntry]) -> Result<PathBuf, ArchiveError> {
        let _guard = self.io_lock.lock().await;
        self.persist_locked(entries).await
    }

    /// Delete all but the newest `max_backups` backup files.
    pub async fn prune(&self) -> Result<PruneReport, ArchiveError> {
        let _guard = self.io_lock.lock().await;
        self.prune_locked().await
    }

    /// Backup files, newest first.
    pub async fn list_backups(&self) -> Result<Vec<BackupFile>, ArchiveError> {
        let mut dir = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| ArchiveError::io("list", &self.dir, e))?;

        let mut backups = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| ArchiveError::io("list", &self.dir, e))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !is_backup_name(&name) {
                continue;
            }
            let metadata = match entry.metadata().await {
                Ok(metadata) if metadata.is_file() => metadata,
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!(file = %name, error = %e, "skipping unreadable timeline backup");
                    continue;
                }
            };
            backups.push(BackupFile {
                path: entry.path(),
                modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                size: metadata.len(),
                name,
            });
        }

        // Newest first; names embed the timestamp, so they break mtime ties.
        backups.sort_by(|a, b| {
            (Reverse(a.modified), Reverse(&a.name)).cmp(&(Reverse(b.modified), Reverse(&b.name)))
        });
        Ok(backups)
    }

    /// Read a backup file back into entries.
    pub async fn load(&self, path: impl AsRef<Path>) -> Result<Vec<TimelineEntry>, ArchiveError> {
        let path = path.as_ref();
        let raw = tokio::fs::read(path)
            .await
            .map_err(|e| ArchiveError::io("read", path, e))?;
        Ok(serde_json::from_slice(&raw)?)
    }

    async fn persist_locked(&self, entries: &[TimelineEntry]) -> Result<PathBuf, ArchiveError> {
        let body = serde_json::to_vec_pretty(entries)?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| ArchiveError::io("create", &self.dir, e))?;

        let path = self.next_backup_path(Utc::now()).await;
        let tmp = tmp_path_for(&path);
        write_atomic(&tmp, &path, &body).await?;

        tracing::debug!(path = %path.display(), entries = entries.len(), "wrote timeline backup");
        Ok(path)
    }

    async fn prune_locked(&self) -> Result<PruneReport, ArchiveError> {
        self.remove_stale_temps().await;
        let backups = self.list_backups().await?;
        let mut report = PruneReport {
            kept: backups.len().min(self.max_backups),
            ..PruneReport::default()
        };

        for stale in backups.into_iter().skip(self.max_backups) {
            match tokio::fs::remove_file(&stale.path).await {
                Ok(()) => {
                    tracing::debug!(path = %stale.path.display(), "removed old timeline backup");
                    report.removed.push(stale.path);
                }
                Err(e) => {
                    tracing::warn!(
                        path = %stale.path.display(),
                        error = %e,
                        "failed to remove old timeline backup"
                    );
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    /// Temp files left by a write that never reached its rename. Only called
    /// under `io_lock`, so no write of ours is in flight.
    async fn remove_stale_temps(&self) {
        let Ok(mut dir) = tokio::fs::read_dir(&self.dir).await else {
            return;
        };
        while let Ok(Some(entry)) = dir.next_entry().await {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !is_temp_name(&name) {
                continue;
            }
            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => tracing::debug!(file = %name, "removed stale timeline temp file"),
                Err(e) => tracing::warn!(file = %name, error = %e, "failed to remove stale timeline temp file"),
            }
        }
    }

    async fn next_backup_path(&self, now: DateTime<Utc>) -> PathBuf {
        let stamp = backup_stamp(now);
        let mut path = self.dir.join(format!("{FILE_PREFIX}{stamp}{FILE_SUFFIX}"));
        let mut n = 1u32;
        // `_` sorts after `.`, so suffixed names stay in creation order.
        while tokio::fs::try_exists(&path).await.unwrap_or(false) {
            path = self
                .dir
                .join(format!("{FILE_PREFIX}{stamp}_{n:03}{FILE_SUFFIX}"));
            n += 1;
        }
        path
    }
}

#[async_trait]
impl Archive for BackupStore {
    async fn archive(&self, entries: &[TimelineEntry]) -> Result<ArchiveOutcome, ArchiveError> {
        let _guard = self.io_lock.lock().await;
        let path = self.persist_locked(entries).await?;

        let pruned = match self.prune_locked().await {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::warn!(error = %e, "timeline backup rotation failed");
                None
            }
        };

        tracing::info!(
            path = %path.display(),
            entries = entries.len(),
            "archived timeline"
        );
        Ok(ArchiveOutcome {
            path,
            entries: entries.len(),
            pruned,
        })
    }
}

/// Sortable, filesystem-safe UTC timestamp, e.g. `2025-01-31T09-15-02-417Z`.
pub fn backup_stamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-")
}

fn is_backup_name(name: &str) -> bool {
    name.starts_with(FILE_PREFIX) && name.ends_with(FILE_SUFFIX)
}

fn is_temp_name(name: &str) -> bool {
    name.strip_prefix('.')
        .and_then(|rest| rest.strip_suffix(".tmp"))
        .is_some_and(is_backup_name)
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.tmp"))
}

async fn write_atomic(tmp: &Path, dest: &Path, body: &[u8]) -> Result<(), ArchiveError> {
    let result = async {
        let mut file = tokio::fs::File::create(tmp)
            .await
            .map_err(|e| ArchiveError::io("create", tmp, e))?;
        file.write_all(body)
            .await
            .map_err(|e| ArchiveError::io("write", tmp, e))?;
        file.sync_all()
            .await
            .map_err(|e| ArchiveError::io("sync", tmp, e))?;
        drop(file);
        tokio::fs::rename(tmp, dest)
            .await
            .map_err(|e| ArchiveError::io("rename", dest, e))
    }
    .await;

    if result.is_err() {
        let _ = tokio::fs::remove_file(tmp).await;
    }
    result
}
