//! Durable, rotating snapshots of the timeline.
//!
//! The recorder talks to storage through the [`Archive`] trait; the shipped
//! implementation is [`BackupStore`], which writes JSON files under
//! `<data_dir>/timeline_backups/`.

mod error;
mod store;

use std::path::PathBuf;

use async_trait::async_trait;
use serde::Serialize;

use crate::timeline::TimelineEntry;

pub use error::ArchiveError;
pub use store::{backup_stamp, BackupFile, BackupStore, BACKUP_DIR_NAME, DEFAULT_MAX_BACKUPS};

/// One archival cycle: persist a snapshot, then rotate old snapshots away.
///
/// Implementations must only return `Ok` once the snapshot is durably
/// written; the recorder clears its buffer on `Ok` and keeps it on `Err`.
#[async_trait]
pub trait Archive: Send + Sync {
    async fn archive(&self, entries: &[TimelineEntry]) -> Result<ArchiveOutcome, ArchiveError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PruneReport {
    pub kept: usize,
    pub removed: Vec<PathBuf>,
    /// Deletions that failed and were skipped.
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveOutcome {
    pub path: PathBuf,
    pub entries: usize,
    /// `None` when rotation could not run; the snapshot itself is still safe.
    pub pruned: Option<PruneReport>,
}
