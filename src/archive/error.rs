use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("failed to create backup directory {}: {source}", .path.display())]
    Bootstrap {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to {action} {}: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid timeline json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("archive task did not finish: {0}")]
    Interrupted(String),
}

impl ArchiveError {
    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }
}
