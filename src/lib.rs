//! Event bus and timeline persistence pipeline.
//!
//! Every subsystem (tool execution, model calls, errors, debug traces)
//! reports into one ordered bus. A recorder turns those reports into a
//! causally ordered timeline, and an archive rotates that timeline into a
//! bounded set of JSON backups.
//!
//! # Architecture
//!
//! - `bus`: ordered publish/subscribe with a single dispatcher
//! - `timeline`: the recorder and its normalized entries
//! - `archive`: atomic, rotating backup files
//! - `config`: file and environment configuration
//! - `service`: the three pieces wired together for process startup

pub mod archive;
pub mod bus;
pub mod config;
pub mod service;
pub mod timeline;

#[cfg(test)]
mod testing;
#[cfg(test)]
mod tests;

pub use archive::{Archive, ArchiveError, ArchiveOutcome, BackupStore, PruneReport};
pub use bus::{Event, EventBus, EventHandler, HandlerError, Report, ReportKind};
pub use config::{ConfigError, TimelineConfig};
pub use service::TimelineService;
pub use timeline::{AutoArchive, ResetOutcome, TimelineEntry, TimelineRecorder};

// ---------------------------------------------------------------------------
// Shared error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Archive(#[from] ArchiveError),
    #[error("{0}")]
    Config(#[from] ConfigError),
}

/// Install the global `tracing` subscriber. `RUST_LOG` wins over the
/// built-in filter. Calling this more than once is harmless.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("agent_timeline=debug,info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
