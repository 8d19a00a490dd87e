use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::archive::{ArchiveError, BackupStore};
use crate::bus::{EventBus, Report};
use crate::config::TimelineConfig;
use crate::timeline::{AutoArchive, ResetOutcome, TimelineEntry, TimelineRecorder};
use crate::Error;

/// The event bus, timeline recorder and backup store, wired together.
///
/// Construct one at process startup and hand `Arc` clones (or the bus
/// itself) to collaborators.
pub struct TimelineService {
    config: TimelineConfig,
    bus: Arc<EventBus>,
    store: Arc<BackupStore>,
    recorder: Arc<TimelineRecorder>,
    auto_archive: Mutex<Option<AutoArchive>>,
}

impl TimelineService {
    /// Open the backup directory, start the dispatcher and subscribe the
    /// recorder. Must be called inside a Tokio runtime.
    pub fn start(config: TimelineConfig) -> Result<Self, Error> {
        config.validate()?;
        let store = Arc::new(BackupStore::open(config.backup_dir(), config.max_backups)?);
        let bus = Arc::new(EventBus::with_options(config.bus_options()));
        let recorder = TimelineRecorder::attach(bus.clone(), store.clone());
        let auto_archive = config
            .auto_archive_interval()
            .map(|every| recorder.spawn_auto_archive(every));

        tracing::info!(
            backup_dir = %store.dir().display(),
            max_backups = store.max_backups(),
            queue_capacity = ?config.queue_capacity,
            "timeline service started"
        );

        Ok(Self {
            config,
            bus,
            store,
            recorder,
            auto_archive: Mutex::new(auto_archive),
        })
    }

    pub fn config(&self) -> &TimelineConfig {
        &self.config
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn recorder(&self) -> &Arc<TimelineRecorder> {
        &self.recorder
    }

    pub fn store(&self) -> &Arc<BackupStore> {
        &self.store
    }

    pub fn publish(&self, name: impl Into<String>, payload: Value) {
        self.bus.publish(name, payload);
    }

    pub fn publish_report(&self, report: Report) {
        self.bus.publish_report(report);
    }

    pub async fn events(&self) -> Vec<TimelineEntry> {
        self.recorder.events().await
    }

    pub async fn reset(&self) -> Result<ResetOutcome, ArchiveError> {
        self.recorder.reset().await
    }

    /// Drain the bus, stop the dispatcher and, if configured, archive what is
    /// left of the timeline.
    pub async fn shutdown(&self) -> Result<(), Error> {
        let auto_archive = self
            .auto_archive
            .lock()
            .expect("auto archive mutex poisoned")
            .take();
        if let Some(auto_archive) = auto_archive {
            auto_archive.stop().await;
        }

        self.bus.flush().await;
        self.bus.shutdown().await;

        if self.config.archive_on_shutdown {
            if let ResetOutcome::Archived(outcome) = self.recorder.reset().await? {
                tracing::info!(
                    path = %outcome.path.display(),
                    entries = outcome.entries,
                    "archived timeline on shutdown"
                );
            }
        }

        let stats = self.bus.stats();
        tracing::info!(
            published = stats.published,
            delivered = stats.delivered,
            dropped = stats.dropped,
            handler_failures = stats.handler_failures,
            "timeline service stopped"
        );
        Ok(())
    }
}
