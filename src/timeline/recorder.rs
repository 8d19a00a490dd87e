use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::{watch, Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;

use super::TimelineEntry;
use crate::archive::{Archive, ArchiveError, ArchiveOutcome};
use crate::bus::event_types::EVENT_TIMELINE;
use crate::bus::{Event, EventBus, EventHandler, HandlerError, Report, ReportKind};

const HANDLER_LABEL: &str = "timeline-recorder";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResetOutcome {
    /// Nothing was buffered; no I/O happened.
    Empty,
    Archived(ArchiveOutcome),
}

/// Normalizes subsystem reports into an append-only timeline.
///
/// The recorder subscribes to every [`ReportKind`] on the bus, appends one
/// [`TimelineEntry`] per event in dispatch order, and republishes each entry
/// as `timelineEvent` for live consumers.
pub struct TimelineRecorder {
    bus: Arc<EventBus>,
    archive: Arc<dyn Archive>,
    /// Held across snapshot + persist + clear in `reset`, and by every append.
    entries: Arc<Mutex<Vec<TimelineEntry>>>,
}

/// Handle to the periodic archive loop started by
/// [`TimelineRecorder::spawn_auto_archive`]. Dropping it also stops the loop.
pub struct AutoArchive {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl AutoArchive {
    /// Stop ticking and wait for the loop to exit. An archive cycle that is
    /// already running completes first.
    pub async fn stop(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "auto archive task ended abnormally");
        }
    }
}

impl TimelineRecorder {
    /// Build a recorder without subscribing it. Use [`attach`](Self::attach)
    /// to have it fed from the bus.
    pub fn new(bus: Arc<EventBus>, archive: Arc<dyn Archive>) -> Self {
        Self {
            bus,
            archive,
            entries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Build a recorder and register it for every report kind.
    pub fn attach(bus: Arc<EventBus>, archive: Arc<dyn Archive>) -> Arc<Self> {
        let recorder = Arc::new(Self::new(bus.clone(), archive));
        for kind in ReportKind::all() {
            bus.register(
                kind.as_str(),
                Arc::new(RecorderHandler {
                    recorder: Arc::downgrade(&recorder),
                }),
            );
        }
        recorder
    }

    /// Append an entry stamped with the current time and announce it.
    pub async fn record(
        &self,
        subsystem: impl Into<String>,
        title: impl Into<String>,
        payload: Value,
    ) -> TimelineEntry {
        self.append(TimelineEntry::new(subsystem, title, payload))
            .await
    }

    pub async fn record_report(&self, report: Report) -> TimelineEntry {
        self.append(TimelineEntry::from_report(report)).await
    }

    async fn append(&self, entry: TimelineEntry) -> TimelineEntry {
        self.entries.lock().await.push(entry.clone());
        let payload = serde_json::to_value(&entry).unwrap_or_else(|_| json!({"_ser": "error"}));
        self.bus.publish(EVENT_TIMELINE, payload);
        entry
    }

    /// Copy of the current timeline.
    pub async fn events(&self) -> Vec<TimelineEntry> {
        self.entries.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Archive the buffered timeline and clear it.
    ///
    /// The buffer is cleared only after the archive reports success. On
    /// failure the entries stay in memory for the next attempt and a
    /// `systemError` report is published.
    ///
    /// Dropping the returned future is safe: once the buffer lock is taken,
    /// archive and clear run to completion in their own task.
    pub async fn reset(&self) -> Result<ResetOutcome, ArchiveError> {
        let entries = self.entries.clone().lock_owned().await;
        if entries.is_empty() {
            return Ok(ResetOutcome::Empty);
        }

        let cycle = tokio::spawn(archive_cycle(
            entries,
            self.archive.clone(),
            self.bus.clone(),
        ));
        match cycle.await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(error = %e, "timeline archive task did not finish");
                Err(ArchiveError::Interrupted(e.to_string()))
            }
        }
    }

    /// Run [`reset`](Self::reset) every `every`, until the handle is stopped
    /// or the recorder is dropped.
    pub fn spawn_auto_archive(self: &Arc<Self>, every: Duration) -> AutoArchive {
        let recorder = Arc::downgrade(self);
        let (stop, mut stopped) = watch::channel(false);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = stopped.changed() => break,
                }
                let Some(recorder) = recorder.upgrade() else {
                    break;
                };
                match recorder.reset().await {
                    Ok(ResetOutcome::Archived(outcome)) => {
                        tracing::debug!(entries = outcome.entries, "periodic timeline archive");
                    }
                    Ok(ResetOutcome::Empty) => {}
                    Err(e) => tracing::warn!(error = %e, "periodic timeline archive failed"),
                }
            }
        });
        AutoArchive { stop, task }
    }
}

async fn archive_cycle(
    mut entries: OwnedMutexGuard<Vec<TimelineEntry>>,
    archive: Arc<dyn Archive>,
    bus: Arc<EventBus>,
) -> Result<ResetOutcome, ArchiveError> {
    match archive.archive(&entries).await {
        Ok(outcome) => {
            entries.clear();
            Ok(ResetOutcome::Archived(outcome))
        }
        Err(e) => {
            let retained = entries.len();
            drop(entries);
            tracing::error!(error = %e, retained, "timeline archive failed, keeping entries");
            bus.publish_report(
                Report::system_error(
                    "timeline",
                    json!({ "error": e.to_string(), "retained": retained }),
                )
                .with_title("Archive failed"),
            );
            Err(e)
        }
    }
}

struct RecorderHandler {
    recorder: Weak<TimelineRecorder>,
}

#[async_trait]
impl EventHandler for RecorderHandler {
    fn label(&self) -> &str {
        HANDLER_LABEL
    }

    // Appends wait on the buffer lock while an archive is in flight; the
    // event being dispatched must still land once it is released.
    fn timeout(&self, _default: Duration) -> Option<Duration> {
        None
    }

    async fn handle(&self, event: &Event) -> Result<(), HandlerError> {
        let Some(recorder) = self.recorder.upgrade() else {
            return Ok(());
        };
        let report = Report::from_event(&event.name, &event.payload)
            .ok_or_else(|| HandlerError::failed(format!("not a timeline report: {}", event.name)))?;
        recorder.record_report(report).await;
        Ok(())
    }
}
