//! Test doubles shared by the unit tests: a handler that records what it
//! sees, a handler that parks the dispatcher until released, and archives
//! that fail or park.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Notify;

use crate::archive::{Archive, ArchiveError, ArchiveOutcome};
use crate::bus::{Event, EventHandler, HandlerError};
use crate::timeline::TimelineEntry;

#[derive(Debug, Clone)]
pub struct LoggedEvent {
    pub label: String,
    pub event: String,
    pub seq: u64,
    pub payload: Value,
}

/// Shared log that any number of [`RecordingHandler`]s append to, so tests can
/// assert the interleaving across handlers.
#[derive(Clone, Default)]
pub struct EventLog {
    inner: Arc<Mutex<Vec<LoggedEvent>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handler(&self, label: &str) -> Arc<dyn EventHandler> {
        Arc::new(RecordingHandler {
            label: label.to_string(),
            log: self.clone(),
        })
    }

    pub fn entries(&self) -> Vec<LoggedEvent> {
        self.inner.lock().unwrap().clone()
    }

    pub fn labels(&self) -> Vec<String> {
        self.entries().into_iter().map(|e| e.label).collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.entries().into_iter().map(|e| e.event).collect()
    }
}

pub struct RecordingHandler {
    label: String,
    log: EventLog,
}

#[async_trait]
impl EventHandler for RecordingHandler {
    fn label(&self) -> &str {
        &self.label
    }

    async fn handle(&self, event: &Event) -> Result<(), HandlerError> {
        self.log.inner.lock().unwrap().push(LoggedEvent {
            label: self.label.clone(),
            event: event.name.clone(),
            seq: event.seq,
            payload: event.payload.clone(),
        });
        Ok(())
    }
}

/// Parks the dispatcher inside a handler so tests can fill the queue before
/// anything is delivered.
#[derive(Clone, Default)]
pub struct Gate {
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

impl Gate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handler(&self) -> Arc<dyn EventHandler> {
        Arc::new(GateHandler { gate: self.clone() })
    }

    pub async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.release.notify_one();
    }
}

struct GateHandler {
    gate: Gate,
}

#[async_trait]
impl EventHandler for GateHandler {
    fn label(&self) -> &str {
        "gate"
    }

    async fn handle(&self, _event: &Event) -> Result<(), HandlerError> {
        self.gate.entered.notify_one();
        self.gate.release.notified().await;
        Ok(())
    }
}

pub struct FailingArchive;

#[async_trait]
impl Archive for FailingArchive {
    async fn archive(&self, _entries: &[TimelineEntry]) -> Result<ArchiveOutcome, ArchiveError> {
        Err(ArchiveError::io(
            "write",
            "/unwritable/timeline.json",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only volume"),
        ))
    }
}

/// Archive that blocks inside `archive` until released, then succeeds and
/// counts the entries it was handed.
#[derive(Clone, Default)]
pub struct ParkedArchive {
    entered: Arc<Notify>,
    release: Arc<Notify>,
    archived: Arc<AtomicUsize>,
}

impl ParkedArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.release.notify_one();
    }

    /// Total entries across every completed cycle.
    pub fn archived(&self) -> usize {
        self.archived.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Archive for ParkedArchive {
    async fn archive(&self, entries: &[TimelineEntry]) -> Result<ArchiveOutcome, ArchiveError> {
        self.entered.notify_one();
        self.release.notified().await;
        self.archived.fetch_add(entries.len(), Ordering::SeqCst);
        Ok(ArchiveOutcome {
            path: PathBuf::from("parked.json"),
            entries: entries.len(),
            pruned: None,
        })
    }
}
