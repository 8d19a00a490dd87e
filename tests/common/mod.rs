// tests/common/mod.rs
//! Common test utilities for timeline integration tests.

use std::path::Path;
use std::sync::{Arc, Mutex};

use agent_timeline::{Event, EventHandler, HandlerError, TimelineConfig};
use async_trait::async_trait;

pub fn config_in(dir: &Path) -> TimelineConfig {
    TimelineConfig {
        data_dir: dir.to_path_buf(),
        archive_on_shutdown: false,
        ..TimelineConfig::default()
    }
}

/// Collects the names of events it receives.
#[derive(Clone, Default)]
pub struct Collector {
    seen: Arc<Mutex<Vec<String>>>,
}

impl Collector {
    pub fn names(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventHandler for Collector {
    fn label(&self) -> &str {
        "collector"
    }

    async fn handle(&self, event: &Event) -> Result<(), HandlerError> {
        self.seen.lock().unwrap().push(event.name.clone());
        Ok(())
    }
}
