use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use super::Event;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    #[error("handler failed: {0}")]
    Failed(String),
    #[error("handler panicked: {0}")]
    Panicked(String),
    #[error("handler timed out after {0} ms")]
    TimedOut(u64),
}

impl HandlerError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(value: serde_json::Error) -> Self {
        Self::Failed(value.to_string())
    }
}

impl From<std::io::Error> for HandlerError {
    fn from(value: std::io::Error) -> Self {
        Self::Failed(value.to_string())
    }
}

/// A subscriber registered on the [`EventBus`](super::EventBus).
///
/// Handlers run one at a time on the bus dispatcher. A handler that returns an
/// error, panics, or overruns the configured timeout is logged and skipped;
/// it never stops delivery of later events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Short name used in diagnostics.
    fn label(&self) -> &str;

    /// Time limit for one `handle` call, given the bus default. `None` runs
    /// the handler unbounded.
    fn timeout(&self, default: Duration) -> Option<Duration> {
        Some(default)
    }

    async fn handle(&self, event: &Event) -> Result<(), HandlerError>;
}

/// Adapts an async closure into an [`EventHandler`].
pub struct FnHandler<F> {
    label: String,
    f: F,
}

impl<F> FnHandler<F> {
    pub fn new(label: impl Into<String>, f: F) -> Self {
        Self {
            label: label.into(),
            f,
        }
    }
}

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    fn label(&self) -> &str {
        &self.label
    }

    async fn handle(&self, event: &Event) -> Result<(), HandlerError> {
        (self.f)(event.clone()).await
    }
}
