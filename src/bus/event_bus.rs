use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::event_types::EVENT_SYSTEM_ERROR;
use super::handler::{EventHandler, FnHandler, HandlerError};
use super::report::Report;

pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;
pub const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(30);

tokio::task_local! {
    /// Lineage of the event whose handlers are running on this task.
    static FAILURE_LINEAGE: bool;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub seq: u64,
    pub name: String,
    pub payload: Value,
    pub created_at: String,
    /// Set on failure reports and on everything published while handling
    /// one. Failures of such events are logged but never republished.
    #[serde(default)]
    pub failure_lineage: bool,
}

/// What `publish` does when the queue is at capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverflowPolicy {
    /// Evict the oldest queued event to make room.
    #[default]
    DropOldest,
    /// Reject the event being published.
    DropNewest,
}

#[derive(Debug, Clone)]
pub struct BusOptions {
    /// `None` leaves the queue unbounded.
    pub capacity: Option<usize>,
    pub overflow: OverflowPolicy,
    pub handler_timeout: Duration,
    /// Republish handler failures as `systemError` reports.
    pub report_handler_failures: bool,
}

impl Default for BusOptions {
    fn default() -> Self {
        Self {
            capacity: Some(DEFAULT_QUEUE_CAPACITY),
            overflow: OverflowPolicy::default(),
            handler_timeout: DEFAULT_HANDLER_TIMEOUT,
            report_handler_failures: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusStats {
    pub published: u64,
    pub delivered: u64,
    pub dropped: u64,
    pub handler_failures: u64,
    pub handler_timeouts: u64,
}

#[derive(Default)]
struct Counters {
    published: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
    handler_failures: AtomicU64,
    handler_timeouts: AtomicU64,
}

#[derive(Default)]
struct QueueState {
    events: VecDeque<Event>,
    closed: bool,
}

struct Shared {
    options: BusOptions,
    queue: Mutex<QueueState>,
    /// Wakes the dispatcher when the queue gains an event or the bus closes.
    wakeup: Notify,
    /// Signalled whenever `pending` drops to zero.
    idle: Notify,
    /// Events enqueued but not yet fully dispatched.
    pending: AtomicUsize,
    handlers: DashMap<String, Vec<Arc<dyn EventHandler>>>,
    seq: AtomicU64,
    counters: Counters,
}

/// Ordered in-process publish/subscribe bus.
///
/// Every published event goes into one FIFO queue that a single dispatcher
/// task drains. Handlers run sequentially: all handlers for an event finish
/// before any handler for the next event starts, regardless of event name.
/// `publish` only appends to the queue and never waits on handlers.
pub struct EventBus {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl EventBus {
    /// Create a bus with default options. Must be called inside a Tokio
    /// runtime; the dispatcher task is spawned immediately.
    pub fn new() -> Self {
        Self::with_options(BusOptions::default())
    }

    pub fn with_options(options: BusOptions) -> Self {
        let shared = Arc::new(Shared {
            options,
            queue: Mutex::new(QueueState::default()),
            wakeup: Notify::new(),
            idle: Notify::new(),
            pending: AtomicUsize::new(0),
            handlers: DashMap::new(),
            seq: AtomicU64::new(0),
            counters: Counters::default(),
        });
        let worker = tokio::spawn(run_dispatcher(shared.clone()));
        Self {
            shared,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Append `handler` to the handlers for `name`. Handlers for the same
    /// name run in registration order; registering twice runs twice.
    pub fn register(&self, name: impl Into<String>, handler: Arc<dyn EventHandler>) {
        let name = name.into();
        tracing::debug!(event = %name, handler = handler.label(), "registered event handler");
        self.shared.handlers.entry(name).or_default().push(handler);
    }

    /// Convenience: register an async closure.
    pub fn on<F, Fut>(&self, name: impl Into<String>, label: impl Into<String>, f: F)
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        self.register(name, Arc::new(FnHandler::new(label, f)));
    }

    pub fn handler_count(&self, name: &str) -> usize {
        self.shared.handlers.get(name).map(|h| h.len()).unwrap_or(0)
    }

    /// Enqueue an event. Fire-and-forget: returning says nothing about
    /// whether any handler succeeded.
    pub fn publish(&self, name: impl Into<String>, payload: Value) {
        let lineage = FAILURE_LINEAGE.try_with(|l| *l).unwrap_or(false);
        self.shared.enqueue(name.into(), payload, lineage);
    }

    /// Publish a tagged report under its kind's event name.
    pub fn publish_report(&self, report: Report) {
        let lineage = FAILURE_LINEAGE.try_with(|l| *l).unwrap_or(false);
        self.shared.enqueue_report(&report, lineage);
    }

    /// Wait until every event published so far has been dispatched.
    ///
    /// Calling this from inside a handler deadlocks the dispatcher.
    pub async fn flush(&self) {
        loop {
            let idle = self.shared.idle.notified();
            tokio::pin!(idle);
            idle.as_mut().enable();
            if self.shared.pending.load(Ordering::Acquire) == 0 {
                return;
            }
            idle.await;
        }
    }

    pub fn queue_len(&self) -> usize {
        self.shared
            .queue
            .lock()
            .expect("event queue mutex poisoned")
            .events
            .len()
    }

    pub fn stats(&self) -> BusStats {
        let c = &self.shared.counters;
        BusStats {
            published: c.published.load(Ordering::Relaxed),
            delivered: c.delivered.load(Ordering::Relaxed),
            dropped: c.dropped.load(Ordering::Relaxed),
            handler_failures: c.handler_failures.load(Ordering::Relaxed),
            handler_timeouts: c.handler_timeouts.load(Ordering::Relaxed),
        }
    }

    /// Stop accepting events, dispatch whatever is still queued, then stop
    /// the dispatcher.
    pub async fn shutdown(&self) {
        self.shared.close();
        let worker = self
            .worker
            .lock()
            .expect("event bus worker mutex poisoned")
            .take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                tracing::error!("event bus dispatcher exited abnormally: {e}");
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for EventBus {
    fn drop(&mut self) {
        self.shared.close();
    }
}

impl Shared {
    fn enqueue(&self, name: String, payload: Value, failure_lineage: bool) {
        let mut state = self.queue.lock().expect("event queue mutex poisoned");
        if state.closed {
            drop(state);
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(event = %name, "event bus is shut down, dropping event");
            return;
        }

        let mut evicted = None;
        if let Some(capacity) = self.options.capacity.filter(|c| *c > 0) {
            if state.events.len() >= capacity {
                match self.options.overflow {
                    OverflowPolicy::DropOldest => evicted = state.events.pop_front(),
                    OverflowPolicy::DropNewest => {
                        drop(state);
                        self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!(event = %name, capacity, "event queue full, dropping newest event");
                        return;
                    }
                }
            }
        }

        // Sequence numbers are taken under the queue lock so they match queue order.
        let event = Event {
            id: Uuid::new_v4().to_string(),
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
            name,
            payload,
            created_at: Utc::now().to_rfc3339(),
            failure_lineage,
        };
        state.events.push_back(event);
        if evicted.is_none() {
            self.pending.fetch_add(1, Ordering::AcqRel);
        }
        drop(state);

        self.counters.published.fetch_add(1, Ordering::Relaxed);
        if let Some(old) = evicted {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                event = %old.name,
                seq = old.seq,
                "event queue full, dropped oldest event"
            );
        }
        self.wakeup.notify_one();
    }

    fn enqueue_report(&self, report: &Report, failure_lineage: bool) {
        let payload =
            serde_json::to_value(report).unwrap_or_else(|_| json!({"_ser": "error"}));
        self.enqueue(report.kind.as_str().to_string(), payload, failure_lineage);
    }

    fn close(&self) {
        let mut state = self.queue.lock().expect("event queue mutex poisoned");
        if state.closed {
            return;
        }
        state.closed = true;
        drop(state);
        self.wakeup.notify_one();
    }

    fn finish_one(&self) {
        if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }

    async fn dispatch(&self, event: Event) {
        let handlers: Vec<Arc<dyn EventHandler>> = self
            .handlers
            .get(&event.name)
            .map(|h| h.value().clone())
            .unwrap_or_default();

        if handlers.is_empty() {
            tracing::trace!(event = %event.name, seq = event.seq, "no handlers registered");
            return;
        }

        for handler in handlers {
            match self.invoke(handler.as_ref(), &event).await {
                Ok(()) => {
                    self.counters.delivered.fetch_add(1, Ordering::Relaxed);
                }
                Err(error) => self.handler_failed(handler.label(), &event, error),
            }
        }
    }

    async fn invoke(&self, handler: &dyn EventHandler, event: &Event) -> Result<(), HandlerError> {
        let call = FAILURE_LINEAGE.scope(
            event.failure_lineage,
            AssertUnwindSafe(handler.handle(event)).catch_unwind(),
        );
        let outcome = match handler.timeout(self.options.handler_timeout) {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(outcome) => outcome,
                Err(_) => return Err(HandlerError::TimedOut(limit.as_millis() as u64)),
            },
            None => call.await,
        };
        match outcome {
            Ok(result) => result,
            Err(panic) => Err(HandlerError::Panicked(panic_message(panic.as_ref()))),
        }
    }

    fn handler_failed(&self, label: &str, event: &Event, error: HandlerError) {
        self.counters.handler_failures.fetch_add(1, Ordering::Relaxed);
        if matches!(error, HandlerError::TimedOut(_)) {
            self.counters.handler_timeouts.fetch_add(1, Ordering::Relaxed);
        }
        tracing::warn!(
            handler = label,
            event = %event.name,
            seq = event.seq,
            error = %error,
            "event handler failed"
        );

        // Reporting a failure that failure reporting caused would feed itself.
        if self.options.report_handler_failures
            && event.name != EVENT_SYSTEM_ERROR
            && !event.failure_lineage
        {
            let report = Report::system_error(
                "eventBus",
                json!({
                    "handler": label,
                    "event": event.name,
                    "seq": event.seq,
                    "error": error.to_string(),
                }),
            )
            .with_title("Handler failure");
            self.enqueue_report(&report, true);
        }
    }
}

async fn run_dispatcher(shared: Arc<Shared>) {
    loop {
        let next = {
            let mut state = shared.queue.lock().expect("event queue mutex poisoned");
            match state.events.pop_front() {
                Some(event) => Some(event),
                None if state.closed => break,
                None => None,
            }
        };

        match next {
            Some(event) => {
                shared.dispatch(event).await;
                shared.finish_one();
            }
            None => shared.wakeup.notified().await,
        }
    }
    tracing::debug!("event bus dispatcher stopped");
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
