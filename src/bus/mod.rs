//! Ordered in-process event bus.
//!
//! The event bus provides:
//! - Fire-and-forget publishing from any task or thread
//! - A single FIFO queue with one dispatcher, so delivery order is publish order
//! - Per-handler isolation: errors, panics and timeouts are logged and skipped
//! - A bounded queue with an explicit overflow policy
//!
//! # Architecture
//!
//! Events flow producer → `EventBus::publish` → queue → dispatcher → handlers:
//! - `EventBus`: queue, handler registry and the dispatcher task
//! - `Report`: tagged subsystem report producers can publish instead of loose JSON
//! - `event_types`: the event-name vocabulary shared with the timeline

mod event_bus;
pub mod event_types;
mod handler;
mod report;

pub use event_bus::{
    BusOptions, BusStats, Event, EventBus, OverflowPolicy, DEFAULT_HANDLER_TIMEOUT,
    DEFAULT_QUEUE_CAPACITY,
};
pub use event_types::ReportKind;
pub use handler::{EventHandler, FnHandler, HandlerError};
pub use report::Report;
