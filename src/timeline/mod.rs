//! Causally ordered activity timeline built from bus reports.

mod entry;
mod recorder;

pub use entry::TimelineEntry;
pub use recorder::{AutoArchive, ResetOutcome, TimelineRecorder};
