//! Event name constants and the report kinds the timeline understands.
//!
//! Single source of truth for the bus vocabulary. Producers should publish
//! under one of these names; anything else is still delivered to whoever
//! registered for it but never reaches the timeline.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Event names
// ---------------------------------------------------------------------------

pub const EVENT_ASSISTANT_OUTPUT: &str = "assistantOutput";
pub const EVENT_SYSTEM_STATUS: &str = "systemStatus";
pub const EVENT_SUBSYSTEM_MESSAGE: &str = "subsystemMessage";
pub const EVENT_SYSTEM_ERROR: &str = "systemError";
pub const EVENT_DEBUG_TRACE: &str = "debugTrace";

/// Republished by the timeline recorder for every entry it records.
pub const EVENT_TIMELINE: &str = "timelineEvent";

// ---------------------------------------------------------------------------
// Report kinds
// ---------------------------------------------------------------------------

/// The kinds of subsystem report that are normalized into timeline entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReportKind {
    AssistantOutput,
    SystemStatus,
    SubsystemMessage,
    SystemError,
    DebugTrace,
}

impl ReportKind {
    /// Event name this kind is published under.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AssistantOutput => EVENT_ASSISTANT_OUTPUT,
            Self::SystemStatus => EVENT_SYSTEM_STATUS,
            Self::SubsystemMessage => EVENT_SUBSYSTEM_MESSAGE,
            Self::SystemError => EVENT_SYSTEM_ERROR,
            Self::DebugTrace => EVENT_DEBUG_TRACE,
        }
    }

    pub const fn all() -> &'static [ReportKind] {
        &[
            ReportKind::AssistantOutput,
            ReportKind::SystemStatus,
            ReportKind::SubsystemMessage,
            ReportKind::SystemError,
            ReportKind::DebugTrace,
        ]
    }

    /// Subsystem tag used when a report does not name its own.
    pub const fn default_subsystem(&self) -> &'static str {
        match self {
            Self::AssistantOutput => "assistant",
            Self::SystemStatus => "system",
            Self::SubsystemMessage => "subsystem",
            Self::SystemError => "system",
            Self::DebugTrace => "debug",
        }
    }

    /// Title used when a report does not carry its own.
    pub const fn default_title(&self) -> &'static str {
        match self {
            Self::AssistantOutput => "Assistant output",
            Self::SystemStatus => "System status",
            Self::SubsystemMessage => "Subsystem message",
            Self::SystemError => "Error",
            Self::DebugTrace => "Debug trace",
        }
    }

    pub fn from_event_name(name: &str) -> Option<Self> {
        Self::all().iter().copied().find(|kind| kind.as_str() == name)
    }
}

impl std::fmt::Display for ReportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ReportKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "assistantoutput" | "assistant_output" | "assistant-output" => {
                Ok(Self::AssistantOutput)
            }
            "systemstatus" | "system_status" | "system-status" => Ok(Self::SystemStatus),
            "subsystemmessage" | "subsystem_message" | "subsystem-message" => {
                Ok(Self::SubsystemMessage)
            }
            "systemerror" | "system_error" | "system-error" => Ok(Self::SystemError),
            "debugtrace" | "debug_trace" | "debug-trace" => Ok(Self::DebugTrace),
            _ => Err(format!("unsupported report kind: {value}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_names_round_trip_through_kind() {
        for kind in ReportKind::all() {
            assert_eq!(ReportKind::from_event_name(kind.as_str()), Some(*kind));
        }
        assert_eq!(ReportKind::from_event_name(EVENT_TIMELINE), None);
    }

    #[test]
    fn parses_loose_spellings() {
        assert_eq!("system-error".parse::<ReportKind>(), Ok(ReportKind::SystemError));
        assert_eq!("debugTrace".parse::<ReportKind>(), Ok(ReportKind::DebugTrace));
        assert!("timeline".parse::<ReportKind>().is_err());
    }
}
