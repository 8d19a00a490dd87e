//! Tagged subsystem reports.
//!
//! Producers that can build a [`Report`] up front should publish it with
//! [`EventBus::publish_report`](super::EventBus::publish_report); the
//! timeline then takes subsystem and title verbatim. Payloads published the
//! loose way are lifted into a `Report` once, here, at the boundary.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::event_types::ReportKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Report {
    pub kind: ReportKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subsystem: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub payload: Value,
}

impl Report {
    pub fn new(kind: ReportKind, payload: Value) -> Self {
        Self {
            kind,
            subsystem: None,
            title: None,
            payload,
        }
    }

    pub fn with_subsystem(mut self, subsystem: impl Into<String>) -> Self {
        self.subsystem = Some(subsystem.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn assistant_output(payload: Value) -> Self {
        Self::new(ReportKind::AssistantOutput, payload)
    }

    pub fn system_status(payload: Value) -> Self {
        Self::new(ReportKind::SystemStatus, payload)
    }

    pub fn subsystem_message(subsystem: impl Into<String>, content: Value) -> Self {
        Self::new(ReportKind::SubsystemMessage, content).with_subsystem(subsystem)
    }

    pub fn system_error(subsystem: impl Into<String>, payload: Value) -> Self {
        Self::new(ReportKind::SystemError, payload).with_subsystem(subsystem)
    }

    pub fn debug_trace(payload: Value) -> Self {
        Self::new(ReportKind::DebugTrace, payload)
    }

    /// Lift a raw event into a report. Returns `None` for names outside the
    /// report vocabulary.
    pub fn from_event(name: &str, payload: &Value) -> Option<Self> {
        let kind = ReportKind::from_event_name(name)?;

        let tagged = payload.get("kind").and_then(Value::as_str) == Some(kind.as_str())
            && payload.get("payload").is_some();
        if tagged {
            if let Ok(report) = serde_json::from_value::<Report>(payload.clone()) {
                return Some(report);
            }
        }

        let subsystem = str_field(payload, "subsystem").or_else(|| str_field(payload, "module"));

        let report = match kind {
            ReportKind::SubsystemMessage => {
                let content = payload.get("content").filter(|c| !c.is_null());
                let title = content
                    .and_then(|c| str_field(c, "type"))
                    .or_else(|| str_field(payload, "title"));
                Report {
                    kind,
                    subsystem,
                    title,
                    payload: content.cloned().unwrap_or_else(|| payload.clone()),
                }
            }
            _ => Report {
                kind,
                subsystem,
                title: str_field(payload, "title"),
                payload: payload.clone(),
            },
        };
        Some(report)
    }
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
