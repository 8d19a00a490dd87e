use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::bus::{Report, ReportKind};

/// One normalized line of the activity timeline. Serialized with camelCase
/// keys; this is also the on-disk backup format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEntry {
    pub subsystem: String,
    pub title: String,
    pub payload: Value,
    pub received_at: DateTime<Utc>,
}

impl TimelineEntry {
    pub fn new(subsystem: impl Into<String>, title: impl Into<String>, payload: Value) -> Self {
        Self {
            subsystem: subsystem.into(),
            title: title.into(),
            payload,
            received_at: Utc::now(),
        }
    }

    pub fn from_report(report: Report) -> Self {
        let subsystem = report
            .subsystem
            .unwrap_or_else(|| report.kind.default_subsystem().to_string());
        let title = match report.kind {
            ReportKind::SystemError => error_title(report.title),
            kind => report
                .title
                .unwrap_or_else(|| kind.default_title().to_string()),
        };
        Self::new(subsystem, title, report.payload)
    }
}

fn error_title(title: Option<String>) -> String {
    match title {
        Some(title) if title.to_ascii_lowercase().contains("error") => title,
        Some(title) => format!("Error: {title}"),
        None => ReportKind::SystemError.default_title().to_string(),
    }
}
