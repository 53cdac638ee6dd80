use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "scan_outcome", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ScanOutcome {
    Success,
    AlreadyUsed,
    NotFound,
    Malformed,
}

impl ScanOutcome {
    pub fn message(&self) -> &'static str {
        match self {
            ScanOutcome::Success => "Ticket accepted",
            ScanOutcome::AlreadyUsed => "Ticket has already been used",
            ScanOutcome::NotFound => "No matching ticket was found",
            ScanOutcome::Malformed => "Code is not a valid ticket",
        }
    }
}

/// One row of the append-only gate audit trail.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ScanLogEntry {
    pub id: Uuid,
    pub raw_code: String,
    pub order_id: Option<String>,
    pub ticket_item_id: Option<Uuid>,
    pub scanner_id: String,
    pub outcome: ScanOutcome,
    pub scanned_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScanLogFilter {
    pub scanner_id: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl ScanLogFilter {
    pub fn matches(&self, entry: &ScanLogEntry) -> bool {
        self.scanner_id
            .as_deref()
            .map_or(true, |s| entry.scanner_id == s)
            && self.from.map_or(true, |from| entry.scanned_at >= from)
            && self.to.map_or(true, |to| entry.scanned_at < to)
    }
}
