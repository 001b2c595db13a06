use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{LogStatus, TestCategory};

/// One line of the ingestion audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunLogEntry {
    pub timestamp: NaiveDateTime,
    pub filename: String,
    pub status: LogStatus,
    pub record_id: Option<Uuid>,
    pub category: Option<TestCategory>,
    pub message: String,
}
