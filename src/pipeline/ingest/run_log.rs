use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::enums::{LogStatus, TestCategory};
use crate::models::RunLogEntry;
use crate::store::LabRecordStore;

/// Result of processing one input file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileOutcome {
    pub filename: String,
    pub status: LogStatus,
    pub record_id: Option<Uuid>,
    pub category: Option<TestCategory>,
    pub message: String,
}

impl FileOutcome {
    pub fn error(filename: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            status: LogStatus::Error,
            record_id: None,
            category: None,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.status == LogStatus::Error
    }

    pub fn to_log_entry(&self, timestamp: NaiveDateTime) -> RunLogEntry {
        RunLogEntry {
            timestamp,
            filename: self.filename.clone(),
            status: self.status,
            record_id: self.record_id,
            category: self.category,
            message: self.message.clone(),
        }
    }
}

/// Prepend the outcome to the bounded audit log. A failed write is reported and dropped.
pub fn record_outcome(store: &dyn LabRecordStore, outcome: &FileOutcome, capacity: usize) {
    let entry = outcome.to_log_entry(chrono::Local::now().naive_local());
    if let Err(e) = store.prepend_log_entry(&entry, capacity) {
        tracing::warn!(file = %outcome.filename, error = %e, "Failed to write run log entry");
    }
}
