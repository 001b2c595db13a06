use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::identity::Resolution;
use super::{IngestError, ParsedLabTest};
use crate::db::DatabaseError;
use crate::models::LabTestFields;
use crate::store::LabRecordStore;

/// Status written on every create and update.
pub const RECORD_STATUS: &str = "publish";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertOutcome {
    pub record_id: Uuid,
    pub created: bool,
}

/// `Test de <category> - <origin id, or source file name when empty>`.
pub fn record_title(parsed: &ParsedLabTest) -> String {
    let reference = if parsed.report.origin_id.is_empty() {
        parsed.file_name.as_str()
    } else {
        parsed.report.origin_id.as_str()
    };
    format!("Test de {} - {}", parsed.category().display_name(), reference)
}

/// Map a parsed delivery onto the persisted field set.
pub fn build_fields(parsed: &ParsedLabTest) -> LabTestFields {
    let report = &parsed.report;
    LabTestFields {
        title: record_title(parsed),
        status: RECORD_STATUS.into(),
        ui_type: parsed.category().ui_type().into(),
        origin_request_id: report.origin_id.clone(),
        secondary_request_id: report.secondary_id.clone(),
        patient_name: report.patient_name.clone(),
        doctor_name: report.doctor_name.clone(),
        clinical_notes: report.clinical_notes.clone(),
        payload: report.payload.clone(),
        source_path: parsed.source_path.to_string_lossy().into_owned(),
        source_raw: parsed.raw.clone(),
        source_hash: parsed.content_hash.clone(),
        lookup_origin_id: report.origin_id.clone(),
        lookup_secondary_id: report.secondary_id.clone(),
        lookup_hash: parsed.content_hash.clone(),
    }
}

/// Create or overwrite the record, then set its single category label.
pub fn upsert_record(
    store: &dyn LabRecordStore,
    resolution: Resolution,
    parsed: &ParsedLabTest,
) -> Result<UpsertOutcome, IngestError> {
    let fields = build_fields(parsed);

    let outcome = match resolution {
        Resolution::Existing(record_id) => {
            store.update(&record_id, &fields)?;
            UpsertOutcome { record_id, created: false }
        }
        Resolution::NotFound => {
            let record_id = store.create(&fields)?;
            if record_id.is_nil() {
                return Err(IngestError::Persistence(DatabaseError::ConstraintViolation(
                    "store did not return a usable record id".into(),
                )));
            }
            UpsertOutcome { record_id, created: true }
        }
    };

    store.assign_category(&outcome.record_id, parsed.category())?;

    tracing::info!(
        record_id = %outcome.record_id,
        file = %parsed.file_name,
        category = parsed.category().as_str(),
        created = outcome.created,
        "Lab test record saved"
    );
    Ok(outcome)
}
