//! Request-scoped detail context for displaying one lab test to its owner.
//!
//! A [`DetailContext`] is resolved once per request and passed explicitly to every
//! display helper that needs the record.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::enums::GasKind;
use crate::models::LabTestRecord;
use crate::store::LabRecordStore;

/// Minutes between consecutive breath samples.
pub const SAMPLE_INTERVAL_MINUTES: i64 = 25;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    #[error("Login required")]
    Unauthenticated,

    #[error("Result not found")]
    NotFound,

    #[error("Not allowed to view this result")]
    Forbidden,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartPoint {
    /// Minutes since the first sample.
    pub x: i64,
    pub y: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartSeries {
    pub h2: Vec<ChartPoint>,
    pub ch4: Vec<ChartPoint>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailSummary {
    pub title: String,
    pub substrate: String,
    pub diagnostic_orientation: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailContext {
    record: LabTestRecord,
}

/// Resolve the record a viewer asked for by its origin request code.
///
/// Store failures are logged and reported as `NotFound`.
pub fn resolve_detail(
    store: &dyn LabRecordStore,
    code: &str,
    viewer_user_id: Option<i64>,
) -> Result<DetailContext, AccessError> {
    let viewer = viewer_user_id.ok_or(AccessError::Unauthenticated)?;
    if code.is_empty() {
        return Err(AccessError::NotFound);
    }

    let record = store
        .find_by_origin_id(code)
        .and_then(|id| match id {
            Some(id) => store.get(&id),
            None => Ok(None),
        })
        .unwrap_or_else(|e| {
            tracing::warn!(code = %code, error = %e, "Detail lookup failed");
            None
        })
        .ok_or(AccessError::NotFound)?;

    // An unlinked record belongs to nobody.
    if record.linked_user_id != Some(viewer) {
        tracing::debug!(record_id = %record.id, viewer, "Detail access denied");
        return Err(AccessError::Forbidden);
    }

    Ok(DetailContext { record })
}

impl DetailContext {
    pub fn record(&self) -> &LabTestRecord {
        &self.record
    }

    /// Conditional-display check against the stored UI marker.
    pub fn matches_ui_type(&self, ui_type: &str) -> bool {
        self.record.fields.ui_type == ui_type
    }

    /// H2 and CH4 points for charting. Absent values plot as 0.
    pub fn chart_series(&self) -> ChartSeries {
        let mut series = ChartSeries::default();
        for m in self.record.gas_series() {
            let x = ((i64::from(m.time_point) - 1) * SAMPLE_INTERVAL_MINUTES).max(0);
            series.h2.push(ChartPoint { x, y: m.h2.unwrap_or(0) });
            series.ch4.push(ChartPoint { x, y: m.ch4.unwrap_or(0) });
        }
        series
    }

    /// Values of one gas in time-point order. Absent values read as 0.
    pub fn gas_values(&self, kind: GasKind) -> Vec<i64> {
        self.record
            .gas_series()
            .iter()
            .map(|m| m.value(kind).unwrap_or(0))
            .collect()
    }

    pub fn summary(&self) -> DetailSummary {
        let notes = self.record.fields.clinical_notes.clone().unwrap_or_default();
        DetailSummary {
            title: self.record.fields.title.clone(),
            substrate: notes.substrate,
            diagnostic_orientation: notes.diagnostic_orientation,
        }
    }
}
