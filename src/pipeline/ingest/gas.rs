//! Gas breath test (SIBO) documents.

use serde_json::Value;

use super::values::{coerce_gas_value, string_field};
use super::{ParsedReport, PdfLookup};
use crate::models::{ClinicalNotes, GasMeasurement, LabPayload};

/// Indexed slots `h2_N`, `ch4_N`, `co2_N` run from 1 to this bound.
pub const MAX_TIME_POINTS: u32 = 50;

/// Build the report for a document carrying a `valores` mapping.
pub fn parse_gas_breath_test(doc: &Value, valores: &Value) -> ParsedReport {
    let notes = ClinicalNotes {
        substrate: string_field(doc, "sustrato"),
        conclusion: string_field(doc, "conclusion"),
        diagnostic_orientation: string_field(doc, "orientacion_diagnostico"),
        comments: string_field(doc, "comentarios"),
    };

    ParsedReport {
        origin_id: string_field(doc, "num_peticion_procedencia"),
        secondary_id: string_field(doc, "num_peticion_calderon"),
        patient_name: string_field(doc, "paciente_nombre"),
        doctor_name: string_field(doc, "doctor_nombre"),
        clinical_notes: Some(notes),
        payload: LabPayload::GasSeries(extract_gas_series(valores)),
        pdf_lookup: PdfLookup::SameStem,
    }
}

/// Walk slots 1..=50. A missing slot 1 is skipped; the first missing slot after it ends
/// the series. A key holding null counts as present with an absent value.
pub fn extract_gas_series(valores: &Value) -> Vec<GasMeasurement> {
    let Some(slots) = valores.as_object() else {
        return Vec::new();
    };

    let mut series = Vec::new();
    for time_point in 1..=MAX_TIME_POINTS {
        let h2 = slots.get(&format!("h2_{time_point}"));
        let ch4 = slots.get(&format!("ch4_{time_point}"));
        let co2 = slots.get(&format!("co2_{time_point}"));

        if h2.is_none() && ch4.is_none() && co2.is_none() {
            if time_point > 1 {
                break;
            }
            continue;
        }

        series.push(GasMeasurement {
            time_point,
            h2: h2.and_then(coerce_gas_value),
            ch4: ch4.and_then(coerce_gas_value),
            co2: co2.and_then(coerce_gas_value),
        });
    }
    series
}

/// `valores` as an object or array marks a gas breath test.
pub fn gas_values(doc: &Value) -> Option<&Value> {
    doc.get("valores")
        .filter(|v| v.is_object() || v.is_array())
}
