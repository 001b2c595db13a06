//! Food sensitivity CSV exports.
//!
//! The export is a `key,value` header section followed by a wide result table that
//! starts after the row whose first cell contains `FOOD (English)`.

use std::borrow::Cow;

use encoding_rs::Encoding;

use super::{IngestError, ParsedReport, PdfLookup};
use crate::models::{LabPayload, SensitivityPanel, SensitivityRow, SensitivitySummary};

const TABLE_MARKER: &str = "food (english)";

/// Decode the export from its declared legacy encoding.
pub fn transcode(raw: &[u8], encoding: &'static Encoding) -> Result<String, IngestError> {
    encoding
        .decode_without_bom_handling_and_without_replacement(raw)
        .map(Cow::into_owned)
        .ok_or_else(|| {
            IngestError::Encoding(format!("content is not valid {}", encoding.name()))
        })
}

pub fn parse_sensitivity(raw: &[u8], encoding: &'static Encoding) -> Result<ParsedReport, IngestError> {
    let text = transcode(raw, encoding)?;
    parse_sensitivity_text(&text)
}

#[derive(Default)]
struct Header {
    first_name: String,
    second_name: String,
    kit_lot: String,
    slide_lot: String,
    doctor: String,
    patient_number: String,
    summary: SensitivitySummary,
}

impl Header {
    // A key may match several labels; every match applies.
    fn absorb(&mut self, key: &str, value: &str) {
        let key = key.to_lowercase();
        let targets: [(&str, &mut String); 10] = [
            ("1st name", &mut self.first_name),
            ("2nd name", &mut self.second_name),
            ("kit lot", &mut self.kit_lot),
            ("slide lot", &mut self.slide_lot),
            ("doctor", &mut self.doctor),
            ("patient number:", &mut self.patient_number),
            ("total foods:", &mut self.summary.total_foods),
            ("total elevated:", &mut self.summary.total_elevated),
            ("total borderline:", &mut self.summary.total_borderline),
            ("total normal:", &mut self.summary.total_normal),
        ];
        for (label, slot) in targets {
            if key.contains(label) {
                *slot = value.to_string();
            }
        }
    }
}

/// Parse already-decoded export text.
pub fn parse_sensitivity_text(text: &str) -> Result<ParsedReport, IngestError> {
    if text.trim().is_empty() {
        return Err(IngestError::Parse("empty CSV export".into()));
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut header = Header::default();
    let mut rows = Vec::new();
    let mut in_table = false;

    for record in reader.records() {
        let record = record.map_err(|e| IngestError::Parse(format!("malformed CSV: {e}")))?;
        let cells: Vec<String> = record.iter().map(clean_cell).collect();
        let Some(key) = cells.first() else {
            continue;
        };

        if !in_table {
            let value = cells.get(1).map(String::as_str).unwrap_or("");
            header.absorb(key, value);
        }

        if key.to_lowercase().contains(TABLE_MARKER) {
            in_table = true;
            continue;
        }

        if in_table && !key.is_empty() {
            rows.push(table_row(&cells));
        }
    }

    let patient_name = format!("{} {}", header.first_name, header.second_name)
        .trim()
        .to_string();
    let pdf_lookup = if header.patient_number.is_empty() {
        PdfLookup::None
    } else {
        PdfLookup::PatientNumber(header.patient_number)
    };

    Ok(ParsedReport {
        origin_id: header.kit_lot,
        secondary_id: header.slide_lot,
        patient_name,
        doctor_name: header.doctor,
        clinical_notes: None,
        payload: LabPayload::Sensitivity(SensitivityPanel {
            rows,
            summary: header.summary,
        }),
        pdf_lookup,
    })
}

// Parameter falls back to the first column when the second is empty.
fn table_row(cells: &[String]) -> SensitivityRow {
    let cell = |i: usize| cells.get(i).cloned().unwrap_or_default();
    let parameter = match cell(1) {
        p if p.is_empty() => cell(0),
        p => p,
    };
    SensitivityRow {
        parameter,
        value: cell(4),
        reference_range: cell(5),
    }
}

/// Strip byte-order marks (also their Windows-1252 mojibake) and surrounding whitespace.
fn clean_cell(cell: &str) -> String {
    cell.replace('\u{FEFF}', "")
        .replace("\u{EF}\u{BB}\u{BF}", "")
        .trim()
        .to_string()
}
