//! Gut microbiota panels: an ordered list of heterogeneous blocks.

use serde_json::Value;

use super::values::{optional_string_field, string_field};
use super::{ParsedReport, PdfLookup};
use crate::models::{
    ClinicalParameters, LabPayload, MicrobiotaBlock, MicrobiotaItem, MicrobiotaPanel,
};

const RESILIENCE_BLOCK: &str = "Indice Resiliencia";
const FODMAP_BLOCK: &str = "FODMAP";
const CLINICAL_BLOCK: &str = "Parámetros Clínicos";

/// Build the report for a JSON document without `valores`.
/// Blocks are the elements of a top-level array or the values of a top-level object.
pub fn parse_microbiota(doc: &Value) -> ParsedReport {
    let blocks: Vec<&Value> = match doc {
        Value::Array(items) => items.iter().collect(),
        Value::Object(map) => map.values().collect(),
        _ => Vec::new(),
    };

    ParsedReport {
        origin_id: string_field(doc, "num_peticion_procedencia"),
        secondary_id: string_field(doc, "num_peticion_calderon"),
        patient_name: string_field(doc, "paciente_nombre"),
        doctor_name: string_field(doc, "doctor_nombre"),
        clinical_notes: None,
        payload: LabPayload::Microbiota(extract_panel(&blocks)),
        pdf_lookup: PdfLookup::None,
    }
}

/// Special block names match case-sensitively; blocks neither special nor carrying
/// an `items` array are skipped.
pub fn extract_panel(blocks: &[&Value]) -> MicrobiotaPanel {
    let mut panel = MicrobiotaPanel::default();

    for block in blocks {
        if !block.is_object() {
            continue;
        }

        if let Some(items) = block.get("items").and_then(Value::as_array) {
            panel.blocks.push(MicrobiotaBlock {
                name: string_field(block, "nombre"),
                description: string_field(block, "descripcion"),
                items: items.iter().map(parse_item).collect(),
            });
        }

        match block.get("nombre").and_then(Value::as_str) {
            Some(RESILIENCE_BLOCK) => panel.resilience_index = optional_string_field(block, "valor"),
            Some(FODMAP_BLOCK) => panel.fodmap_value = optional_string_field(block, "valor"),
            Some(CLINICAL_BLOCK) => {
                panel.clinical_parameters = block.get("valores").and_then(parse_clinical_parameters)
            }
            _ => {}
        }
    }

    panel
}

fn parse_item(item: &Value) -> MicrobiotaItem {
    MicrobiotaItem {
        name: string_field(item, "nombre"),
        result: string_field(item, "resultado"),
        unit: string_field(item, "unidad"),
        interpretation: string_field(item, "interpretacion"),
        reference_range: string_field(item, "valores_ref"),
        method: string_field(item, "metodo"),
    }
}

// Empty or non-mapping `valores` leaves the clinical parameters unset.
fn parse_clinical_parameters(valores: &Value) -> Option<ClinicalParameters> {
    let map = valores.as_object()?;
    if map.is_empty() {
        return None;
    }

    let ph = valores.get("ph").unwrap_or(&Value::Null);
    let stool = valores.get("consistencia_heces").unwrap_or(&Value::Null);

    Some(ClinicalParameters {
        stool_consistency: string_field(stool, "valor"),
        ph_value: string_field(ph, "valor"),
        ph_interpretation: string_field(ph, "interpretacion"),
        ph_reference_range: string_field(ph, "valores_ref"),
        ph_method: string_field(ph, "metodo"),
    })
}
