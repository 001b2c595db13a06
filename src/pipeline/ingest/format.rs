use std::path::Path;

use encoding_rs::Encoding;
use serde_json::Value;

use super::gas::{gas_values, parse_gas_breath_test};
use super::hash::content_hash;
use super::microbiota::parse_microbiota;
use super::sensitivity::parse_sensitivity;
use super::{IngestError, ParsedLabTest, ParsedReport};

/// Input formats accepted from the watch directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Json,
    Csv,
}

impl InputFormat {
    /// Case-insensitive extension match; anything else is not an input file.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "json" => Some(Self::Json),
            "csv" => Some(Self::Csv),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
        }
    }
}

/// Parse the bytes of one input file into a lab test with provenance.
pub fn parse_source(
    path: &Path,
    raw: Vec<u8>,
    csv_encoding: &'static Encoding,
) -> Result<ParsedLabTest, IngestError> {
    let format = InputFormat::from_path(path).ok_or_else(|| {
        IngestError::Parse(format!("unsupported input file: {}", path.display()))
    })?;

    let report = match format {
        InputFormat::Json => parse_json_report(&raw)?,
        InputFormat::Csv => parse_sensitivity(&raw, csv_encoding)?,
    };

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    Ok(ParsedLabTest {
        report,
        source_path: path.to_path_buf(),
        file_name,
        content_hash: content_hash(&raw),
        raw,
    })
}

/// Decode a lab JSON document and pick its parser.
///
/// Category is inferred structurally: a `valores` object or array means a gas breath
/// test, anything else is read as a microbiota panel. Nothing positively identifies a
/// microbiota document, so a third JSON-shaped category would be misfiled as microbiota.
pub fn parse_json_report(raw: &[u8]) -> Result<ParsedReport, IngestError> {
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Err(IngestError::Parse("empty or unreadable file".into()));
    }

    let doc: Value =
        serde_json::from_slice(raw).map_err(|e| IngestError::Parse(format!("invalid JSON: {e}")))?;
    if !doc.is_object() && !doc.is_array() {
        return Err(IngestError::Parse("JSON document is not a mapping or list".into()));
    }

    Ok(match gas_values(&doc) {
        Some(valores) => parse_gas_breath_test(&doc, valores),
        None => parse_microbiota(&doc),
    })
}
