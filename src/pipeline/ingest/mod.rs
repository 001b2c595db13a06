//! Lab result ingestion: discover dropped files, parse them, upsert records,
//! link companion PDFs, log outcomes and archive the sources.

pub mod discovery;
pub mod format;
pub mod gas;
pub mod hash;
pub mod identity;
pub mod microbiota;
pub mod pdf;
pub mod processor;
pub mod run_log;
pub mod sensitivity;
pub mod upsert;
mod values;

pub use discovery::*;
pub use format::*;
pub use hash::*;
pub use identity::*;
pub use pdf::*;
pub use processor::*;
pub use run_log::*;
pub use upsert::*;

use std::path::PathBuf;

use thiserror::Error;

use crate::db::DatabaseError;
use crate::models::enums::TestCategory;
use crate::models::{ClinicalNotes, LabPayload};

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Persistence error: {0}")]
    Persistence(#[from] DatabaseError),

    #[error("Another ingestion run holds the run lock")]
    RunInProgress,
}

/// How the companion PDF of a record is found in the watch directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PdfLookup {
    /// No companion PDF for this category.
    None,
    /// `<source stem>.pdf`.
    SameStem,
    /// First PDF whose filename contains the patient number.
    PatientNumber(String),
}

/// Format-independent content extracted by one parser.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedReport {
    pub origin_id: String,
    pub secondary_id: String,
    pub patient_name: String,
    pub doctor_name: String,
    pub clinical_notes: Option<ClinicalNotes>,
    pub payload: LabPayload,
    pub pdf_lookup: PdfLookup,
}

impl ParsedReport {
    pub fn category(&self) -> TestCategory {
        self.payload.category()
    }
}

/// A parsed report plus the provenance of its source file.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedLabTest {
    pub report: ParsedReport,
    pub source_path: PathBuf,
    pub file_name: String,
    /// Exact bytes read from disk.
    pub raw: Vec<u8>,
    /// Lowercase hex SHA-256 of `raw`.
    pub content_hash: String,
}

impl ParsedLabTest {
    pub fn category(&self) -> TestCategory {
        self.report.category()
    }
}
