use std::path::{Path, PathBuf};

use uuid::Uuid;

use super::discovery::{list_pdf_files, relocate};
use super::{ParsedLabTest, PdfLookup};
use crate::config::IngestConfig;
use crate::store::LabRecordStore;

/// A companion PDF moved to the destination directory and linked to its record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfLink {
    pub file_name: String,
    pub url: String,
}

/// Find, move and link the companion PDF of a freshly upserted record.
///
/// Every failure here degrades to "no PDF linked"; it never fails the source file.
pub fn link_companion_pdf(
    store: &dyn LabRecordStore,
    config: &IngestConfig,
    parsed: &ParsedLabTest,
    record_id: &Uuid,
) -> Option<PdfLink> {
    let watch_dir = parsed.source_path.parent().unwrap_or(Path::new("."));

    let candidates = match &parsed.report.pdf_lookup {
        PdfLookup::None => return None,
        PdfLookup::SameStem => same_stem_candidate(&parsed.source_path),
        PdfLookup::PatientNumber(number) => patient_number_candidates(watch_dir, number),
    };

    // First candidate that relocates wins. With several matching names the choice
    // depends on name order only.
    let moved = candidates.into_iter().find_map(|candidate| {
        match relocate(&candidate, &config.pdf_dest_dir) {
            Ok(dest) => Some(dest),
            Err(e) => {
                tracing::warn!(
                    pdf = %candidate.display(),
                    error = %e,
                    "Could not relocate companion PDF"
                );
                None
            }
        }
    })?;

    let file_name = moved.file_name()?.to_string_lossy().into_owned();
    let url = config.pdf_url(&file_name);
    if let Err(e) = store.set_pdf_url(record_id, &url) {
        tracing::warn!(record_id = %record_id, error = %e, "Could not store PDF link");
        return None;
    }

    tracing::info!(record_id = %record_id, pdf = %file_name, "Companion PDF linked");
    Some(PdfLink { file_name, url })
}

fn same_stem_candidate(source: &Path) -> Vec<PathBuf> {
    let candidate = source.with_extension("pdf");
    if candidate.is_file() {
        vec![candidate]
    } else {
        Vec::new()
    }
}

fn patient_number_candidates(watch_dir: &Path, number: &str) -> Vec<PathBuf> {
    let pdfs = match list_pdf_files(watch_dir) {
        Ok(pdfs) => pdfs,
        Err(e) => {
            tracing::warn!(dir = %watch_dir.display(), error = %e, "Could not list PDFs");
            return Vec::new();
        }
    };
    pdfs.into_iter()
        .filter(|p| {
            p.file_name()
                .is_some_and(|n| n.to_string_lossy().contains(number))
        })
        .collect()
}
