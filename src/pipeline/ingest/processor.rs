//! Batch entry point shared by the on-demand and periodic triggers.
//!
//! One run takes the run lock, enumerates the watch directory and processes each
//! input file to completion before the next: parse → resolve → upsert → link PDF →
//! archive → log. Per-file failures are values aggregated into the summary.

use std::path::{Path, PathBuf};

use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::discovery::{ensure_output_dirs, list_pending_files, relocate};
use super::format::parse_source;
use super::identity::resolve_identity;
use super::pdf::link_companion_pdf;
use super::run_log::{record_outcome, FileOutcome};
use super::upsert::upsert_record;
use super::{IngestError, InputFormat, PdfLookup};
use crate::config::IngestConfig;
use crate::models::enums::LogStatus;
use crate::store::LabRecordStore;

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Summary of one batch run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub directory: PathBuf,
    pub found: usize,
    pub created: usize,
    pub updated: usize,
    pub errors: usize,
    /// Per-file outcomes in processing order.
    pub files: Vec<FileOutcome>,
}

impl RunSummary {
    fn new(directory: &Path, found: usize) -> Self {
        Self {
            directory: directory.to_path_buf(),
            found,
            created: 0,
            updated: 0,
            errors: 0,
            files: Vec::with_capacity(found),
        }
    }

    fn tally(&mut self, outcome: FileOutcome) {
        match outcome.status {
            LogStatus::Created => self.created += 1,
            LogStatus::Updated => self.updated += 1,
            LogStatus::Error => self.errors += 1,
        }
        self.files.push(outcome);
    }
}

// ---------------------------------------------------------------------------
// Run lock
// ---------------------------------------------------------------------------

/// Holds the store-backed run lock; releases it on drop.
struct RunLockGuard<'a> {
    store: &'a dyn LabRecordStore,
    holder: String,
}

impl<'a> RunLockGuard<'a> {
    fn acquire(store: &'a dyn LabRecordStore, ttl_secs: u64) -> Result<Self, IngestError> {
        let holder = Uuid::new_v4().to_string();
        let now = chrono::Local::now().naive_local();
        let ttl = i64::try_from(ttl_secs).unwrap_or(i64::MAX);
        if !store.try_acquire_run_lock(&holder, &now, ttl)? {
            return Err(IngestError::RunInProgress);
        }
        Ok(Self { store, holder })
    }
}

impl Drop for RunLockGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.store.release_run_lock(&self.holder) {
            tracing::warn!(error = %e, "Failed to release run lock");
        }
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Process every pending file of the watch directory.
///
/// Fails before touching any file when the run lock is held, the CSV encoding label
/// is unknown, or the watch directory cannot be enumerated.
pub fn run_batch(
    store: &dyn LabRecordStore,
    config: &IngestConfig,
) -> Result<RunSummary, IngestError> {
    let _lock = RunLockGuard::acquire(store, config.run_lock_ttl_secs)?;

    let csv_encoding = Encoding::for_label(config.csv_encoding.as_bytes()).ok_or_else(|| {
        IngestError::Encoding(format!("unknown CSV encoding label: {}", config.csv_encoding))
    })?;

    ensure_output_dirs(config)?;
    let files = list_pending_files(&config.watch_dir)?;

    tracing::info!(
        dir = %config.watch_dir.display(),
        found = files.len(),
        "Ingestion run started"
    );

    let mut summary = RunSummary::new(&config.watch_dir, files.len());
    for path in &files {
        let outcome = process_file(store, config, csv_encoding, path);
        record_outcome(store, &outcome, config.log_capacity);
        summary.tally(outcome);
    }

    store.set_last_run(&chrono::Local::now().naive_local())?;

    tracing::info!(
        found = summary.found,
        created = summary.created,
        updated = summary.updated,
        errors = summary.errors,
        "Ingestion run finished"
    );
    Ok(summary)
}

/// Handle one file inside its own failure boundary. The file always leaves the watch
/// directory for exactly one of `processed/` or `error/`.
fn process_file(
    store: &dyn LabRecordStore,
    config: &IngestConfig,
    csv_encoding: &'static Encoding,
    path: &Path,
) -> FileOutcome {
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let outcome = match ingest_file(store, config, csv_encoding, path) {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::warn!(file = %filename, error = %e, "Lab file rejected");
            archive_as_error(path, config, &filename);
            return FileOutcome::error(filename, e.to_string());
        }
    };

    match relocate(path, &config.processed_dir()) {
        Ok(_) => outcome,
        Err(e) => {
            tracing::warn!(file = %filename, error = %e, "Could not archive processed file");
            archive_as_error(path, config, &filename);
            FileOutcome {
                status: LogStatus::Error,
                message: format!("record saved but file could not be archived: {e}"),
                ..outcome
            }
        }
    }
}

fn ingest_file(
    store: &dyn LabRecordStore,
    config: &IngestConfig,
    csv_encoding: &'static Encoding,
    path: &Path,
) -> Result<FileOutcome, IngestError> {
    let raw = std::fs::read(path)?;
    let parsed = parse_source(path, raw, csv_encoding)?;

    let resolution = resolve_identity(
        store,
        &parsed.report.origin_id,
        &parsed.report.secondary_id,
        &parsed.content_hash,
    );
    let saved = upsert_record(store, resolution, &parsed)?;
    let pdf = link_companion_pdf(store, config, &parsed, &saved.record_id);

    let kind = InputFormat::from_path(path)
        .map(|f| f.as_str().to_ascii_uppercase())
        .unwrap_or_default();
    let message = match (&parsed.report.pdf_lookup, pdf) {
        (PdfLookup::None, _) => format!("{kind} processed"),
        (_, Some(link)) => format!("{kind} processed; PDF linked: {}", link.file_name),
        (_, None) => format!("{kind} processed; no PDF linked"),
    };

    Ok(FileOutcome {
        filename: parsed.file_name.clone(),
        status: if saved.created { LogStatus::Created } else { LogStatus::Updated },
        record_id: Some(saved.record_id),
        category: Some(parsed.category()),
        message,
    })
}

fn archive_as_error(path: &Path, config: &IngestConfig, filename: &str) {
    if !path.exists() {
        return;
    }
    if let Err(e) = relocate(path, &config.error_dir()) {
        tracing::warn!(file = %filename, error = %e, "Could not move file to error location");
    }
}
