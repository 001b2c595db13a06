use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::format::InputFormat;
use crate::config::IngestConfig;

/// Create the processed, error and PDF destination directories if absent.
pub fn ensure_output_dirs(config: &IngestConfig) -> io::Result<()> {
    for dir in [config.processed_dir(), config.error_dir(), config.pdf_dest_dir.clone()] {
        fs::create_dir_all(&dir)?;
    }
    Ok(())
}

/// Regular files directly inside `dir` with a `.json`/`.csv` extension, sorted by name.
pub fn list_pending_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    list_files(dir, |path| InputFormat::from_path(path).is_some())
}

/// Loose PDFs directly inside `dir`, sorted by name.
pub fn list_pdf_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    list_files(dir, |path| {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
    })
}

fn list_files(dir: &Path, accept: impl Fn(&Path) -> bool) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        if accept(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Move `source` into `dest_dir` under the same file name.
/// Falls back to copy-then-remove when rename fails (e.g. across filesystems).
pub fn relocate(source: &Path, dest_dir: &Path) -> io::Result<PathBuf> {
    let file_name = source.file_name().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "source path has no file name")
    })?;
    let dest = dest_dir.join(file_name);

    if fs::rename(source, &dest).is_ok() {
        return Ok(dest);
    }

    copy_then_remove(source, &dest)?;
    Ok(dest)
}

// On any failure the source stays put and no partial copy is left at `dest`.
fn copy_then_remove(source: &Path, dest: &Path) -> io::Result<()> {
    if let Err(e) = fs::copy(source, dest) {
        let _ = fs::remove_file(dest);
        return Err(e);
    }
    if let Err(e) = fs::remove_file(source) {
        let _ = fs::remove_file(dest);
        return Err(e);
    }
    Ok(())
}
