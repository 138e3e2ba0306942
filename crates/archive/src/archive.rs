use chrono::Local;
use saisonxform_core::MonthKey;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::marker;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Source file does not exist: {0}")]
    SourceMissing(PathBuf),
    #[error("Could not create archive directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to archive {file}: move failed ({move_error}); copy fallback failed ({copy_error})")]
    Failed {
        file: String,
        move_error: String,
        copy_error: String,
    },
}

/// Where a month's archive lives relative to the archive root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonthState {
    /// No `Archive/<month>/` directory.
    Unarchived,
    /// Directory present, no retry marker.
    ArchivedClean,
    /// Directory present, last run left failures behind.
    ArchivedWithRetry,
}

pub fn month_dir(archive_dir: &Path, month: MonthKey) -> PathBuf {
    archive_dir.join(month.to_string())
}

pub fn month_state(archive_dir: &Path, month: MonthKey) -> MonthState {
    if !month_dir(archive_dir, month).is_dir() {
        MonthState::Unarchived
    } else if marker::has_retry_marker(archive_dir, month) {
        MonthState::ArchivedWithRetry
    } else {
        MonthState::ArchivedClean
    }
}

/// Months with an `Archive/<YYYYMM>/` directory, ascending. Retry markers
/// are not consulted; other entries are ignored.
pub fn archived_months(archive_dir: &Path) -> io::Result<Vec<MonthKey>> {
    let entries = match fs::read_dir(archive_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut months = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        if let Some(month) = entry.file_name().to_str().and_then(MonthKey::parse) {
            months.push(month);
        }
    }
    months.sort();
    Ok(months)
}

// ── Moving files ──────────────────────────────────────────────────────────────

/// The filesystem primitives archival needs; swapped out in tests to
/// exercise the fallback paths.
pub trait FileOps {
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;
    fn copy(&self, from: &Path, to: &Path) -> io::Result<()>;
    fn remove(&self, path: &Path) -> io::Result<()>;
}

pub struct LocalFs;

impl FileOps for LocalFs {
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn copy(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::copy(from, to).map(|_| ())
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }
}

/// Moves `file` into `Archive/<month>/`, returning its new path.
pub fn archive_file(file: &Path, archive_dir: &Path, month: MonthKey) -> Result<PathBuf, ArchiveError> {
    archive_file_with(&LocalFs, file, archive_dir, month)
}

/// Rename first; when that fails (e.g. across devices) copy then delete the
/// source. The source is never left behind alongside a copy.
pub fn archive_file_with<F: FileOps + ?Sized>(
    ops: &F,
    file: &Path,
    archive_dir: &Path,
    month: MonthKey,
) -> Result<PathBuf, ArchiveError> {
    if !file.is_file() {
        return Err(ArchiveError::SourceMissing(file.to_path_buf()));
    }

    let dir = month_dir(archive_dir, month);
    fs::create_dir_all(&dir).map_err(|source| ArchiveError::CreateDir {
        path: dir.clone(),
        source,
    })?;

    let name = file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();
    let dest = free_destination(&dir, &name);

    let move_error = match ops.rename(file, &dest) {
        Ok(()) => {
            info!(file = %name, dest = %dest.display(), "archived");
            return Ok(dest);
        }
        Err(e) => e,
    };
    debug!(file = %name, "rename failed ({move_error}); falling back to copy");

    let failed = |copy_error: String| ArchiveError::Failed {
        file: name.clone(),
        move_error: move_error.to_string(),
        copy_error,
    };

    if let Err(e) = ops.copy(file, &dest) {
        return Err(failed(e.to_string()));
    }
    if let Err(e) = ops.remove(file) {
        if let Err(cleanup) = ops.remove(&dest) {
            warn!(dest = %dest.display(), "could not remove partial archive copy: {cleanup}");
        }
        return Err(failed(format!("copied but could not remove source: {e}")));
    }

    info!(file = %name, dest = %dest.display(), "archived by copy");
    Ok(dest)
}

/// `dir/name` if free, else `<stem>_<YYYYmmdd_HHMMSS_ffffff><ext>`, with a
/// numeric suffix on top should even that be taken.
fn free_destination(dir: &Path, name: &str) -> PathBuf {
    let plain = dir.join(name);
    if !plain.exists() {
        return plain;
    }

    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, format!(".{ext}")),
        _ => (name, String::new()),
    };
    let stamp = Local::now().format("%Y%m%d_%H%M%S_%6f");
    let stamped = dir.join(format!("{stem}_{stamp}{ext}"));
    if !stamped.exists() {
        return stamped;
    }
    (2u32..)
        .map(|n| dir.join(format!("{stem}_{stamp}_{n}{ext}")))
        .find(|p| !p.exists())
        .unwrap_or(stamped)
}
