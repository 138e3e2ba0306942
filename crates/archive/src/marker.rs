use chrono::{Local, NaiveDateTime};
use saisonxform_core::MonthKey;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

const MARKER_PREFIX: &str = ".retry_";
const MARKER_SUFFIX: &str = ".json";

#[derive(Debug, Error)]
pub enum MarkerError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Malformed retry marker {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Failures left over from the most recent run that touched a month.
///
/// `failed_files[i]` failed with `errors[i]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryMarker {
    pub month: MonthKey,
    pub failed_files: Vec<String>,
    pub errors: Vec<String>,
    pub timestamp: NaiveDateTime,
}

pub fn marker_path(archive_dir: &Path, month: MonthKey) -> PathBuf {
    archive_dir.join(format!("{MARKER_PREFIX}{month}{MARKER_SUFFIX}"))
}

pub fn has_retry_marker(archive_dir: &Path, month: MonthKey) -> bool {
    marker_path(archive_dir, month).is_file()
}

/// Removes the month's marker. Returns whether one existed.
pub fn delete_retry_marker(archive_dir: &Path, month: MonthKey) -> Result<bool, MarkerError> {
    let path = marker_path(archive_dir, month);
    match fs::remove_file(&path) {
        Ok(()) => {
            debug!(marker = %path.display(), "retry marker removed");
            Ok(true)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(source) => Err(MarkerError::Io { path, source }),
    }
}

/// Months that currently carry a retry marker, ascending.
pub fn retry_markers(archive_dir: &Path) -> Result<Vec<MonthKey>, MarkerError> {
    let io_err = |source| MarkerError::Io { path: archive_dir.to_path_buf(), source };
    let entries = match fs::read_dir(archive_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(io_err(e)),
    };

    let mut months = Vec::new();
    for entry in entries {
        let name = entry.map_err(io_err)?.file_name();
        let month = name
            .to_str()
            .and_then(|n| n.strip_prefix(MARKER_PREFIX))
            .and_then(|n| n.strip_suffix(MARKER_SUFFIX))
            .and_then(MonthKey::parse);
        months.extend(month);
    }
    months.sort();
    Ok(months)
}

impl RetryMarker {
    /// A marker stamped with the current local time.
    pub fn new(month: MonthKey, failures: Vec<(String, String)>) -> Self {
        let (failed_files, errors) = failures.into_iter().unzip();
        Self {
            month,
            failed_files,
            errors,
            timestamp: Local::now().naive_local(),
        }
    }

    /// `(file, error)` pairs; unmatched trailing entries are dropped.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &str)> {
        self.failed_files
            .iter()
            .map(String::as_str)
            .zip(self.errors.iter().map(String::as_str))
    }

    /// Creates or replaces the month's marker. The JSON goes to a temporary
    /// file first and is renamed into place, so readers never see a torn write.
    pub fn write(&self, archive_dir: &Path) -> Result<PathBuf, MarkerError> {
        let path = marker_path(archive_dir, self.month);
        let tmp_path = archive_dir.join(format!("{MARKER_PREFIX}{}{MARKER_SUFFIX}.tmp", self.month));
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| MarkerError::Io { path, source }
        };

        fs::create_dir_all(archive_dir).map_err(io_err(archive_dir))?;
        let tmp = fs::File::create(&tmp_path).map_err(io_err(&tmp_path))?;
        if let Err(e) = self.write_json(tmp, &tmp_path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }

        if let Err(source) = fs::rename(&tmp_path, &path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(MarkerError::Io { path, source });
        }
        debug!(marker = %path.display(), failures = self.failed_files.len(), "retry marker written");
        Ok(path)
    }

    fn write_json<W: Write>(&self, mut out: W, tmp_path: &Path) -> Result<(), MarkerError> {
        serde_json::to_writer_pretty(&mut out, self).map_err(|source| MarkerError::Json {
            path: tmp_path.to_path_buf(),
            source,
        })?;
        out.write_all(b"\n").map_err(|source| MarkerError::Io {
            path: tmp_path.to_path_buf(),
            source,
        })
    }

    /// The month's marker, or `None` if there is none.
    pub fn load(archive_dir: &Path, month: MonthKey) -> Result<Option<Self>, MarkerError> {
        let path = marker_path(archive_dir, month);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(MarkerError::Io { path, source }),
        };
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|source| MarkerError::Json { path, source })
    }
}
