use saisonxform_core::{AttendeeRecord, AttendeeRoster};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use crate::encoding;

/// File name of the attendee reference inside the reference directory.
pub const NAMELIST_FILE: &str = "NameList.csv";

#[derive(Error, Debug)]
pub enum RosterError {
    #[error("Attendee list not found: {0}")]
    NotFound(PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Could not decode attendee list {0}")]
    Decode(PathBuf),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Loads `ID,Name,Title,Company` rows. Rows with a blank ID are skipped;
/// the other columns may be absent.
pub fn load_roster(path: &Path) -> Result<AttendeeRoster, RosterError> {
    let bytes = fs::read(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => RosterError::NotFound(path.to_path_buf()),
        _ => RosterError::Io(e),
    })?;

    let detection = encoding::detect(&bytes);
    let (text, used) = encoding::decode_with_fallback(&bytes, detection.encoding)
        .ok_or_else(|| RosterError::Decode(path.to_path_buf()))?;

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(text.trim_start_matches('\u{feff}').as_bytes());

    let mut records = Vec::new();
    for result in reader.deserialize::<AttendeeRecord>() {
        let record = result?;
        if record.id.is_empty() {
            warn!(file = %path.display(), "attendee row without ID skipped");
            continue;
        }
        records.push(record);
    }

    debug!(file = %path.display(), encoding = %used, attendees = records.len(), "loaded roster");
    Ok(AttendeeRoster::new(records))
}
