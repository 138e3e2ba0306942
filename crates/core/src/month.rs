use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

pub const MIN_YEAR: u16 = 1900;
pub const MAX_YEAR: u16 = 2100;

/// A statement month in `YYYYMM` form.
///
/// Ordering is chronological, which for the fixed-width text form is the
/// same as lexicographic ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MonthKey {
    year: u16,
    month: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid month key: '{0}' (expected YYYYMM, year 1900-2100, month 01-12)")]
pub struct MonthKeyError(pub String);

impl MonthKey {
    pub fn new(year: u16, month: u8) -> Option<Self> {
        if (MIN_YEAR..=MAX_YEAR).contains(&year) && (1..=12).contains(&month) {
            Some(MonthKey { year, month })
        } else {
            None
        }
    }

    /// Parses an exact six-digit key such as a directory name or a `--month` value.
    pub fn parse(s: &str) -> Option<Self> {
        let bytes = s.as_bytes();
        if bytes.len() != 6 || !bytes.iter().all(u8::is_ascii_digit) {
            return None;
        }
        Self::from_digits(bytes)
    }

    /// Extracts the month from a `YYYYMM_` filename prefix.
    pub fn from_filename(name: &str) -> Option<Self> {
        let bytes = name.as_bytes();
        if bytes.len() < 7 || bytes[6] != b'_' || !bytes[..6].iter().all(u8::is_ascii_digit) {
            return None;
        }
        Self::from_digits(&bytes[..6])
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.file_name()
            .and_then(|n| n.to_str())
            .and_then(Self::from_filename)
    }

    fn from_digits(digits: &[u8]) -> Option<Self> {
        let value = |range: std::ops::Range<usize>| {
            digits[range]
                .iter()
                .fold(0u16, |acc, d| acc * 10 + u16::from(d - b'0'))
        };
        let year = value(0..4);
        let month = value(4..6);
        Self::new(year, month as u8)
    }

    pub fn year(self) -> u16 {
        self.year
    }

    pub fn month(self) -> u8 {
        self.month
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}{:02}", self.year, self.month)
    }
}

impl FromStr for MonthKey {
    type Err = MonthKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s.trim()).ok_or_else(|| MonthKeyError(s.to_string()))
    }
}

impl TryFrom<String> for MonthKey {
    type Error = MonthKeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MonthKey> for String {
    fn from(key: MonthKey) -> Self {
        key.to_string()
    }
}

/// Lists the `*.csv` files directly inside `dir`, sorted by file name.
/// A missing directory yields an empty list.
pub fn csv_files_in(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        let is_csv = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
        if is_csv {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Returns the `n` latest distinct months found among the CSV files in `dir`,
/// latest first.
pub fn latest_months(dir: &Path, n: usize) -> io::Result<Vec<MonthKey>> {
    let months: BTreeSet<MonthKey> = csv_files_in(dir)?
        .iter()
        .filter_map(|p| MonthKey::from_path(p))
        .collect();
    Ok(months.into_iter().rev().take(n).collect())
}

/// Keeps the files whose month prefix is one of `months`.
///
/// An empty `months` slice means "no filter": every file passes through.
pub fn filter_by_months(files: &[PathBuf], months: &[MonthKey]) -> Vec<PathBuf> {
    if months.is_empty() {
        return files.to_vec();
    }
    let wanted: BTreeSet<MonthKey> = months.iter().copied().collect();
    files
        .iter()
        .filter(|p| MonthKey::from_path(p).is_some_and(|m| wanted.contains(&m)))
        .cloned()
        .collect()
}
