use chrono::NaiveDate;
use rust_decimal::Decimal;
use saisonxform_core::{AttendeeSlots, TransactionRow, Yen};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, warn};

use crate::diagnostic::Diagnostic;
use crate::encoding::{self, CharsetAnalyzer, StatisticalAnalyzer, TextEncoding, UTF8_BOM};
use crate::header::{self, ColumnMap, REQUIRED_COLUMNS};

/// Header text plus data rows, every row exactly as wide as the header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatementTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl StatementTable {
    pub fn new(headers: Vec<String>, mut rows: Vec<Vec<String>>) -> Self {
        let width = headers.len();
        for row in &mut rows {
            row.resize(width, String::new());
        }
        Self { headers, rows }
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty() && self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Index of `name`, appending a blank column if it is not there yet.
    pub fn ensure_column(&mut self, name: &str) -> usize {
        if let Some(idx) = self.column_index(name) {
            return idx;
        }
        self.headers.push(name.to_string());
        for row in &mut self.rows {
            row.push(String::new());
        }
        self.headers.len() - 1
    }

    /// Removes every column whose header is in `names`.
    pub fn drop_columns(&mut self, names: &[&str]) {
        let keep: Vec<bool> = self
            .headers
            .iter()
            .map(|h| !names.contains(&h.as_str()))
            .collect();
        if keep.iter().all(|k| *k) {
            return;
        }
        let retain = |cells: &mut Vec<String>| {
            let mut flags = keep.iter();
            cells.retain(|_| flags.next().copied().unwrap_or(true));
        };
        retain(&mut self.headers);
        for row in &mut self.rows {
            retain(row);
        }
    }

    pub fn get(&self, row: usize, col: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|cells| cells.get(col))
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn set(&mut self, row: usize, col: usize, value: impl Into<String>) {
        if let Some(cell) = self.rows.get_mut(row).and_then(|cells| cells.get_mut(col)) {
            *cell = value.into();
        }
    }
}

/// A decoded statement: table, provenance banner, and how it was read.
#[derive(Debug, Clone)]
pub struct StatementFile {
    pub path: PathBuf,
    pub encoding: TextEncoding,
    /// `None` when no header was found and line 0 was used.
    pub header_row: Option<usize>,
    /// Lines before the header, verbatim, each with its own terminator.
    pub preamble: Vec<String>,
    pub table: StatementTable,
    pub columns: ColumnMap,
    pub diagnostics: Vec<Diagnostic>,
}

impl StatementFile {
    pub fn is_empty(&self) -> bool {
        self.diagnostics.contains(&Diagnostic::EmptyInput)
    }

    /// Typed view of every data row, in table order.
    pub fn transactions(&self) -> Vec<TransactionRow> {
        (0..self.table.rows.len())
            .map(|row| transaction_view(&self.table, &self.columns, row))
            .collect()
    }
}

#[derive(Error, Debug)]
pub enum ReadError {
    #[error("File not found: {0}")]
    NotFound(PathBuf),
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Could not decode {path} with any of: {}", .tried.join(", "))]
    Decode { path: PathBuf, tried: Vec<&'static str> },
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Error, Debug)]
pub enum WriteError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Error, Debug, PartialEq)]
pub enum FieldError {
    #[error("Invalid date: {0}")]
    InvalidDate(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
}

// ── Reading ───────────────────────────────────────────────────────────────────

pub fn read_statement(path: &Path) -> Result<StatementFile, ReadError> {
    read_statement_with(&StatisticalAnalyzer, path)
}

/// Reads a card statement: charset detection with fallback, header search,
/// preamble capture, then a structural CSV parse of everything after it.
pub fn read_statement_with<A: CharsetAnalyzer + ?Sized>(
    analyzer: &A,
    path: &Path,
) -> Result<StatementFile, ReadError> {
    let bytes = fs::read(path).map_err(|source| match source.kind() {
        io::ErrorKind::NotFound => ReadError::NotFound(path.to_path_buf()),
        _ => ReadError::Io { path: path.to_path_buf(), source },
    })?;

    let mut diagnostics = Vec::new();
    let detection = encoding::detect_with(analyzer, &bytes);
    diagnostics.extend(detection.diagnostic);

    let (text, used) = encoding::decode_with_fallback(&bytes, detection.encoding).ok_or_else(|| {
        ReadError::Decode {
            path: path.to_path_buf(),
            tried: detection.encoding.chain().into_iter().map(TextEncoding::label).collect(),
        }
    })?;
    debug!(file = %path.display(), encoding = %used, "decoded statement");

    let mut file = StatementFile {
        path: path.to_path_buf(),
        encoding: used,
        header_row: None,
        preamble: Vec::new(),
        table: StatementTable::default(),
        columns: ColumnMap::default(),
        diagnostics,
    };

    if text.trim_matches(|c: char| c.is_whitespace() || c == '\u{feff}').is_empty() {
        file.diagnostics.push(Diagnostic::EmptyInput);
        log_diagnostics(&file);
        return Ok(file);
    }

    let lines: Vec<&str> = text.split_inclusive('\n').collect();
    let header_row = header::locate_header(&lines, REQUIRED_COLUMNS);
    if header_row.is_none() {
        file.diagnostics.push(Diagnostic::HeaderNotFound);
    }
    let start = header_row.unwrap_or(0);
    file.header_row = header_row;
    file.preamble = lines[..start].iter().map(|l| l.to_string()).collect();

    let offset: usize = lines[..start].iter().map(|l| l.len()).sum();
    file.table = parse_table(&text[offset..])?;
    file.columns = ColumnMap::resolve(&file.table.headers);

    let missing = file.columns.missing_required();
    if !missing.is_empty() {
        file.diagnostics.push(Diagnostic::MissingColumns(missing));
    }

    log_diagnostics(&file);
    Ok(file)
}

fn parse_table(body: &str) -> Result<StatementTable, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(body.as_bytes());

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let headers = header::normalize_headers(&headers);
    let width = headers.len();

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        if record.len() > width {
            warn!(
                line = record.position().map(|p| p.line()),
                extra = record.len() - width,
                "row wider than header; extra cells dropped"
            );
        }
        rows.push(record.iter().take(width).map(str::to_string).collect());
    }

    Ok(StatementTable::new(headers, rows))
}

fn log_diagnostics(file: &StatementFile) {
    for diagnostic in &file.diagnostics {
        warn!(file = %file.path.display(), "{diagnostic}");
    }
}

// ── Writing ───────────────────────────────────────────────────────────────────

/// First free path among `path`, `<stem>_2<ext>`, `<stem>_3<ext>`, …
pub fn unique_output_path(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{e}"))
        .unwrap_or_default();
    let parent = path.parent().unwrap_or_else(|| Path::new(""));

    (2u32..)
        .map(|n| parent.join(format!("{stem}_{n}{ext}")))
        .find(|candidate| !candidate.exists())
        .unwrap_or_else(|| path.to_path_buf())
}

/// Writes UTF-8 with a byte-order mark: preamble lines verbatim, then the
/// header and data rows. Returns the path actually written.
pub fn write_statement(
    table: &StatementTable,
    path: &Path,
    preamble: &[String],
    handle_duplicates: bool,
) -> Result<PathBuf, WriteError> {
    let target = if handle_duplicates {
        unique_output_path(path)
    } else {
        path.to_path_buf()
    };

    let mut out = UTF8_BOM.to_vec();
    for line in preamble {
        out.extend_from_slice(line.as_bytes());
        if !line.ends_with('\n') {
            out.push(b'\n');
        }
    }

    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(out);
    writer.write_record(&table.headers)?;
    for row in &table.rows {
        writer.write_record(row)?;
    }
    let out = writer.into_inner().map_err(|e| e.into_error())?;

    fs::write(&target, out)?;
    debug!(file = %target.display(), rows = table.rows.len(), "wrote statement");
    Ok(target)
}

// ── Field parsing ─────────────────────────────────────────────────────────────

/// Accepts `1,234`, `¥5,000`, `￥800円`, `(1,500)` and `△300`; the last two
/// are negative.
pub fn parse_amount(s: &str) -> Result<Yen, FieldError> {
    let s = s.trim();
    let (negative, body) = if s.starts_with('(') && s.ends_with(')') && s.len() >= 2 {
        (true, &s[1..s.len() - 1])
    } else if let Some(rest) = s.strip_prefix(['△', '▲']) {
        (true, rest)
    } else {
        (false, s)
    };
    let cleaned = body.replace([',', '¥', '￥', '円', ' ', '\u{3000}'], "");
    let mut dec =
        Decimal::from_str(&cleaned).map_err(|_| FieldError::InvalidAmount(s.to_string()))?;
    if negative {
        dec = -dec;
    }
    Ok(Yen::from_decimal(dec))
}

const DATE_FORMATS: &[&str] = &["%Y/%m/%d", "%Y-%m-%d", "%Y年%m月%d日", "%Y.%m.%d", "%Y%m%d"];

pub fn parse_date(s: &str) -> Result<NaiveDate, FieldError> {
    let s = s.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .ok_or_else(|| FieldError::InvalidDate(s.to_string()))
}

/// Typed view of one table row through a resolved column map. Cells that
/// are absent or fail to parse come back as `None` or empty.
pub fn transaction_view(table: &StatementTable, columns: &ColumnMap, row: usize) -> TransactionRow {
    let cell = |canonical: &str| -> &str {
        columns
            .get(canonical)
            .map(|col| table.get(row, col).trim())
            .unwrap_or("")
    };
    let named = |name: &str| -> &str {
        table
            .column_index(name)
            .map(|col| table.get(row, col).trim())
            .unwrap_or("")
    };

    let attendees = AttendeeSlots::column_names()
        .iter()
        .map(|name| named(name).to_string())
        .collect::<Vec<_>>();

    TransactionRow {
        date: parse_date(cell(header::DATE)).ok(),
        merchant: cell(header::MERCHANT).to_string(),
        amount: parse_amount(cell(header::AMOUNT)).ok(),
        subject: cell(header::SUBJECT).to_string(),
        attendee_count: named(header::ATTENDEE_COUNT).parse().ok(),
        attendees: AttendeeSlots::from_ids(attendees),
        remark: cell(header::REMARK).to_string(),
    }
}
