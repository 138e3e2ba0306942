//! Batch processing of the Input directory.
//!
//! One run: load the attendee roster, pick the files to process, clear them
//! with the idempotency guard, then enrich and archive each file in turn.
//! Per-file failures are recorded and the batch carries on; archival
//! failures end up in the month's retry marker.

use rand::Rng;
use saisonxform_archive::{
    archive_file, check_months, reconcile_markers, retry_markers, GuardError, GuardReport,
    MarkerAction, MarkerError, RunLedger,
};
use saisonxform_core::{
    csv_files_in, filter_by_months, latest_months, sample_ids, AttendeeRoster, AttendeeSlots,
    MonthKey, TransactionRow,
};
use saisonxform_import::{
    header, load_roster, read_statement_with, write_statement, CharsetAnalyzer, ReadError,
    RelevanceFilter, RosterError, StatisticalAnalyzer, WriteError, NAMELIST_FILE,
};
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{Config, ConfigError, DirKind};
use crate::report::{render_report, write_report};

/// Card-holder bookkeeping columns that never reach the output.
pub const DROPPED_COLUMNS: &[&str] = &["本人・家族区分", "締前入金区分"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Explicit months to process. Takes precedence over `latest`.
    pub months: Vec<MonthKey>,
    /// Process the N most recent months found in Input.
    pub latest: Option<usize>,
    /// Reprocess months that are already archived.
    pub force: bool,
    /// Move processed sources into the archive.
    pub archive: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            months: Vec::new(),
            latest: None,
            force: false,
            archive: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileStatus {
    /// Enriched CSV written. There is no report when no row was relevant.
    Processed {
        csv: PathBuf,
        html: Option<PathBuf>,
        relevant: usize,
    },
    /// Empty file; nothing written.
    Skipped,
    /// Processing or archival failed. Nothing the file produced is kept.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOutcome {
    pub file: PathBuf,
    pub month: Option<MonthKey>,
    pub status: FileStatus,
    pub archived_to: Option<PathBuf>,
}

impl FileOutcome {
    pub fn file_name(&self) -> String {
        file_name(&self.file)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub outcomes: Vec<FileOutcome>,
    pub guard: GuardReport,
    pub markers: Vec<(MonthKey, MarkerAction)>,
    /// Months still carrying a retry marker after this run.
    pub outstanding: Vec<MonthKey>,
}

impl RunSummary {
    pub fn processed(&self) -> usize {
        self.count(|s| matches!(s, FileStatus::Processed { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, FileStatus::Skipped))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, FileStatus::Failed(_)))
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    fn count(&self, pred: impl Fn(&FileStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.status)).count()
    }
}

/// Conditions that stop a run before any file is touched, plus marker
/// bookkeeping failures at the end.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("{kind} directory {path} is inside a git repository at {repo}; keep statement data out of version control")]
    InsideGitRepository {
        kind: DirKind,
        path: PathBuf,
        repo: PathBuf,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Roster(#[from] RosterError),
    #[error(transparent)]
    Guard(#[from] GuardError),
    #[error("IO error listing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Marker(#[from] MarkerError),
}

/// Why a single file could not be processed.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error(transparent)]
    Read(#[from] ReadError),
    #[error(transparent)]
    Write(#[from] WriteError),
    #[error("Could not write report {path}: {source}")]
    Report {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Everything per-file processing reads but never changes.
struct Context<'a> {
    config: &'a Config,
    roster: &'a AttendeeRoster,
    analyzer: &'a dyn CharsetAnalyzer,
    available: Vec<String>,
    filter: RelevanceFilter,
}

// ── Run ───────────────────────────────────────────────────────────────────────

pub fn run<R: Rng + ?Sized>(
    config: &Config,
    options: &RunOptions,
    rng: &mut R,
) -> Result<RunSummary, RunError> {
    run_with(&StatisticalAnalyzer, config, options, rng)
}

/// [`run`] with a caller-supplied charset analyzer.
pub fn run_with<R: Rng + ?Sized>(
    analyzer: &dyn CharsetAnalyzer,
    config: &Config,
    options: &RunOptions,
    rng: &mut R,
) -> Result<RunSummary, RunError> {
    config.validate_directories()?;
    for kind in [DirKind::Input, DirKind::Output] {
        let path = config.dir(kind);
        if let Some(repo) = enclosing_git_repo(path) {
            return Err(RunError::InsideGitRepository {
                kind,
                path: path.to_path_buf(),
                repo,
            });
        }
    }

    let roster = load_roster(&config.reference_dir.join(NAMELIST_FILE))?;
    info!(attendees = roster.len(), "loaded attendee list");

    let (files, requested) = select_files(&config.input_dir, options)?;
    let guard = check_months(&config.archive_dir, &requested, options.force)?;
    if files.is_empty() {
        info!(dir = %config.input_dir.display(), "no CSV files to process");
    } else {
        info!(files = files.len(), "processing");
    }

    let ctx = Context {
        config,
        roster: &roster,
        analyzer,
        available: roster.ids(),
        filter: config.relevance_filter(),
    };
    let mut ledger = RunLedger::new();
    let mut outcomes = Vec::with_capacity(files.len());

    for file in files {
        let name = file_name(&file);
        let month = MonthKey::from_path(&file);

        let status = match process_file(&ctx, &file, rng) {
            Ok(status) => status,
            Err(e) => {
                warn!(file = %name, error = %e, "processing failed");
                FileStatus::Failed(e.to_string())
            }
        };

        let mut outcome = FileOutcome {
            file: file.clone(),
            month,
            status,
            archived_to: None,
        };

        if options.archive {
            match month {
                None => warn!(file = %name, "no YYYYMM prefix; left in Input"),
                Some(month) => archive_outcome(&mut outcome, month, &config.archive_dir, &mut ledger),
            }
        }

        outcomes.push(outcome);
    }

    let (markers, outstanding) = if options.archive {
        if ledger.failure_count() > 0 {
            warn!(failures = ledger.failure_count(), "files left in Input for retry");
        }
        let markers = reconcile_markers(&config.archive_dir, &ledger)?;
        (markers, retry_markers(&config.archive_dir)?)
    } else {
        (Vec::new(), Vec::new())
    };

    Ok(RunSummary {
        outcomes,
        guard,
        markers,
        outstanding,
    })
}

/// Archives a finished file and records the result. A failed file stays in
/// Input; when archival itself fails, the outputs it produced are removed
/// so the retry starts from a clean Output.
fn archive_outcome(outcome: &mut FileOutcome, month: MonthKey, archive_dir: &Path, ledger: &mut RunLedger) {
    let name = outcome.file_name();
    if let FileStatus::Failed(error) = &outcome.status {
        ledger.record_failure(month, name, error.as_str());
        return;
    }

    match archive_file(&outcome.file, archive_dir, month) {
        Ok(dest) => {
            ledger.record_success(month, name);
            outcome.archived_to = Some(dest);
        }
        Err(e) => {
            warn!(file = %name, error = %e, "archival failed");
            if let FileStatus::Processed { csv, html, .. } = &outcome.status {
                discard_outputs(csv, html.as_deref());
            }
            ledger.record_failure(month, name, e.to_string());
            outcome.status = FileStatus::Failed(e.to_string());
        }
    }
}

fn discard_outputs(csv: &Path, html: Option<&Path>) {
    for path in std::iter::once(csv).chain(html) {
        match fs::remove_file(path) {
            Ok(()) => debug!(file = %path.display(), "removed output"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(file = %path.display(), error = %e, "could not remove output"),
        }
    }
}

/// The files this run covers and the months the guard must clear.
///
/// Explicit months win over `latest`; with neither, every CSV in Input is
/// taken and the guard checks the months their names carry.
pub fn select_files(input_dir: &Path, options: &RunOptions) -> Result<(Vec<PathBuf>, Vec<MonthKey>), RunError> {
    let io_err = |source| RunError::Io {
        path: input_dir.to_path_buf(),
        source,
    };
    let files = csv_files_in(input_dir).map_err(io_err)?;

    let selection = if !options.months.is_empty() {
        Some(options.months.clone())
    } else if let Some(n) = options.latest {
        Some(latest_months(input_dir, n).map_err(io_err)?)
    } else {
        None
    };

    Ok(match selection {
        Some(months) if months.is_empty() => (Vec::new(), months),
        Some(months) => (filter_by_months(&files, &months), months),
        None => {
            let months: BTreeSet<MonthKey> = files.iter().filter_map(|f| MonthKey::from_path(f)).collect();
            (files, months.into_iter().collect())
        }
    })
}

/// Nearest ancestor of `dir` (itself included) that holds a `.git` entry.
pub fn enclosing_git_repo(dir: &Path) -> Option<PathBuf> {
    let dir = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
    dir.ancestors()
        .find(|ancestor| ancestor.join(".git").exists())
        .map(Path::to_path_buf)
}

// ── Per file ──────────────────────────────────────────────────────────────────

/// Reads one statement, fills attendees for its relevant rows, and writes
/// the enriched CSV. Every source row is kept; rows that are not relevant
/// get blank attendee cells. The HTML report is written only when at least
/// one row is relevant.
fn process_file<R: Rng + ?Sized>(
    ctx: &Context<'_>,
    path: &Path,
    rng: &mut R,
) -> Result<FileStatus, ProcessError> {
    let mut statement = read_statement_with(ctx.analyzer, path)?;
    let name = file_name(path);
    if statement.is_empty() {
        info!(file = %name, "skipped: empty file");
        return Ok(FileStatus::Skipped);
    }

    let rows = statement.transactions();
    let relevant: Vec<usize> = rows
        .iter()
        .enumerate()
        .filter(|(_, row)| ctx.filter.is_relevant(row))
        .map(|(idx, _)| idx)
        .collect();

    let table = &mut statement.table;
    table.drop_columns(DROPPED_COLUMNS);
    table.ensure_column(header::REMARK);
    let count_col = table.ensure_column(header::ATTENDEE_COUNT);
    let id_cols: Vec<usize> = AttendeeSlots::column_names()
        .iter()
        .map(|name| table.ensure_column(name))
        .collect();

    // A re-fed output file already has these columns; start them blank.
    for row in 0..table.rows.len() {
        table.set(row, count_col, "");
        for col in &id_cols {
            table.set(row, *col, "");
        }
    }

    let policy = &ctx.config.estimation;
    let mut enriched: Vec<TransactionRow> = Vec::with_capacity(relevant.len());
    for idx in relevant {
        let source = &rows[idx];
        let count = policy.estimate(source.amount_or_zero(), rng);
        let slots = sample_ids(count, &ctx.available, &ctx.config.primary_weights, rng);
        debug!(file = %name, row = idx, count, ids = ?slots.as_slice(), "assigned attendees");

        table.set(idx, count_col, count.to_string());
        for (col, id) in id_cols.iter().zip(slots.as_slice()) {
            table.set(idx, *col, id.as_str());
        }
        enriched.push(TransactionRow {
            attendee_count: Some(count),
            attendees: slots,
            ..source.clone()
        });
    }

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("statement");
    let output_dir = &ctx.config.output_dir;
    let csv = write_statement(
        &statement.table,
        &output_dir.join(format!("{stem}.csv")),
        &statement.preamble,
        true,
    )?;

    let html = if enriched.is_empty() {
        info!(file = %name, rows = rows.len(), "no relevant rows; report not written");
        None
    } else {
        let html_path = output_dir.join(format!("{stem}.html"));
        let html = render_report(&name, &enriched, ctx.roster);
        match write_report(&html_path, &html, true) {
            Ok(written) => Some(written),
            Err(source) => {
                discard_outputs(&csv, None);
                return Err(ProcessError::Report {
                    path: html_path,
                    source,
                });
            }
        }
    };

    info!(
        file = %name,
        encoding = %statement.encoding,
        relevant = enriched.len(),
        csv = %csv.display(),
        "processed"
    );
    Ok(FileStatus::Processed {
        csv,
        html,
        relevant: enriched.len(),
    })
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
