use saisonxform_core::MonthKey;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

use crate::marker::{self, MarkerError, RetryMarker};

/// Archival results for one month within a single run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonthOutcomes {
    pub succeeded: Vec<String>,
    /// `(file, error)` pairs.
    pub failed: Vec<(String, String)>,
}

/// Per-month archival results accumulated over a run, reconciled into retry
/// markers once every file has been handled.
#[derive(Debug, Clone, Default)]
pub struct RunLedger {
    months: BTreeMap<MonthKey, MonthOutcomes>,
}

impl RunLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&mut self, month: MonthKey, file: impl Into<String>) {
        self.months.entry(month).or_default().succeeded.push(file.into());
    }

    pub fn record_failure(&mut self, month: MonthKey, file: impl Into<String>, error: impl Into<String>) {
        self.months
            .entry(month)
            .or_default()
            .failed
            .push((file.into(), error.into()));
    }

    /// Months touched this run, ascending.
    pub fn months(&self) -> impl Iterator<Item = (MonthKey, &MonthOutcomes)> {
        self.months.iter().map(|(m, o)| (*m, o))
    }

    pub fn failure_count(&self) -> usize {
        self.months.values().map(|o| o.failed.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.months.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerAction {
    Written,
    Deleted,
    Unchanged,
}

/// Brings retry markers in line with this run: a month with any failure
/// gets a fresh marker listing them; a month that only succeeded loses its
/// marker. Months the run never touched are left alone.
pub fn reconcile_markers(
    archive_dir: &Path,
    ledger: &RunLedger,
) -> Result<Vec<(MonthKey, MarkerAction)>, MarkerError> {
    let mut actions = Vec::new();
    for (month, outcomes) in ledger.months() {
        let action = if !outcomes.failed.is_empty() {
            RetryMarker::new(month, outcomes.failed.clone()).write(archive_dir)?;
            info!(%month, failures = outcomes.failed.len(), "retry marker recorded");
            MarkerAction::Written
        } else if !outcomes.succeeded.is_empty() && marker::delete_retry_marker(archive_dir, month)? {
            info!(%month, "month recovered; retry marker cleared");
            MarkerAction::Deleted
        } else {
            MarkerAction::Unchanged
        };
        actions.push((month, action));
    }
    Ok(actions)
}
