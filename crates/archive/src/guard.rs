use saisonxform_core::MonthKey;
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

use crate::archive::{month_state, MonthState};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GuardError {
    #[error("Already archived: {}. Pass --force to reprocess.", join(.0))]
    AlreadyArchived(Vec<MonthKey>),
}

fn join(months: &[MonthKey]) -> String {
    months.iter().map(MonthKey::to_string).collect::<Vec<_>>().join(", ")
}

/// How each requested month cleared the guard.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GuardReport {
    /// Never archived.
    pub fresh: Vec<MonthKey>,
    /// Archived with a retry marker; reprocessing is a recovery.
    pub retry: Vec<MonthKey>,
    /// Archived and clean, let through by `force`.
    pub forced: Vec<MonthKey>,
}

/// Rejects months that are archived and have no retry marker, unless
/// `force`. Nothing is touched on disk, so repeated calls agree.
pub fn check_months(
    archive_dir: &Path,
    requested: &[MonthKey],
    force: bool,
) -> Result<GuardReport, GuardError> {
    let mut months = requested.to_vec();
    months.sort();
    months.dedup();

    let mut report = GuardReport::default();
    let mut blocked = Vec::new();
    for month in months {
        match month_state(archive_dir, month) {
            MonthState::Unarchived => report.fresh.push(month),
            MonthState::ArchivedWithRetry => {
                info!(%month, "retry marker present; reprocessing for recovery");
                report.retry.push(month);
            }
            MonthState::ArchivedClean if force => {
                warn!(%month, "already archived; reprocessing because of --force");
                report.forced.push(month);
            }
            MonthState::ArchivedClean => blocked.push(month),
        }
    }

    if blocked.is_empty() {
        Ok(report)
    } else {
        Err(GuardError::AlreadyArchived(blocked))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::month_dir;
    use crate::marker::RetryMarker;
    use std::fs;

    fn month(s: &str) -> MonthKey {
        MonthKey::parse(s).unwrap()
    }

    #[test]
    fn unarchived_months_pass() {
        let dir = tempfile::tempdir().unwrap();
        let report = check_months(dir.path(), &[month("202510"), month("202510")], false).unwrap();
        assert_eq!(report.fresh, vec![month("202510")]);
    }

    #[test]
    fn archived_month_rejected_on_every_call() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(month_dir(dir.path(), month("202510"))).unwrap();
        let requested = [month("202509"), month("202510")];

        let first = check_months(dir.path(), &requested, false).unwrap_err();
        let second = check_months(dir.path(), &requested, false).unwrap_err();
        assert_eq!(first, GuardError::AlreadyArchived(vec![month("202510")]));
        assert_eq!(first, second);
        assert!(first.to_string().contains("202510"));
    }

    #[test]
    fn force_lets_archived_months_through() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(month_dir(dir.path(), month("202510"))).unwrap();
        let report = check_months(dir.path(), &[month("202510")], true).unwrap();
        assert_eq!(report.forced, vec![month("202510")]);
    }

    #[test]
    fn retry_marker_allows_recovery() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(month_dir(dir.path(), month("202511"))).unwrap();
        RetryMarker::new(month("202511"), vec![("a.csv".into(), "e".into())])
            .write(dir.path())
            .unwrap();

        let report = check_months(dir.path(), &[month("202511")], false).unwrap();
        assert_eq!(report.retry, vec![month("202511")]);
    }

    #[test]
    fn nothing_requested_passes() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(check_months(dir.path(), &[], false).unwrap(), GuardReport::default());
    }
}
