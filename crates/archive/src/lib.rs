//! Month-keyed archival of processed statements.
//!
//! A month counts as archived once `Archive/<YYYYMM>/` exists. Months whose
//! last run left failures behind carry `Archive/.retry_<YYYYMM>.json`, which
//! lets the idempotency guard admit them again for recovery.

pub mod archive;
pub mod guard;
pub mod ledger;
pub mod marker;

pub use archive::{
    archive_file, archive_file_with, archived_months, month_dir, month_state, ArchiveError,
    FileOps, LocalFs, MonthState,
};
pub use guard::{check_months, GuardError, GuardReport};
pub use ledger::{reconcile_markers, MarkerAction, MonthOutcomes, RunLedger};
pub use marker::{delete_retry_marker, has_retry_marker, marker_path, retry_markers, MarkerError, RetryMarker};
