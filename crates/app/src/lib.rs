//! Saison statement enrichment: configuration, the batch pipeline and the
//! HTML report. The `saisonxform` binary is a thin CLI over this crate.

pub mod config;
pub mod pipeline;
pub mod report;

pub use config::{Config, ConfigError, DirKind, DirOverrides};
pub use pipeline::{
    run, run_with, FileOutcome, FileStatus, ProcessError, RunError, RunOptions, RunSummary,
};
pub use report::{render_report, write_report};
