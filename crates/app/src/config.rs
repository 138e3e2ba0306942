//! Layered configuration.
//!
//! Precedence, lowest first: built-in defaults, the config file, the
//! `INPUT_DIR`/`REFERENCE_DIR`/`OUTPUT_DIR`/`ARCHIVE_DIR` environment
//! variables, then directory flags given on the command line.

use rust_decimal::Decimal;
use saisonxform_core::{AmountBracket, EstimationPolicy, PrimaryWeights};
use saisonxform_import::{RelevanceFilter, RelevanceRule};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

pub const CONFIG_FILE: &str = "config.toml";
pub const DEFAULT_COST_PER_PERSON: i64 = 3000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("min_attendees ({min}) is greater than max_attendees ({max})")]
    AttendeeRange { min: u32, max: u32 },
    #[error("Required directories not found:\n{}", list_missing(.0))]
    MissingDirectories(Vec<(DirKind, PathBuf)>),
}

fn list_missing(missing: &[(DirKind, PathBuf)]) -> String {
    missing
        .iter()
        .map(|(kind, path)| format!("  - {kind}: {}", path.display()))
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirKind {
    Input,
    Reference,
    Output,
    Archive,
}

impl DirKind {
    pub const ALL: [DirKind; 4] = [DirKind::Input, DirKind::Reference, DirKind::Output, DirKind::Archive];

    pub fn env_var(self) -> &'static str {
        match self {
            DirKind::Input => "INPUT_DIR",
            DirKind::Reference => "REFERENCE_DIR",
            DirKind::Output => "OUTPUT_DIR",
            DirKind::Archive => "ARCHIVE_DIR",
        }
    }

    fn default_dir(self) -> &'static str {
        match self {
            DirKind::Input => "Input",
            DirKind::Reference => "Reference",
            DirKind::Output => "Output",
            DirKind::Archive => "Archive",
        }
    }
}

impl fmt::Display for DirKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.default_dir())
    }
}

// ── File model ────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    paths: PathsSection,
    processing: ProcessingSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PathsSection {
    input_dir: Option<PathBuf>,
    reference_dir: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    archive_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct ProcessingSection {
    min_attendees: u32,
    max_attendees: u32,
    primary_id_weights: BTreeMap<String, f64>,
    amount_based_attendees: Option<AmountSection>,
    relevance_keywords: Option<Vec<String>>,
    relevance_rules: Vec<RelevanceRule>,
}

impl Default for ProcessingSection {
    fn default() -> Self {
        let defaults = EstimationPolicy::default();
        Self {
            min_attendees: defaults.min_attendees,
            max_attendees: defaults.max_attendees,
            primary_id_weights: PrimaryWeights::default()
                .entries()
                .iter()
                .cloned()
                .collect(),
            amount_based_attendees: None,
            relevance_keywords: None,
            relevance_rules: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AmountSection {
    #[serde(default = "enabled_by_default")]
    enabled: bool,
    #[serde(default = "default_cost_per_person")]
    cost_per_person: i64,
    /// `"low-high"` keys; values are kept loose so one bad entry is skipped
    /// rather than rejecting the whole file.
    #[serde(default)]
    brackets: BTreeMap<String, toml::Value>,
}

fn enabled_by_default() -> bool {
    true
}

fn default_cost_per_person() -> i64 {
    DEFAULT_COST_PER_PERSON
}

fn parse_bracket(range: &str, value: &toml::Value) -> Result<AmountBracket, String> {
    let (low, high) = range
        .split_once('-')
        .ok_or_else(|| "expected \"low-high\"".to_string())?;
    let low: i64 = low.trim().parse().map_err(|_| format!("bad lower bound '{low}'"))?;
    let high: i64 = high.trim().parse().map_err(|_| format!("bad upper bound '{high}'"))?;
    if low < 0 || high < low {
        return Err(format!("invalid range {low}-{high}"));
    }

    let table = value.as_table().ok_or("must be a table with min and max")?;
    let bound = |key: &str| -> Result<u32, String> {
        let n = table
            .get(key)
            .and_then(toml::Value::as_integer)
            .ok_or_else(|| format!("missing {key} attendees"))?;
        u32::try_from(n).map_err(|_| format!("{key} attendees out of range: {n}"))
    };
    let (min, max) = (bound("min")?, bound("max")?);
    if min < 1 || max < min {
        return Err(format!("invalid attendee range min={min}, max={max}"));
    }

    Ok(AmountBracket { low, high, min_attendees: min, max_attendees: max })
}

/// Valid brackets in ascending order of their lower bound, or `None` when
/// amount-based estimation is off or nothing usable is configured.
fn parse_brackets(section: &AmountSection) -> Option<Vec<AmountBracket>> {
    if !section.enabled {
        return None;
    }
    let mut brackets: Vec<AmountBracket> = section
        .brackets
        .iter()
        .filter_map(|(range, value)| match parse_bracket(range, value) {
            Ok(bracket) => Some(bracket),
            Err(reason) => {
                warn!("Skipping invalid amount bracket '{range}': {reason}");
                None
            }
        })
        .collect();
    if brackets.is_empty() {
        warn!("No valid amount brackets found; attendee counts will be drawn uniformly");
        return None;
    }
    brackets.sort_by_key(|b| (b.low, b.high));
    Some(brackets)
}

// ── Resolved configuration ────────────────────────────────────────────────────

/// Directory flags from the command line; these win over everything else.
#[derive(Debug, Clone, Default)]
pub struct DirOverrides {
    pub input: Option<PathBuf>,
    pub reference: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub archive: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub project_root: PathBuf,
    /// The config file that was read, if any.
    pub source: Option<PathBuf>,
    pub input_dir: PathBuf,
    pub reference_dir: PathBuf,
    pub output_dir: PathBuf,
    pub archive_dir: PathBuf,
    pub estimation: EstimationPolicy,
    pub primary_weights: PrimaryWeights,
    pub relevance_rules: Vec<RelevanceRule>,
}

impl Config {
    /// Loads configuration for `project_root`, reading the process environment.
    pub fn load(project_root: &Path, explicit: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(project_root, explicit, |key| std::env::var(key).ok())
    }

    pub fn load_with_env<E>(project_root: &Path, explicit: Option<&Path>, env: E) -> Result<Self, ConfigError>
    where
        E: Fn(&str) -> Option<String>,
    {
        let source = Self::locate_file(project_root, explicit)?;
        let file = match &source {
            Some(path) => {
                let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.clone(),
                    source,
                })?;
                debug!(config = %path.display(), "loaded config file");
                toml::from_str::<ConfigFile>(&text).map_err(|source| ConfigError::Parse {
                    path: path.clone(),
                    source,
                })?
            }
            None => ConfigFile::default(),
        };

        let processing = file.processing;
        if processing.min_attendees > processing.max_attendees {
            return Err(ConfigError::AttendeeRange {
                min: processing.min_attendees,
                max: processing.max_attendees,
            });
        }

        let resolve = |kind: DirKind, from_file: Option<PathBuf>| -> PathBuf {
            let raw = env(kind.env_var())
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .or(from_file)
                .unwrap_or_else(|| PathBuf::from(kind.default_dir()));
            resolve_path(project_root, raw)
        };

        let estimation = EstimationPolicy {
            min_attendees: processing.min_attendees,
            max_attendees: processing.max_attendees,
            brackets: processing.amount_based_attendees.as_ref().and_then(parse_brackets),
            cost_per_person: Decimal::from(
                processing
                    .amount_based_attendees
                    .as_ref()
                    .map_or(DEFAULT_COST_PER_PERSON, |a| a.cost_per_person),
            ),
        };

        let mut relevance_rules = processing.relevance_rules;
        if let Some(keywords) = processing.relevance_keywords {
            relevance_rules.extend(keywords.iter().map(|k| RelevanceRule::contains(k)));
        }

        Ok(Self {
            project_root: project_root.to_path_buf(),
            source,
            input_dir: resolve(DirKind::Input, file.paths.input_dir),
            reference_dir: resolve(DirKind::Reference, file.paths.reference_dir),
            output_dir: resolve(DirKind::Output, file.paths.output_dir),
            archive_dir: resolve(DirKind::Archive, file.paths.archive_dir),
            estimation,
            primary_weights: PrimaryWeights::new(processing.primary_id_weights.into_iter().collect()),
            relevance_rules,
        })
    }

    /// The explicit file (which must exist), else `data/reference/config.toml`,
    /// else `config.toml` under the project root.
    fn locate_file(project_root: &Path, explicit: Option<&Path>) -> Result<Option<PathBuf>, ConfigError> {
        if let Some(path) = explicit {
            return if path.is_file() {
                Ok(Some(path.to_path_buf()))
            } else {
                Err(ConfigError::NotFound(path.to_path_buf()))
            };
        }
        let candidates = [
            project_root.join("data").join("reference").join(CONFIG_FILE),
            project_root.join(CONFIG_FILE),
        ];
        Ok(candidates.into_iter().find(|p| p.is_file()))
    }

    pub fn apply_overrides(&mut self, overrides: &DirOverrides) {
        let root = self.project_root.clone();
        let pairs = [
            (&mut self.input_dir, &overrides.input),
            (&mut self.reference_dir, &overrides.reference),
            (&mut self.output_dir, &overrides.output),
            (&mut self.archive_dir, &overrides.archive),
        ];
        for (slot, value) in pairs {
            if let Some(path) = value {
                *slot = resolve_path(&root, path.clone());
            }
        }
    }

    /// Configured rules, or the meeting/entertainment keywords if none are set.
    pub fn relevance_filter(&self) -> RelevanceFilter {
        if self.relevance_rules.is_empty() {
            RelevanceFilter::default()
        } else {
            RelevanceFilter::new(self.relevance_rules.clone())
        }
    }

    pub fn dir(&self, kind: DirKind) -> &Path {
        match kind {
            DirKind::Input => &self.input_dir,
            DirKind::Reference => &self.reference_dir,
            DirKind::Output => &self.output_dir,
            DirKind::Archive => &self.archive_dir,
        }
    }

    /// Input, Reference and Output must exist; Archive is created on demand.
    pub fn validate_directories(&self) -> Result<(), ConfigError> {
        let missing: Vec<(DirKind, PathBuf)> = [DirKind::Input, DirKind::Reference, DirKind::Output]
            .into_iter()
            .filter(|kind| !self.dir(*kind).is_dir())
            .map(|kind| (kind, self.dir(kind).to_path_buf()))
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::MissingDirectories(missing))
        }
    }
}

fn resolve_path(root: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        root.join(path)
    }
}
