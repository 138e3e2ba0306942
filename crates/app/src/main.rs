use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};
use saisonxform::{run, Config, DirKind, DirOverrides, FileStatus, RunOptions, RunSummary};
use saisonxform_core::MonthKey;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "saisonxform")]
#[command(about = "Enrich Saison card statements with meeting attendees", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (default: data/reference/config.toml, then config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Process statements in Input, write Output, archive the sources
    #[command(alias = "process")]
    Run(RunArgs),
    /// Show the resolved configuration and check the directories exist
    ValidateConfig(DirArgs),
}

#[derive(Args, Debug, Default)]
struct DirArgs {
    #[arg(long)]
    input: Option<PathBuf>,
    #[arg(long)]
    reference: Option<PathBuf>,
    #[arg(long)]
    output: Option<PathBuf>,
    #[arg(long)]
    archive: Option<PathBuf>,
}

impl DirArgs {
    fn overrides(&self) -> DirOverrides {
        DirOverrides {
            input: self.input.clone(),
            reference: self.reference.clone(),
            output: self.output.clone(),
            archive: self.archive.clone(),
        }
    }
}

#[derive(Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    dirs: DirArgs,

    /// Months to process (YYYYMM), repeatable or comma-separated
    #[arg(long = "month", value_delimiter = ',')]
    months: Vec<MonthKey>,

    /// Process the N most recent months found in Input
    #[arg(long, conflicts_with = "months")]
    latest: Option<usize>,

    /// Reprocess months that are already archived
    #[arg(long)]
    force: bool,

    /// Leave sources in Input after processing
    #[arg(long)]
    no_archive: bool,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match dispatch(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("ERROR: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn dispatch(cli: Cli) -> anyhow::Result<ExitCode> {
    match cli.command {
        Commands::Run(args) => {
            let config = load_config(cli.config.as_deref(), &args.dirs)?;
            let options = RunOptions {
                months: args.months,
                latest: args.latest,
                force: args.force,
                archive: !args.no_archive,
            };
            let summary = run(&config, &options, &mut rand::rng())?;
            print_summary(&summary);
            Ok(if summary.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Commands::ValidateConfig(dirs) => {
            let config = load_config(cli.config.as_deref(), &dirs)?;
            print_config(&config);
            config.validate_directories()?;
            println!("Configuration OK");
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// The project root is the config file's directory when one is named,
/// otherwise the working directory.
fn load_config(explicit: Option<&Path>, dirs: &DirArgs) -> anyhow::Result<Config> {
    let root = match explicit.and_then(Path::parent) {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().context("cannot determine working directory")?,
    };
    let mut config = Config::load(&root, explicit)?;
    config.apply_overrides(&dirs.overrides());
    Ok(config)
}

fn print_config(config: &Config) {
    match &config.source {
        Some(path) => println!("Config file: {}", path.display()),
        None => println!("Config file: (none, using defaults)"),
    }
    for kind in DirKind::ALL {
        let path = config.dir(kind);
        let state = if path.is_dir() { "ok" } else { "missing" };
        println!("  {kind:<10} {} [{state}]", path.display());
    }
    let policy = &config.estimation;
    println!("  attendees  {}..={}", policy.min_attendees, policy.max_attendees);
    match &policy.brackets {
        Some(brackets) => println!("  brackets   {} (¥{}/person otherwise)", brackets.len(), policy.cost_per_person),
        None => println!("  brackets   disabled"),
    }
}

fn print_summary(summary: &RunSummary) {
    for outcome in &summary.outcomes {
        let name = outcome.file_name();
        match &outcome.status {
            FileStatus::Processed { csv, html: Some(html), relevant } => println!(
                "  ✓ {name}: {relevant} relevant row(s) -> {}, {}",
                display_name(csv),
                display_name(html)
            ),
            FileStatus::Processed { csv, html: None, .. } => println!(
                "  ✓ {name}: no meeting/entertainment expenses -> {}",
                display_name(csv)
            ),
            FileStatus::Skipped => println!("  - {name}: skipped (empty file)"),
            FileStatus::Failed(error) => println!("  ✗ {name}: {error}"),
        }
    }
    for month in summary.guard.retry.iter() {
        println!("Recovered month {month} (retry marker present)");
    }
    println!(
        "Processed: {}  Skipped: {}  Failed: {}  Total: {}",
        summary.processed(),
        summary.skipped(),
        summary.failed(),
        summary.outcomes.len()
    );
    if !summary.outstanding.is_empty() {
        let months: Vec<String> = summary.outstanding.iter().map(MonthKey::to_string).collect();
        println!("Awaiting retry: {}", months.join(", "));
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
