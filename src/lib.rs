//! scanguard - Resilient batch log analysis
//!
//! Failure handling and result caching for analyzers that read many files:
//!
//! - [`resilience`]: error classification policies, a retrying executor and a
//!   circuit breaker
//! - [`cache`]: a TTL key/value cache and a result cache invalidated by file
//!   modification time, with a disabled variant
//! - [`batch`]: a parallel runner that wires both around an [`scanner::Analyzer`]
//!
//! The `scanguard` binary drives the runner from the command line.

pub mod batch;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod output;
pub mod progress;
pub mod resilience;
pub mod scanner;
pub mod signal;

use std::io::Write;
use std::sync::Arc;

use anyhow::{bail, Context};

use crate::batch::BatchRunner;
use crate::cli::{Cli, Commands, ConfigAction, ConfigArgs, OutputFormat, ScanArgs};
use crate::config::Settings;
use crate::error::ExitCode;
use crate::output::{JsonOutput, TextOutput};
use crate::progress::{NoOpProgress, Progress, ProgressCallback, PHASE_WALKING};
use crate::scanner::{DigestAnalyzer, FileEntry, ScanError, Walker, WalkerConfig};

/// Run the command described by `cli`.
///
/// # Errors
///
/// Returns an error for failures that prevent a run from starting or its
/// report from being written. Per-file failures are reported in the output
/// and reflected in the returned [`ExitCode`] instead.
pub fn run_app(cli: Cli) -> anyhow::Result<ExitCode> {
    if let Err(e) = logging::init_logging(cli.verbose, cli.quiet) {
        eprintln!("Warning: logging already initialized: {e}");
    }

    match &cli.command {
        Commands::Scan(args) => run_scan(args, cli.quiet),
        Commands::Config(args) => run_config(args),
    }
}

fn run_scan(args: &ScanArgs, quiet: bool) -> anyhow::Result<ExitCode> {
    let cancel = signal::install_handler().context("Failed to install signal handler")?;

    let mut settings = Settings::load(args.config.as_deref())?;
    args.apply_to(&mut settings);
    settings.validate()?;
    log::debug!("Effective settings: {:?}", settings);

    let progress: Arc<dyn ProgressCallback> = if quiet || args.output == OutputFormat::Json {
        Arc::new(NoOpProgress)
    } else {
        Arc::new(Progress::new(false))
    };

    let walker_config = WalkerConfig {
        follow_symlinks: args.follow_symlinks,
        skip_hidden: args.skip_hidden,
        extensions: args.extensions.clone(),
        max_depth: args.max_depth,
    };
    let files = discover(args, walker_config, &cancel, progress.as_ref())?;
    let total_bytes = files.iter().map(|f| f.size).sum();

    let cache = settings.build_cache();
    let runner = BatchRunner::new(settings.batch_config(
        Arc::clone(&cache),
        cancel.clone(),
        Arc::clone(&progress),
    ));
    let analyzer = DigestAnalyzer::new();

    let mut exit_code = ExitCode::Success;
    let mut summaries = Vec::new();
    let mut last_report = None;
    for pass in 1..=args.passes {
        log::info!("Pass {} of {}", pass, args.passes);
        let report = runner.run(files.clone(), &analyzer);
        exit_code = exit_code.combine(ExitCode::from_summary(&report.summary));
        summaries.push(report.summary);
        let stop = report.summary.interrupted || report.summary.aborted;
        last_report = Some(report);
        if stop {
            break;
        }
    }

    if cancel.is_cancelled() {
        exit_code = ExitCode::Interrupted;
    }

    let Some(report) = last_report else {
        return Ok(exit_code);
    };
    let statistics = cache.statistics();

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match args.output {
        OutputFormat::Json => {
            JsonOutput::new(&report, &summaries, statistics, exit_code)
                .write_to(&mut out, true)
                .context("Failed to write JSON report")?;
        }
        OutputFormat::Text => {
            TextOutput::new(&report, &summaries, statistics, total_bytes)
                .write_to(&mut out)
                .context("Failed to write report")?;
        }
    }
    out.flush()?;

    Ok(exit_code)
}

fn discover(
    args: &ScanArgs,
    config: WalkerConfig,
    cancel: &signal::CancellationToken,
    progress: &dyn ProgressCallback,
) -> anyhow::Result<Vec<FileEntry>> {
    log::info!("Walking {}", args.path.display());
    progress.on_phase_start(PHASE_WALKING, 0);

    let walker = Walker::new(&args.path, config).with_cancellation(cancel.clone());
    let mut files = Vec::new();
    let mut walk_errors = 0usize;
    for entry in walker.walk() {
        match entry {
            Ok(file) => {
                files.push(file);
                progress.on_progress(files.len(), &args.path.to_string_lossy());
            }
            Err(ScanError::NotFound(path) | ScanError::NotADirectory(path))
                if path == args.path =>
            {
                progress.on_phase_end(PHASE_WALKING);
                bail!("Cannot scan {}: not an existing directory", path.display());
            }
            Err(_) => walk_errors += 1,
        }
    }
    progress.on_phase_end(PHASE_WALKING);

    if walk_errors > 0 {
        log::warn!("{} entries could not be read while walking", walk_errors);
    }
    log::info!("Found {} files", files.len());
    Ok(files)
}

fn run_config(args: &ConfigArgs) -> anyhow::Result<ExitCode> {
    match args.action {
        ConfigAction::Show => {
            let settings = Settings::load(args.config.as_deref())?;
            print!("{}", toml::to_string_pretty(&settings)?);
        }
        ConfigAction::Init => {
            let path = match &args.config {
                Some(path) => path.clone(),
                None => Settings::default_path()
                    .context("Failed to determine project directories")?,
            };
            if path.exists() {
                bail!("Config file already exists: {}", path.display());
            }
            Settings::default().save(&path)?;
            println!("Wrote default configuration to {}", path.display());
        }
        ConfigAction::Path => match args.config.clone().or_else(Settings::default_path) {
            Some(path) => println!("{}", path.display()),
            None => bail!("Failed to determine project directories"),
        },
    }
    Ok(ExitCode::Success)
}
