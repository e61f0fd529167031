//! Logging setup for the `scanguard` binary.
//!
//! The library only talks to the `log` facade; this module installs the
//! `env_logger` backend. The filter comes from, in priority order:
//!
//! 1. `RUST_LOG`, parsed with the usual `env_logger` syntax
//! 2. `--quiet` (errors only) or `--verbose` (`-v` debug, `-vv` trace)
//! 3. Info
//!
//! Flag-derived levels apply to this crate only. Dependencies stay at `warn`
//! unless tracing is requested, so `-v` shows retry and breaker decisions
//! without rayon or figment chatter.
//!
//! # Example
//!
//! ```rust,no_run
//! use scanguard::logging::init_logging;
//!
//! init_logging(1, false).expect("logger already set");
//! // A second logger is rejected
//! assert!(init_logging(0, true).is_err());
//! ```

use env_logger::fmt::Formatter;
use env_logger::Builder;
use log::{LevelFilter, Record, SetLoggerError};
use std::env;
use std::io::{self, Write};

const CRATE_TARGET: &str = env!("CARGO_CRATE_NAME");

/// Where the active filter came from.
#[derive(Debug, Clone, PartialEq, Eq)]
enum FilterSource {
    Environment(String),
    Flags {
        own: LevelFilter,
        dependencies: LevelFilter,
    },
}

impl FilterSource {
    fn resolve(verbose: u8, quiet: bool, rust_log: Option<String>) -> Self {
        if let Some(filters) = rust_log.filter(|s| !s.trim().is_empty()) {
            return Self::Environment(filters);
        }

        let own = flag_level(verbose, quiet);
        let dependencies = if own == LevelFilter::Trace {
            LevelFilter::Debug
        } else {
            own.min(LevelFilter::Warn)
        };
        Self::Flags { own, dependencies }
    }

    fn apply(&self, builder: &mut Builder) {
        match self {
            Self::Environment(filters) => {
                builder.parse_filters(filters);
            }
            Self::Flags { own, dependencies } => {
                builder
                    .filter_level(*dependencies)
                    .filter_module(CRATE_TARGET, *own);
            }
        }
    }
}

/// Install the global logger.
///
/// # Arguments
///
/// * `verbose` - Verbosity count from CLI (0=info, 1=debug, 2+=trace)
/// * `quiet` - Only show errors; ignored when `RUST_LOG` is set
///
/// # Errors
///
/// Returns [`SetLoggerError`] if a logger is already installed. `run_app`
/// treats that as a warning so it can be called repeatedly in tests.
pub fn init_logging(verbose: u8, quiet: bool) -> Result<(), SetLoggerError> {
    let source = FilterSource::resolve(verbose, quiet, env::var("RUST_LOG").ok());

    let mut builder = Builder::new();
    source.apply(&mut builder);
    let detailed = verbose >= 1 || matches!(source, FilterSource::Environment(_));
    builder.format(move |buf, record| write_record(buf, record, detailed));
    builder.try_init()?;

    log::debug!("Logging initialized: {:?}", source);
    Ok(())
}

fn flag_level(verbose: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::Error;
    }
    match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Debug builds prefix a timestamp; detailed output adds the record target.
fn write_record(buf: &mut Formatter, record: &Record<'_>, detailed: bool) -> io::Result<()> {
    let level = record.level();
    let style = buf.default_level_style(level);

    if cfg!(debug_assertions) {
        let timestamp = buf.timestamp_millis();
        write!(buf, "{} ", timestamp)?;
    }
    write!(buf, "{style}{:<5}{style:#} ", level)?;
    if detailed {
        write!(buf, "[{}] ", record.target())?;
    }
    writeln!(buf, "{}", record.args())
}
