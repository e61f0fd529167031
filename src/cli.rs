//! Command-line interface definitions for scanguard.
//!
//! This module defines all CLI arguments, subcommands, and options using the clap derive API.
//! The CLI follows standard conventions with global options (verbosity, error format) and
//! subcommands for different operations.
//!
//! # Example
//!
//! ```bash
//! # Digest every log file under a directory
//! scanguard scan ~/Documents/My\ Games/Fallout4/F4SE --ext log
//!
//! # JSON report for scripting
//! scanguard scan ./logs --output json
//!
//! # Run twice to see the second pass served from the result cache
//! scanguard scan ./logs --passes 2
//!
//! # Verbose mode for debugging retries and breaker transitions
//! scanguard -v scan ./logs --max-retries 5 --retry-delay-ms 100
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::Settings;

/// Resilient batch log analysis with result caching.
///
/// scanguard walks a directory, digests every matching file on a bounded
/// thread pool, retries transient I/O errors, trips a circuit breaker on
/// repeated failures, and caches results until a file changes.
#[derive(Debug, Parser)]
#[command(name = "scanguard")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Print fatal errors as JSON on stderr
    #[arg(long, global = true)]
    pub json_errors: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Analyze every file under a directory
    Scan(ScanArgs),
    /// Inspect or initialize the configuration file
    Config(ConfigArgs),
}

/// Arguments for the scan subcommand.
#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Directory path to scan
    #[arg(value_name = "PATH")]
    pub path: PathBuf,

    /// Configuration file (defaults to the platform config directory)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Only analyze files with this extension (can be specified multiple times)
    #[arg(short, long = "ext", value_name = "EXT")]
    pub extensions: Vec<String>,

    /// Skip hidden files and directories (starting with .)
    #[arg(long)]
    pub skip_hidden: bool,

    /// Follow symbolic links during scan
    ///
    /// Warning: May cause infinite loops if symlinks form cycles.
    #[arg(long)]
    pub follow_symlinks: bool,

    /// Maximum directory depth below PATH (0 = only PATH itself)
    #[arg(long, value_name = "N")]
    pub max_depth: Option<usize>,

    /// Number of I/O threads for analysis (default: 4)
    ///
    /// Lower values reduce disk thrashing on HDDs.
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u16).range(1..))]
    pub io_threads: Option<u16>,

    /// Retries granted to transient I/O errors
    #[arg(long, value_name = "N")]
    pub max_retries: Option<u32>,

    /// Delay between retries in milliseconds
    #[arg(long, value_name = "MS", value_parser = clap::value_parser!(u64).range(1..))]
    pub retry_delay_ms: Option<u64>,

    /// Never retry failed analyses
    #[arg(long, conflicts_with_all = ["max_retries", "retry_delay_ms"])]
    pub no_retry: bool,

    /// Disable the circuit breaker
    #[arg(long)]
    pub no_breaker: bool,

    /// Disable result caching
    #[arg(long)]
    pub no_cache: bool,

    /// Number of passes over the file set (later passes hit the cache)
    #[arg(long, value_name = "N", default_value = "1", value_parser = clap::value_parser!(u32).range(1..))]
    pub passes: u32,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,
}

impl ScanArgs {
    /// Apply command-line overrides, the last configuration layer.
    pub fn apply_to(&self, settings: &mut Settings) {
        if let Some(threads) = self.io_threads {
            settings.io_threads = usize::from(threads);
        }
        if let Some(retries) = self.max_retries {
            settings.retry.max_retries = retries;
        }
        if let Some(delay) = self.retry_delay_ms {
            settings.retry.retry_delay_ms = delay;
        }
        if self.no_retry {
            settings.retry.enabled = false;
        }
        if self.no_breaker {
            settings.breaker.enabled = false;
        }
        if self.no_cache {
            settings.cache.enabled = false;
        }
    }
}

/// Arguments for the config subcommand.
#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// What to do with the configuration
    #[arg(value_enum, default_value = "show")]
    pub action: ConfigAction,

    /// Configuration file (defaults to the platform config directory)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

/// Config subcommand actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Write the default configuration file
    Init,
    /// Print the configuration file path
    Path,
}

/// Output format for scan results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary
    Text,
    /// JSON output for scripting
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan_args(args: &[&str]) -> ScanArgs {
        let mut argv = vec!["scanguard", "scan"];
        argv.extend_from_slice(args);
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Scan(args) => args,
            Commands::Config(_) => panic!("Expected Scan command"),
        }
    }

    #[test]
    fn test_cli_parse_scan_basic() {
        let args = scan_args(&["/logs"]);
        assert_eq!(args.path, PathBuf::from("/logs"));
        assert_eq!(args.output, OutputFormat::Text);
        assert_eq!(args.passes, 1);
        assert!(args.extensions.is_empty());
        assert!(args.io_threads.is_none());
    }

    #[test]
    fn test_cli_parse_scan_with_options() {
        let args = scan_args(&[
            "/logs",
            "--ext",
            "log",
            "-e",
            "txt",
            "--skip-hidden",
            "--io-threads",
            "8",
            "--max-retries",
            "5",
            "--retry-delay-ms",
            "20",
            "--no-breaker",
            "--passes",
            "2",
            "--output",
            "json",
        ]);
        assert_eq!(args.extensions, vec!["log", "txt"]);
        assert!(args.skip_hidden);
        assert_eq!(args.io_threads, Some(8));
        assert_eq!(args.max_retries, Some(5));
        assert_eq!(args.retry_delay_ms, Some(20));
        assert!(args.no_breaker);
        assert_eq!(args.passes, 2);
        assert_eq!(args.output, OutputFormat::Json);
    }

    #[test]
    fn test_apply_to_overrides_settings() {
        let args = scan_args(&[
            "/logs",
            "--io-threads",
            "2",
            "--retry-delay-ms",
            "10",
            "--no-cache",
        ]);
        let mut settings = Settings::default();
        args.apply_to(&mut settings);

        assert_eq!(settings.io_threads, 2);
        assert_eq!(settings.retry.retry_delay_ms, 10);
        assert!(settings.retry.enabled);
        assert!(!settings.cache.enabled);
        assert!(settings.breaker.enabled);
    }

    #[test]
    fn test_apply_to_leaves_unset_values() {
        let args = scan_args(&["/logs"]);
        let mut settings = Settings::default();
        settings.retry.max_retries = 9;
        args.apply_to(&mut settings);
        assert_eq!(settings.retry.max_retries, 9);
    }

    #[test]
    fn test_cli_rejects_zero_values() {
        assert!(Cli::try_parse_from(["scanguard", "scan", "/logs", "--io-threads", "0"]).is_err());
        assert!(Cli::try_parse_from(["scanguard", "scan", "/logs", "--passes", "0"]).is_err());
        assert!(
            Cli::try_parse_from(["scanguard", "scan", "/logs", "--retry-delay-ms", "0"]).is_err()
        );
    }

    #[test]
    fn test_no_retry_conflicts_with_retry_tuning() {
        let result = Cli::try_parse_from([
            "scanguard",
            "scan",
            "/logs",
            "--no-retry",
            "--max-retries",
            "2",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_quiet_conflicts_with_verbose() {
        let result = Cli::try_parse_from(["scanguard", "-q", "-v", "scan", "/logs"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_missing_path() {
        assert!(Cli::try_parse_from(["scanguard", "scan"]).is_err());
    }

    #[test]
    fn test_cli_parse_config() {
        let cli = Cli::try_parse_from(["scanguard", "config", "init"]).unwrap();
        match cli.command {
            Commands::Config(args) => assert_eq!(args.action, ConfigAction::Init),
            Commands::Scan(_) => panic!("Expected Config command"),
        }

        let cli = Cli::try_parse_from(["scanguard", "--json-errors", "config"]).unwrap();
        assert!(cli.json_errors);
        match cli.command {
            Commands::Config(args) => assert_eq!(args.action, ConfigAction::Show),
            Commands::Scan(_) => panic!("Expected Config command"),
        }
    }
}
