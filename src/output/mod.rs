//! Output formatters for batch results.
//!
//! This module provides different output formats for scan results:
//! - Text for people at a terminal
//! - JSON for automation and scripting
//!
//! # Example
//!
//! ```no_run
//! use scanguard::batch::{BatchConfig, BatchRunner};
//! use scanguard::cache::CacheStatistics;
//! use scanguard::error::ExitCode;
//! use scanguard::output::JsonOutput;
//! use scanguard::scanner::DigestAnalyzer;
//!
//! let report = BatchRunner::new(BatchConfig::default()).run(Vec::new(), &DigestAnalyzer::new());
//! let passes = [report.summary];
//!
//! let output = JsonOutput::new(&report, &passes, CacheStatistics::default(), ExitCode::Success);
//! println!("{}", output.to_json_pretty().unwrap());
//! ```

pub mod json;
pub mod text;

// Re-export main types
pub use json::{JsonOutput, JsonOutputError};
pub use text::TextOutput;
