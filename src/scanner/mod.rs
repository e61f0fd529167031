//! Scanner module for file discovery and per-file analysis.
//!
//! This module provides functionality for:
//! - Directory walking using walkdir
//! - The [`Analyzer`] trait run by the batch runner
//! - A reference BLAKE3 [`DigestAnalyzer`]
//!
//! # Architecture
//!
//! The scanner is divided into submodules:
//! - [`walker`]: Directory traversal and file discovery
//! - [`analyzer`]: Per-file analyzers
//!
//! # Example
//!
//! ```no_run
//! use scanguard::scanner::{Walker, WalkerConfig};
//! use std::path::Path;
//!
//! let config = WalkerConfig {
//!     extensions: vec!["log".to_string()],
//!     skip_hidden: true,
//!     ..Default::default()
//! };
//!
//! let walker = Walker::new(Path::new("."), config);
//! for entry in walker.walk() {
//!     match entry {
//!         Ok(file) => println!("{}: {} bytes", file.path.display(), file.size),
//!         Err(e) => eprintln!("Warning: {}", e),
//!     }
//! }
//! ```

pub mod analyzer;
pub mod walker;

use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::resilience::{ClassifyError, ErrorKind};
use crate::signal::Cancelled;

// Re-export main types
pub use analyzer::{Analyzer, DigestAnalyzer, FileDigest};
pub use walker::Walker;

/// Metadata for a discovered file.
#[derive(Debug, Clone)]
pub struct FileEntry {
    /// Absolute path to the file
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Last modification time
    pub modified: SystemTime,
}

impl FileEntry {
    /// Create a new FileEntry.
    #[must_use]
    pub fn new(path: PathBuf, size: u64, modified: SystemTime) -> Self {
        Self {
            path,
            size,
            modified,
        }
    }
}

/// Configuration for directory walking.
#[derive(Debug, Clone, Default)]
pub struct WalkerConfig {
    /// Follow symbolic links during traversal.
    pub follow_symlinks: bool,

    /// Skip hidden files and directories (names starting with `.`).
    pub skip_hidden: bool,

    /// Only include files with one of these extensions (case-insensitive,
    /// without the dot). Empty means every file.
    pub extensions: Vec<String>,

    /// Maximum directory depth below the root. `None` means unlimited.
    pub max_depth: Option<usize>,
}

/// Errors that can occur while scanning or analyzing files.
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    /// Permission was denied when accessing a file or directory.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// The specified path was not found.
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// The specified path is not a directory.
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// The operation was cancelled.
    #[error(transparent)]
    Cancelled(#[from] Cancelled),

    /// An I/O error occurred while accessing a file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },
}

impl ScanError {
    /// Convert an I/O error on `path`, keeping the common kinds distinct.
    #[must_use]
    pub fn from_io(path: &Path, source: io::Error) -> Self {
        match source.error_kind() {
            ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            ErrorKind::Cancelled => Self::Cancelled(Cancelled),
            _ => Self::Io {
                path: path.to_path_buf(),
                source,
            },
        }
    }
}

impl ClassifyError for ScanError {
    fn error_kind(&self) -> ErrorKind {
        match self {
            Self::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::NotADirectory(_) => ErrorKind::Unclassified,
            Self::Cancelled(_) => ErrorKind::Cancelled,
            Self::Io { source, .. } => source.error_kind(),
        }
    }
}
