//! Directory walker implementation using walkdir.
//!
//! # Overview
//!
//! This module provides the [`Walker`] struct for traversing a directory
//! tree and collecting the files a batch should analyze.
//!
//! # Features
//!
//! - Deterministic, name-sorted traversal
//! - Optional symlink following
//! - Extension filtering (case-insensitive)
//! - Hidden file filtering
//! - Cooperative cancellation via [`CancellationToken`]
//!
//! # Example
//!
//! ```no_run
//! use scanguard::scanner::{Walker, WalkerConfig};
//! use std::path::Path;
//!
//! let config = WalkerConfig {
//!     skip_hidden: true,
//!     ..Default::default()
//! };
//!
//! let walker = Walker::new(Path::new("/var/log/game"), config);
//! for entry in walker.walk() {
//!     match entry {
//!         Ok(file) => println!("{}: {} bytes", file.path.display(), file.size),
//!         Err(e) => eprintln!("Warning: {}", e),
//!     }
//! }
//! ```

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use walkdir::{DirEntry, WalkDir};

use super::{FileEntry, ScanError, WalkerConfig};
use crate::signal::CancellationToken;

/// Directory walker for file discovery.
#[derive(Debug)]
pub struct Walker {
    /// Root path to walk
    root: PathBuf,
    /// Walker configuration
    config: WalkerConfig,
    /// Optional token for graceful termination
    cancel: Option<CancellationToken>,
}

impl Walker {
    /// Create a new walker for the given path.
    ///
    /// # Arguments
    ///
    /// * `path` - Root directory to scan
    /// * `config` - Walker configuration options
    #[must_use]
    pub fn new(path: &Path, config: WalkerConfig) -> Self {
        Self {
            root: path.to_path_buf(),
            config,
            cancel: None,
        }
    }

    /// Stop iteration as soon as `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }

    fn is_hidden(entry: &DirEntry) -> bool {
        entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with('.') && name != "." && name != "..")
    }

    /// Check if a file passes the extension filter.
    fn passes_extension_filter(&self, path: &Path) -> bool {
        if self.config.extensions.is_empty() {
            return true;
        }

        let extension = path
            .extension()
            .and_then(|s| s.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        self.config
            .extensions
            .iter()
            .any(|wanted| wanted.trim_start_matches('.').eq_ignore_ascii_case(&extension))
    }

    /// Walk the directory tree, yielding file entries.
    ///
    /// Errors are yielded as [`ScanError`] values rather than stopping
    /// iteration. A root that does not exist or is not a directory yields a
    /// single error.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use scanguard::scanner::{Walker, WalkerConfig};
    /// use std::path::Path;
    ///
    /// let walker = Walker::new(Path::new("."), WalkerConfig::default());
    /// let files: Vec<_> = walker.walk().filter_map(Result::ok).collect();
    /// println!("Found {} files", files.len());
    /// ```
    pub fn walk(&self) -> Box<dyn Iterator<Item = Result<FileEntry, ScanError>> + '_> {
        match std::fs::metadata(&self.root) {
            Ok(meta) if !meta.is_dir() => {
                return Box::new(std::iter::once(Err(ScanError::NotADirectory(
                    self.root.clone(),
                ))));
            }
            Ok(_) => {}
            Err(e) => {
                return Box::new(std::iter::once(Err(ScanError::from_io(&self.root, e))));
            }
        }

        let mut walk_dir = WalkDir::new(&self.root)
            .follow_links(self.config.follow_symlinks)
            .sort_by_file_name();
        if let Some(depth) = self.config.max_depth {
            walk_dir = walk_dir.max_depth(depth.saturating_add(1));
        }

        let skip_hidden = self.config.skip_hidden;
        let iter = walk_dir
            .into_iter()
            .filter_entry(move |entry| entry.depth() == 0 || !(skip_hidden && Self::is_hidden(entry)))
            .take_while(move |_| {
                if self.is_cancelled() {
                    log::debug!("Walker: Cancellation requested, stopping iteration");
                    false
                } else {
                    true
                }
            })
            .filter_map(move |entry_result| match entry_result {
                Ok(entry) => self.process_entry(&entry),
                Err(e) => Some(self.handle_walk_error(e)),
            });

        Box::new(iter)
    }

    fn process_entry(&self, entry: &DirEntry) -> Option<Result<FileEntry, ScanError>> {
        if !entry.file_type().is_file() {
            if entry.path_is_symlink() && !self.config.follow_symlinks {
                log::trace!("Skipping symlink: {}", entry.path().display());
            }
            return None;
        }

        let path = entry.path();
        if !self.passes_extension_filter(path) {
            log::trace!("Skipping file due to extension filter: {}", path.display());
            return None;
        }

        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(e) => return Some(self.handle_walk_error(e)),
        };

        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        Some(Ok(FileEntry::new(
            path.to_path_buf(),
            metadata.len(),
            modified,
        )))
    }

    fn handle_walk_error(&self, error: walkdir::Error) -> Result<FileEntry, ScanError> {
        let path = error
            .path()
            .map_or_else(|| self.root.clone(), Path::to_path_buf);
        match error.into_io_error() {
            Some(io) => {
                let err = ScanError::from_io(&path, io);
                match &err {
                    ScanError::PermissionDenied(_) => {
                        log::warn!("Permission denied: {}", path.display());
                    }
                    ScanError::NotFound(_) => {
                        log::debug!("File not found (may have been deleted): {}", path.display());
                    }
                    other => log::warn!("{}", other),
                }
                Err(err)
            }
            None => {
                log::warn!("Filesystem loop detected at {}", path.display());
                Err(ScanError::Io {
                    path,
                    source: std::io::Error::other("filesystem loop detected"),
                })
            }
        }
    }
}
