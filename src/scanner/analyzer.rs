//! Per-file analyzers run by the batch runner.
//!
//! # Overview
//!
//! An [`Analyzer`] turns one file into one result. The batch runner wraps
//! every call in the resilient executor and stores results in the file
//! result cache keyed by [`Analyzer::kind`], so an analyzer only has to be
//! correct for a single file.
//!
//! [`DigestAnalyzer`] is the reference implementation: a streaming BLAKE3
//! digest plus the byte and line counts of the file.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use serde::Serialize;

use super::ScanError;
use crate::signal::CancellationToken;

/// Buffer size for streaming file contents (64KB).
pub const READ_BUFFER_SIZE: usize = 64 * 1024;

/// A unit of per-file work.
///
/// Implementations must be safe to call from several worker threads at once
/// and should poll `cancel` between chunks of work.
pub trait Analyzer: Send + Sync {
    /// Result produced for one file. Cached results are cloned out of the cache.
    type Output: Clone + Send + Sync + Serialize + 'static;

    /// Stable identifier used as the cache key for this analyzer's results.
    fn kind(&self) -> &str;

    /// Analyze the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError`] if the file cannot be read or `cancel` fires.
    fn analyze(&self, path: &Path, cancel: &CancellationToken) -> Result<Self::Output, ScanError>;
}

/// Output of [`DigestAnalyzer`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileDigest {
    /// BLAKE3 hash of the contents, hex encoded
    pub hash: String,
    /// Number of bytes read
    pub size: u64,
    /// Number of `\n` terminated lines, plus one for a trailing partial line
    pub line_count: u64,
}

/// Streaming BLAKE3 digest of file contents.
///
/// # Example
///
/// ```no_run
/// use scanguard::scanner::{Analyzer, DigestAnalyzer};
/// use scanguard::signal::CancellationToken;
/// use std::path::Path;
///
/// let digest = DigestAnalyzer::new()
///     .analyze(Path::new("crash-2024-01-01.log"), &CancellationToken::new())
///     .unwrap();
/// println!("{} ({} lines)", digest.hash, digest.line_count);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct DigestAnalyzer {
    buffer_size: usize,
}

impl Default for DigestAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl DigestAnalyzer {
    /// Create an analyzer with the default read buffer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer_size: READ_BUFFER_SIZE,
        }
    }

    /// Override the read buffer size. Clamped to at least one byte.
    #[must_use]
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size.max(1);
        self
    }
}

impl Analyzer for DigestAnalyzer {
    type Output = FileDigest;

    fn kind(&self) -> &str {
        "digest"
    }

    fn analyze(&self, path: &Path, cancel: &CancellationToken) -> Result<FileDigest, ScanError> {
        cancel.check()?;

        let file = File::open(path).map_err(|e| ScanError::from_io(path, e))?;
        let mut reader = BufReader::with_capacity(self.buffer_size, file);
        let mut buffer = vec![0u8; self.buffer_size];
        let mut hasher = blake3::Hasher::new();
        let mut size = 0u64;
        let mut line_count = 0u64;
        let mut last_byte = None;

        loop {
            cancel.check()?;
            let read = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(ScanError::from_io(path, e)),
            };
            let chunk = &buffer[..read];
            hasher.update(chunk);
            size += read as u64;
            line_count += chunk.iter().filter(|&&b| b == b'\n').count() as u64;
            last_byte = chunk.last().copied();
        }

        if last_byte.is_some_and(|b| b != b'\n') {
            line_count += 1;
        }

        log::trace!("Digested {} ({} bytes)", path.display(), size);
        Ok(FileDigest {
            hash: hasher.finalize().to_hex().to_string(),
            size,
            line_count,
        })
    }
}
