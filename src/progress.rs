//! Progress reporting utilities using indicatif.
//!
//! This module provides the [`ProgressCallback`] trait the batch runner
//! reports through, the terminal [`Progress`] reporter, and [`NoOpProgress`]
//! for library callers and tests.
//!
//! # Accessible Mode
//!
//! When accessible mode is enabled, progress reporting uses simplified output:
//! - No spinners or animations
//! - ASCII bars without cursor tricks
//! - Reduced update frequency for screen reader compatibility

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Phase name used while discovering files.
pub const PHASE_WALKING: &str = "walking";

/// Phase name used while analyzing files.
pub const PHASE_ANALYZING: &str = "analyzing";

/// Progress callback for batch phases.
///
/// Implement this trait to receive progress updates while a batch runs.
/// Callbacks arrive from worker threads.
pub trait ProgressCallback: Send + Sync {
    /// Called when a phase starts.
    ///
    /// # Arguments
    ///
    /// * `phase` - Name of the phase (e.g., "walking", "analyzing")
    /// * `total` - Total number of items to process, 0 if unknown
    fn on_phase_start(&self, phase: &str, total: usize);

    /// Called for each item processed.
    ///
    /// # Arguments
    ///
    /// * `current` - Number of items finished so far
    /// * `path` - Path being processed
    fn on_progress(&self, current: usize, path: &str);

    /// Called when a phase completes.
    fn on_phase_end(&self, phase: &str);

    /// Called to update the progress message.
    fn on_message(&self, _message: &str) {}
}

/// Callback that ignores every update.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpProgress;

impl ProgressCallback for NoOpProgress {
    fn on_phase_start(&self, _phase: &str, _total: usize) {}
    fn on_progress(&self, _current: usize, _path: &str) {}
    fn on_phase_end(&self, _phase: &str) {}
}

/// Progress reporter using indicatif.
///
/// Shows a spinner while walking and a bar while analyzing. Any other phase
/// name gets a plain bar labelled with the phase.
pub struct Progress {
    multi: MultiProgress,
    active: Mutex<Option<ProgressBar>>,
    quiet: bool,
    accessible: bool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Progress {
    /// Create a new progress reporter.
    ///
    /// # Arguments
    ///
    /// * `quiet` - If true, no progress bars will be displayed.
    ///
    /// # Examples
    ///
    /// ```
    /// use scanguard::progress::Progress;
    ///
    /// let progress = Progress::new(false);
    /// ```
    #[must_use]
    pub fn new(quiet: bool) -> Self {
        Self::with_accessible(quiet, false)
    }

    /// Create a new progress reporter with accessible mode.
    ///
    /// # Arguments
    ///
    /// * `quiet` - If true, no progress will be displayed.
    /// * `accessible` - If true, uses simplified output for screen readers.
    #[must_use]
    pub fn with_accessible(quiet: bool, accessible: bool) -> Self {
        Self {
            multi: MultiProgress::new(),
            active: Mutex::new(None),
            quiet,
            accessible,
        }
    }

    /// Check if accessible mode is enabled.
    #[must_use]
    pub fn is_accessible(&self) -> bool {
        self.accessible
    }

    fn walking_style(&self) -> ProgressStyle {
        if self.accessible {
            ProgressStyle::with_template("{msg} [{elapsed_precise}] {pos} files")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
        } else {
            ProgressStyle::with_template("{spinner:.green} {msg} [{elapsed_precise}] {pos} files")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
        }
    }

    fn bar_style(&self) -> ProgressStyle {
        if self.accessible {
            ProgressStyle::with_template(
                "[{elapsed_precise}] [{bar:40}] {pos}/{len} ({percent}%) {msg} (ETA: {eta})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-")
        } else {
            ProgressStyle::with_template(
                "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg} (ETA: {eta})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█>-")
        }
    }
}

impl ProgressCallback for Progress {
    fn on_phase_start(&self, phase: &str, total: usize) {
        if self.quiet {
            return;
        }

        let pb = if phase == PHASE_WALKING {
            let pb = self.multi.add(ProgressBar::new_spinner());
            pb.set_style(self.walking_style());
            pb.set_message("Walking directory");
            let tick_rate = if self.accessible { 500 } else { 100 };
            pb.enable_steady_tick(Duration::from_millis(tick_rate));
            pb
        } else {
            let pb = self.multi.add(ProgressBar::new(total as u64));
            pb.set_style(self.bar_style());
            pb.set_message(if phase == PHASE_ANALYZING {
                "Analyzing".to_string()
            } else {
                phase.to_string()
            });
            pb
        };

        if let Some(previous) = lock(&self.active).replace(pb) {
            previous.finish_and_clear();
        }
    }

    fn on_progress(&self, current: usize, path: &str) {
        if self.quiet {
            return;
        }
        if let Some(pb) = lock(&self.active).as_ref() {
            pb.set_position(current as u64);
            pb.set_message(truncate_path(path, 30));
        }
    }

    fn on_phase_end(&self, phase: &str) {
        if self.quiet {
            return;
        }
        if let Some(pb) = lock(&self.active).take() {
            let message = match phase {
                PHASE_WALKING => "Walking complete".to_string(),
                PHASE_ANALYZING => "Analysis complete".to_string(),
                other => format!("{other} complete"),
            };
            pb.finish_with_message(message);
        }
    }

    fn on_message(&self, message: &str) {
        if self.quiet {
            return;
        }
        if let Some(pb) = lock(&self.active).as_ref() {
            pb.set_message(message.to_string());
        }
    }
}

/// Truncate a path for display in the progress bar.
fn truncate_path(path: &str, max_len: usize) -> String {
    if path.chars().count() <= max_len {
        return path.to_string();
    }

    let file_name = std::path::Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let name_len = file_name.chars().count();
    if name_len >= max_len {
        let tail: String = file_name
            .chars()
            .skip(name_len + 3 - max_len)
            .collect();
        return format!("...{tail}");
    }

    format!(".../{file_name}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_short_path_unchanged() {
        assert_eq!(truncate_path("logs/a.log", 30), "logs/a.log");
    }

    #[test]
    fn test_truncate_keeps_file_name() {
        let path = "/very/long/directory/structure/for/testing/crash.log";
        assert_eq!(truncate_path(path, 30), ".../crash.log");
    }

    #[test]
    fn test_truncate_long_file_name() {
        let name = "a".repeat(40);
        let truncated = truncate_path(&format!("/dir/{name}"), 30);
        assert_eq!(truncated.chars().count(), 30);
        assert!(truncated.starts_with("..."));
    }

    #[test]
    fn test_quiet_progress_ignores_updates() {
        let progress = Progress::new(true);
        progress.on_phase_start(PHASE_ANALYZING, 10);
        progress.on_progress(1, "a.log");
        progress.on_phase_end(PHASE_ANALYZING);
        assert!(lock(&progress.active).is_none());
    }
}
