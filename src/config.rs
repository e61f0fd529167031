//! Application configuration management.
//!
//! Settings are layered with figment, later layers winning:
//!
//! 1. Built-in defaults
//! 2. A TOML file (`--config`, or the platform config directory)
//! 3. `SCANGUARD_` environment variables, nested with `__`
//!    (e.g. `SCANGUARD_RETRY__MAX_RETRIES=5`)
//! 4. Command-line flags, applied by [`crate::cli::ScanArgs::apply_to`]
//!
//! [`Settings`] is also where feature switches become implementations: a
//! disabled retry section builds a [`NoRetryPolicy`], a disabled cache
//! section builds a [`DisabledCache`](crate::cache::DisabledCache), and so on.
//!
//! # Example file
//!
//! ```toml
//! io_threads = 8
//!
//! [retry]
//! max_retries = 5
//! retry_delay_ms = 250
//!
//! [breaker]
//! failure_threshold = 10
//! stop_on_open = false
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::batch::{BatchConfig, DEFAULT_IO_THREADS};
use crate::cache::{build_cache, ResultCache};
use crate::progress::ProgressCallback;
use crate::resilience::{
    CircuitBreaker, DefaultErrorPolicy, ErrorPolicy, NoRetryPolicy, ResilientExecutor,
    DEFAULT_FAILURE_THRESHOLD, DEFAULT_MAX_RETRIES, DEFAULT_OPEN_TIMEOUT, DEFAULT_RETRY_DELAY,
};
use crate::signal::CancellationToken;

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "SCANGUARD_";

/// Errors raised while loading, validating or saving settings.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// An explicitly requested config file does not exist.
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// A layer could not be parsed or did not match the schema.
    #[error("Invalid configuration: {0}")]
    Parse(#[from] Box<figment::Error>),

    /// A value is out of range.
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// The settings could not be encoded as TOML.
    #[error("Failed to encode configuration: {0}")]
    Encode(#[from] toml::ser::Error),

    /// Reading or writing the config file failed.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path of the config file
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// No platform config directory could be determined.
    #[error("Failed to determine project directories")]
    NoConfigDir,
}

/// Retry behavior of the executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// When false, no error is ever retried.
    pub enabled: bool,
    /// Retries granted to transient errors.
    pub max_retries: u32,
    /// Delay between attempts in milliseconds.
    pub retry_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_ms: duration_millis(DEFAULT_RETRY_DELAY),
        }
    }
}

/// Circuit breaker around each file analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerSettings {
    /// When false, no breaker is built.
    pub enabled: bool,
    /// Consecutive failures that open the breaker.
    pub failure_threshold: u32,
    /// Time spent open before a trial, in milliseconds.
    pub open_timeout_ms: u64,
    /// Abort the batch when the breaker rejects a file.
    pub stop_on_open: bool,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            open_timeout_ms: duration_millis(DEFAULT_OPEN_TIMEOUT),
            stop_on_open: true,
        }
    }
}

/// Result caching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// When false, every analysis runs.
    pub enabled: bool,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Application settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Number of I/O threads for parallel analysis.
    pub io_threads: usize,
    /// Executor retry settings.
    pub retry: RetrySettings,
    /// Circuit breaker settings.
    pub breaker: BreakerSettings,
    /// Result cache settings.
    pub cache: CacheSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            io_threads: DEFAULT_IO_THREADS,
            retry: RetrySettings::default(),
            breaker: BreakerSettings::default(),
            cache: CacheSettings::default(),
        }
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl Settings {
    /// Load settings from defaults, the TOML file and the environment.
    ///
    /// # Arguments
    ///
    /// * `path` - Explicit config file. When `None`, the platform default is
    ///   used if it exists.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if an explicit file is missing, a layer fails
    /// to parse, or the merged settings do not validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let figment = Self::base_figment(path)?.merge(Env::prefixed(ENV_PREFIX).split("__"));
        Self::extract(&figment)
    }

    /// Like [`load`](Self::load) without the environment layer.
    ///
    /// # Errors
    ///
    /// Same as [`load`](Self::load).
    pub fn load_isolated(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::extract(&Self::base_figment(path)?)
    }

    fn base_figment(path: Option<&Path>) -> Result<Figment, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        let file = match path {
            Some(explicit) => {
                if !explicit.is_file() {
                    return Err(ConfigError::NotFound(explicit.to_path_buf()));
                }
                Some(explicit.to_path_buf())
            }
            None => Self::default_path().filter(|p| p.is_file()),
        };

        if let Some(file) = file {
            log::debug!("Loading config from {}", file.display());
            figment = figment.merge(Toml::file(file));
        }
        Ok(figment)
    }

    fn extract(figment: &Figment) -> Result<Self, ConfigError> {
        let settings: Self = figment.extract().map_err(Box::new)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.io_threads == 0 {
            return Err(ConfigError::Invalid("io_threads must be at least 1".into()));
        }
        if self.retry.retry_delay_ms == 0 {
            return Err(ConfigError::Invalid(
                "retry.retry_delay_ms must be greater than 0".into(),
            ));
        }
        if self.breaker.failure_threshold == 0 {
            return Err(ConfigError::Invalid(
                "breaker.failure_threshold must be at least 1".into(),
            ));
        }
        if self.breaker.open_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "breaker.open_timeout_ms must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Write the settings to `path` as TOML, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if encoding or writing fails.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).map_err(io_err)
    }

    /// Get the default platform-specific configuration path.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "scanguard", "scanguard")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Save to [`default_path`](Self::default_path).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoConfigDir`] if no config directory exists on
    /// this platform, otherwise as [`save`](Self::save).
    pub fn save_default(&self) -> Result<PathBuf, ConfigError> {
        let path = Self::default_path().ok_or(ConfigError::NoConfigDir)?;
        self.save(&path)?;
        Ok(path)
    }

    /// The error policy selected by the retry section.
    #[must_use]
    pub fn build_policy(&self) -> Arc<dyn ErrorPolicy> {
        if self.retry.enabled {
            Arc::new(
                DefaultErrorPolicy::new()
                    .with_max_retries(self.retry.max_retries)
                    .with_retry_delay(Duration::from_millis(self.retry.retry_delay_ms)),
            )
        } else {
            Arc::new(NoRetryPolicy)
        }
    }

    /// An executor driven by [`build_policy`](Self::build_policy).
    #[must_use]
    pub fn build_executor(&self) -> Arc<ResilientExecutor> {
        Arc::new(ResilientExecutor::new(self.build_policy()))
    }

    /// The breaker selected by the breaker section.
    #[must_use]
    pub fn build_breaker(&self) -> Option<Arc<CircuitBreaker>> {
        self.breaker.enabled.then(|| {
            Arc::new(
                CircuitBreaker::new(
                    self.breaker.failure_threshold,
                    Duration::from_millis(self.breaker.open_timeout_ms),
                )
                .with_name("analysis"),
            )
        })
    }

    /// The cache selected by the cache section.
    #[must_use]
    pub fn build_cache(&self) -> Arc<dyn ResultCache> {
        build_cache(self.cache.enabled)
    }

    /// A batch configuration wired from these settings.
    ///
    /// The cache is passed in so it can outlive a single batch.
    #[must_use]
    pub fn batch_config(
        &self,
        cache: Arc<dyn ResultCache>,
        cancel: CancellationToken,
        progress: Arc<dyn ProgressCallback>,
    ) -> BatchConfig {
        let mut config = BatchConfig::default()
            .with_io_threads(self.io_threads)
            .with_cache(cache)
            .with_executor(self.build_executor())
            .with_stop_on_open_circuit(self.breaker.stop_on_open)
            .with_cancellation(cancel)
            .with_progress_callback(progress);
        if let Some(breaker) = self.build_breaker() {
            config = config.with_breaker(breaker);
        }
        config
    }
}
