//! Configuration structures for the hot-reload engine.
//!
//! Configuration comes in two layers:
//!
//! - [`HotReloadSettings`] - the raw option set, as read from a JSON file or
//!   built in code. Every field has a default and is freely mutable.
//! - [`HotReloadConfig`] - the validated, immutable view handed to the
//!   watcher and the reload service. It can only be obtained through
//!   [`HotReloadConfig::new`], which rejects invalid values instead of
//!   clamping them.
//!
//! # Examples
//!
//! ```
//! use hr_core::{HotReloadConfig, HotReloadSettings};
//!
//! let settings = HotReloadSettings {
//!     debounce_delay: 0.5,
//!     ..HotReloadSettings::default()
//! };
//! let config = HotReloadConfig::new(settings)?;
//! assert_eq!(config.debounce_delay().as_millis(), 500);
//! # Ok::<(), hr_core::ConfigError>(())
//! ```

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use globset::Glob;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Log verbosity requested by the configuration.
///
/// Only consulted by the binary when `RUST_LOG` is not set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum LogLevel {
    /// Everything, including filtered and duplicate file events.
    Trace,
    /// State transitions and debounce activity.
    Debug,
    /// Reload outcomes.
    #[default]
    Info,
    /// Suppressed reloads and skipped directories.
    Warn,
    /// Reload failures only.
    Error,
}

impl LogLevel {
    /// Returns the level as an `EnvFilter` directive.
    ///
    /// # Examples
    ///
    /// ```
    /// use hr_core::LogLevel;
    ///
    /// assert_eq!(LogLevel::Debug.as_str(), "debug");
    /// ```
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Raw hot-reload options.
///
/// Durations are expressed in seconds so that configuration files stay
/// human-editable. Missing fields in a configuration file fall back to the
/// [`Default`] values.
///
/// # Examples
///
/// ```
/// use hr_core::HotReloadSettings;
///
/// let settings = HotReloadSettings::from_json_str(r#"{"debounce_delay": 0.25}"#)?;
/// assert!((settings.debounce_delay - 0.25).abs() < f64::EPSILON);
/// assert_eq!(settings.max_reload_attempts, 3);
/// # Ok::<(), hr_core::ConfigError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HotReloadSettings {
    /// Whether the service starts watching as soon as it is started.
    pub enabled: bool,

    /// Directory that dotted extension identifiers are relative to.
    pub base_dir: Utf8PathBuf,

    /// Directories to watch, relative to the working directory or absolute.
    pub watch_directories: Vec<Utf8PathBuf>,

    /// Glob patterns a file name must match to be considered.
    pub file_patterns: Vec<String>,

    /// Glob patterns that exclude a path even if it matches `file_patterns`.
    pub ignore_patterns: Vec<String>,

    /// Seconds to wait after the last change before reloading.
    pub debounce_delay: f64,

    /// How many times a failing load/reload is attempted.
    pub max_reload_attempts: u32,

    /// Upper bound, in seconds, for a single load/reload call.
    pub reload_timeout: f64,

    /// Whether dependents of a changed extension are reloaded too.
    pub track_dependencies: bool,

    /// Maximum recursion depth for dependency traversal.
    pub max_dependency_depth: usize,

    /// Maximum number of files whose parsed imports are cached.
    pub dependency_cache_size: usize,

    /// Whether reload failures are logged and counted instead of returned.
    pub continue_on_error: bool,

    /// Log verbosity for the binary.
    pub log_level: LogLevel,

    /// Whether files are parsed before a reload is signalled.
    pub enable_syntax_checking: bool,

    /// Whether reload durations are logged and slow reloads flagged.
    pub enable_performance_monitoring: bool,

    /// Whether class signature changes are tracked and logged.
    pub enable_class_tracking: bool,
}

impl Default for HotReloadSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            base_dir: Utf8PathBuf::from("."),
            watch_directories: vec![Utf8PathBuf::from("cogs")],
            file_patterns: vec!["*.py".to_owned()],
            ignore_patterns: vec![
                "*.pyc".to_owned(),
                "__pycache__/*".to_owned(),
                ".git/*".to_owned(),
                "*.tmp".to_owned(),
                "*.swp".to_owned(),
                "*~".to_owned(),
                ".#*".to_owned(),
            ],
            debounce_delay: 2.0,
            max_reload_attempts: 3,
            reload_timeout: 30.0,
            track_dependencies: true,
            max_dependency_depth: 5,
            dependency_cache_size: 1000,
            continue_on_error: true,
            log_level: LogLevel::Info,
            enable_syntax_checking: true,
            enable_performance_monitoring: true,
            enable_class_tracking: true,
        }
    }
}

impl HotReloadSettings {
    /// Parses settings from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the JSON is malformed or a field has
    /// the wrong type.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads settings from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read and
    /// [`ConfigError::Parse`] if it is not valid settings JSON.
    pub fn from_json_file(path: &Utf8Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Validates these settings into a [`HotReloadConfig`].
    ///
    /// Shorthand for [`HotReloadConfig::new`].
    pub fn validate(self) -> Result<HotReloadConfig, ConfigError> {
        HotReloadConfig::new(self)
    }
}

/// Validated, immutable hot-reload configuration.
///
/// There are no setters: build a new [`HotReloadSettings`] and validate it
/// again to change anything.
#[derive(Debug, Clone, PartialEq)]
pub struct HotReloadConfig {
    settings: HotReloadSettings,
    debounce_delay: Duration,
    reload_timeout: Duration,
}

impl HotReloadConfig {
    /// Validates `settings` and freezes them.
    ///
    /// Watch directories are allowed to be missing here; the watcher skips
    /// them with a warning. Use [`missing_watch_directories`] to inspect them.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOption`] for out-of-range values and
    /// [`ConfigError::InvalidPattern`] for globs that do not compile.
    ///
    /// # Examples
    ///
    /// ```
    /// use hr_core::{ConfigError, HotReloadConfig, HotReloadSettings};
    ///
    /// let settings = HotReloadSettings {
    ///     max_reload_attempts: 0,
    ///     ..HotReloadSettings::default()
    /// };
    /// assert!(matches!(
    ///     HotReloadConfig::new(settings),
    ///     Err(ConfigError::InvalidOption { .. })
    /// ));
    /// ```
    ///
    /// [`missing_watch_directories`]: Self::missing_watch_directories
    pub fn new(settings: HotReloadSettings) -> Result<Self, ConfigError> {
        if !settings.debounce_delay.is_finite() || settings.debounce_delay < 0.0 {
            return Err(ConfigError::invalid_option(
                "debounce_delay",
                format!("must be a finite number >= 0, got {}", settings.debounce_delay),
            ));
        }
        if settings.max_reload_attempts == 0 {
            return Err(ConfigError::invalid_option(
                "max_reload_attempts",
                "must be at least 1",
            ));
        }
        if !settings.reload_timeout.is_finite() || settings.reload_timeout <= 0.0 {
            return Err(ConfigError::invalid_option(
                "reload_timeout",
                format!("must be a finite number > 0, got {}", settings.reload_timeout),
            ));
        }
        if settings.dependency_cache_size == 0 {
            return Err(ConfigError::invalid_option(
                "dependency_cache_size",
                "must be at least 1",
            ));
        }
        if settings.file_patterns.is_empty() {
            return Err(ConfigError::invalid_option(
                "file_patterns",
                "at least one pattern is required",
            ));
        }
        for pattern in settings.file_patterns.iter().chain(&settings.ignore_patterns) {
            Glob::new(pattern).map_err(|e| ConfigError::InvalidPattern {
                pattern: pattern.clone(),
                reason: e.kind().to_string(),
            })?;
        }

        let debounce_delay = Duration::try_from_secs_f64(settings.debounce_delay)
            .map_err(|e| ConfigError::invalid_option("debounce_delay", e.to_string()))?;
        let reload_timeout = Duration::try_from_secs_f64(settings.reload_timeout)
            .map_err(|e| ConfigError::invalid_option("reload_timeout", e.to_string()))?;

        Ok(Self {
            settings,
            debounce_delay,
            reload_timeout,
        })
    }

    /// Returns the raw settings this configuration was validated from.
    #[inline]
    #[must_use]
    pub const fn settings(&self) -> &HotReloadSettings {
        &self.settings
    }

    /// Whether the service should start watching immediately.
    #[inline]
    #[must_use]
    pub const fn enabled(&self) -> bool {
        self.settings.enabled
    }

    /// Directory that extension identifiers are relative to.
    #[inline]
    #[must_use]
    pub fn base_dir(&self) -> &Utf8Path {
        &self.settings.base_dir
    }

    /// Directories to watch.
    #[inline]
    #[must_use]
    pub fn watch_directories(&self) -> &[Utf8PathBuf] {
        &self.settings.watch_directories
    }

    /// Include glob patterns.
    #[inline]
    #[must_use]
    pub fn file_patterns(&self) -> &[String] {
        &self.settings.file_patterns
    }

    /// Ignore glob patterns.
    #[inline]
    #[must_use]
    pub fn ignore_patterns(&self) -> &[String] {
        &self.settings.ignore_patterns
    }

    /// Debounce window applied per extension.
    #[inline]
    #[must_use]
    pub const fn debounce_delay(&self) -> Duration {
        self.debounce_delay
    }

    /// Number of attempts made for a failing load/reload.
    #[inline]
    #[must_use]
    pub const fn max_reload_attempts(&self) -> u32 {
        self.settings.max_reload_attempts
    }

    /// Upper bound for a single host call.
    #[inline]
    #[must_use]
    pub const fn reload_timeout(&self) -> Duration {
        self.reload_timeout
    }

    /// Whether dependents are reloaded alongside a changed extension.
    #[inline]
    #[must_use]
    pub const fn track_dependencies(&self) -> bool {
        self.settings.track_dependencies
    }

    /// Maximum dependency traversal depth.
    #[inline]
    #[must_use]
    pub const fn max_dependency_depth(&self) -> usize {
        self.settings.max_dependency_depth
    }

    /// Capacity of the parsed-imports cache.
    #[inline]
    #[must_use]
    pub const fn dependency_cache_size(&self) -> usize {
        self.settings.dependency_cache_size
    }

    /// Whether reload failures are swallowed after being recorded.
    #[inline]
    #[must_use]
    pub const fn continue_on_error(&self) -> bool {
        self.settings.continue_on_error
    }

    /// Requested log level.
    #[inline]
    #[must_use]
    pub const fn log_level(&self) -> LogLevel {
        self.settings.log_level
    }

    /// Whether changed files are syntax-checked before reloading.
    #[inline]
    #[must_use]
    pub const fn syntax_checking(&self) -> bool {
        self.settings.enable_syntax_checking
    }

    /// Whether reload timings are logged.
    #[inline]
    #[must_use]
    pub const fn performance_monitoring(&self) -> bool {
        self.settings.enable_performance_monitoring
    }

    /// Whether class signature changes are tracked.
    #[inline]
    #[must_use]
    pub const fn class_tracking(&self) -> bool {
        self.settings.enable_class_tracking
    }

    /// Returns the configured watch directories that do not currently exist.
    #[must_use]
    pub fn missing_watch_directories(&self) -> Vec<&Utf8Path> {
        self.settings
            .watch_directories
            .iter()
            .map(Utf8PathBuf::as_path)
            .filter(|dir| !dir.is_dir())
            .collect()
    }
}

impl TryFrom<HotReloadSettings> for HotReloadConfig {
    type Error = ConfigError;

    fn try_from(settings: HotReloadSettings) -> Result<Self, Self::Error> {
        Self::new(settings)
    }
}
