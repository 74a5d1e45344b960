//! Error types for the hr-core crate.
//!
//! This module provides the [`ConfigError`] type for configuration-related
//! errors. Configuration problems are always fatal to the operation that
//! produced them; values are never clamped or silently defaulted.

use camino::Utf8PathBuf;

/// Errors that can occur while loading or validating hot-reload configuration.
///
/// # Examples
///
/// ```
/// use hr_core::ConfigError;
///
/// let error = ConfigError::invalid_option("reload_timeout", "must be greater than zero");
/// assert!(error.to_string().contains("reload_timeout"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A configuration option has an invalid value.
    #[error("invalid configuration option '{option}': {reason}")]
    InvalidOption {
        /// The name of the invalid option.
        option: String,
        /// Explanation of why the option is invalid.
        reason: String,
    },

    /// A glob pattern in `file_patterns` or `ignore_patterns` failed to compile.
    #[error("invalid glob pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// The glob compiler's complaint.
        reason: String,
    },

    /// A required directory does not exist.
    #[error("missing required directory: {0}")]
    MissingDirectory(Utf8PathBuf),

    /// An I/O error occurred while reading configuration.
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ConfigError {
    /// Creates a new [`ConfigError::InvalidOption`] error.
    #[inline]
    pub fn invalid_option(option: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidOption {
            option: option.into(),
            reason: reason.into(),
        }
    }

    /// Returns the option name for [`ConfigError::InvalidOption`] errors.
    #[must_use]
    pub fn option(&self) -> Option<&str> {
        match self {
            Self::InvalidOption { option, .. } => Some(option),
            Self::InvalidPattern { .. } | Self::MissingDirectory(_) | Self::Io(_) | Self::Parse(_) => {
                None
            }
        }
    }
}
