//! Error types for the hr-service crate.
//!
//! # Error Recovery Strategy
//!
//! - **Config** ([`ServiceError::Config`]): Fatal - the service is never built
//! - **Watch** ([`ServiceError::Watch`]): Fatal to `start`/`stop`; trackers
//!   stay intact
//! - **Module reload / timeout**: Only returned when `continue_on_error` is
//!   off; otherwise logged and counted
//! - **Dependency resolution / parse**: Recovered locally wherever possible

use std::time::Duration;

use hr_core::{ConfigError, ExtensionId};
use hr_py_parser::ParseError;
use hr_tracker::TrackerError;
use hr_watcher::WatchError;

/// Errors surfaced by [`HotReloadService`](crate::HotReloadService).
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Filesystem observation failed to start or stop.
    #[error("file watching failed: {0}")]
    Watch(#[from] WatchError),

    /// An extension failed to load, reload, or unload.
    #[error("failed to reload extension '{extension}': {reason}")]
    ModuleReload {
        /// The extension.
        extension: ExtensionId,
        /// What the host reported.
        reason: String,
    },

    /// A host call exceeded the configured reload timeout.
    #[error("reload of extension '{extension}' timed out after {timeout:?}")]
    Timeout {
        /// The extension.
        extension: ExtensionId,
        /// The bound that was exceeded.
        timeout: Duration,
    },

    /// The dependency graph could not be computed.
    #[error("dependency resolution failed: {0}")]
    DependencyResolution(#[from] TrackerError),

    /// A source file could not be parsed.
    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl ServiceError {
    /// Creates a [`ServiceError::ModuleReload`].
    pub fn module_reload(extension: &ExtensionId, reason: impl Into<String>) -> Self {
        Self::ModuleReload {
            extension: extension.clone(),
            reason: reason.into(),
        }
    }

    /// Returns the extension the error concerns, if any.
    #[must_use]
    pub fn extension(&self) -> Option<&ExtensionId> {
        match self {
            Self::ModuleReload { extension, .. } | Self::Timeout { extension, .. } => {
                Some(extension)
            }
            Self::Config(_) | Self::Watch(_) | Self::DependencyResolution(_) | Self::Parse(_) => {
                None
            }
        }
    }

    /// Returns `true` for failures of a single reload, which
    /// `continue_on_error` may downgrade to a log entry.
    #[must_use]
    pub const fn is_reload_failure(&self) -> bool {
        matches!(self, Self::ModuleReload { .. } | Self::Timeout { .. })
    }
}
