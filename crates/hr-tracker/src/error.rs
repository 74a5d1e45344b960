//! Error types for the hr-tracker crate.
//!
//! This module provides the [`TrackerError`] type for errors that can occur
//! while walking module trees and analyzing their files.

use camino::Utf8PathBuf;

/// Errors that can occur during tracking operations.
///
/// # Error Recovery Strategy
///
/// - **Walker errors** ([`TrackerError::Walk`], [`TrackerError::InvalidRoot`]):
///   fatal to the walk, propagate immediately
/// - **File read errors** ([`TrackerError::Read`]): log, skip the file, continue
/// - **Parse errors** ([`TrackerError::Parse`]): log, skip the file, continue
///
/// The trackers themselves never return these for single-file problems; they
/// degrade to "no information" instead. Errors only surface from bulk
/// operations such as priming.
///
/// # Examples
///
/// ```
/// use hr_tracker::TrackerError;
///
/// fn handle_error(err: &TrackerError) {
///     if err.is_recoverable() {
///         eprintln!("skipping: {err}");
///     } else {
///         eprintln!("fatal: {err}");
///     }
/// }
/// ```
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    /// Failed to walk a directory.
    #[error("failed to walk directory: {0}")]
    Walk(#[from] ignore::Error),

    /// The walk root does not exist or is not a directory.
    #[error("not a directory: {0}")]
    InvalidRoot(Utf8PathBuf),

    /// Failed to read a file.
    #[error("failed to read file {path}: {source}")]
    Read {
        /// The path of the file that couldn't be read.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse a Python file.
    #[error("failed to parse file {path}: {source}")]
    Parse {
        /// The path of the file that couldn't be parsed.
        path: Utf8PathBuf,
        /// The underlying parse error.
        #[source]
        source: hr_py_parser::ParseError,
    },

    /// A path is not valid UTF-8.
    #[error("path is not valid UTF-8: {}", _0.display())]
    NonUtf8Path(std::path::PathBuf),

    /// The dependency graph could not be computed.
    ///
    /// The graph degrades gracefully on incomplete data, so this indicates
    /// a bug rather than bad input.
    #[error("dependency resolution failed: {0}")]
    DependencyResolution(String),
}

impl TrackerError {
    /// Creates a new [`TrackerError::Read`] error.
    #[inline]
    pub fn read(path: impl Into<Utf8PathBuf>, source: std::io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source,
        }
    }

    /// Creates a new [`TrackerError::Parse`] error.
    #[inline]
    pub fn parse(path: impl Into<Utf8PathBuf>, source: hr_py_parser::ParseError) -> Self {
        Self::Parse {
            path: path.into(),
            source,
        }
    }

    /// Returns `true` if this error only affects a single file.
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Read { .. } | Self::Parse { .. } | Self::NonUtf8Path(_)
        )
    }

    /// Returns the file path associated with this error, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Utf8PathBuf> {
        match self {
            Self::Read { path, .. } | Self::Parse { path, .. } | Self::InvalidRoot(path) => {
                Some(path)
            }
            Self::Walk(_) | Self::NonUtf8Path(_) | Self::DependencyResolution(_) => None,
        }
    }
}
