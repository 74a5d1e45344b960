//! Error types for the hr-watcher crate.
//!
//! Missing watch directories and unreadable or non-UTF-8 event paths are
//! not errors here: they are logged and skipped where they occur, so one
//! bad path never stops observation of the others. What remains is fatal to
//! starting or stopping a [`FileWatcher`](crate::FileWatcher).

use std::path::PathBuf;

/// Errors from building a filter or running the OS watcher.
///
/// # Examples
///
/// ```
/// use hr_watcher::{GlobFilter, WatchError};
///
/// let err = GlobFilter::new(&["cogs/[ab.py"], &[] as &[&str]).unwrap_err();
/// assert!(matches!(err, WatchError::InvalidPattern(_)));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// The OS notification backend refused a watch.
    #[error("cannot observe file changes: {0}")]
    Notify(#[from] notify::Error),

    /// The watcher thread exited before reporting whether it started.
    #[error("watcher thread exited before it was ready")]
    ChannelClosed,

    /// The watcher thread panicked.
    #[error("watcher thread panicked")]
    ThreadPanicked,

    /// An include or ignore glob failed to compile.
    #[error("invalid glob pattern: {0}")]
    InvalidPattern(#[from] globset::Error),
}

impl WatchError {
    /// Paths the OS backend named in its failure, if any.
    #[must_use]
    pub fn paths(&self) -> &[PathBuf] {
        match self {
            Self::Notify(e) => &e.paths,
            Self::ChannelClosed | Self::ThreadPanicked | Self::InvalidPattern(_) => &[],
        }
    }
}
