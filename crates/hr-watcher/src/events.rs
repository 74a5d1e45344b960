//! Event types for file change notifications.
//!
//! # Event Flow
//!
//! ```text
//! File System Change
//!        │
//!        ▼
//! notify-debouncer-mini (short coalescing window)
//!        │
//!        ▼
//!   FileFilter (include / ignore globs)
//!        │
//!        ▼
//!   FileEvent created, kind decided by whether the path still exists
//!        │
//!        ▼
//!   Sent via channel to the ChangeHandler
//! ```

use std::time::Instant;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

/// What happened to a path.
///
/// The underlying debouncer does not report create versus modify, so both
/// are [`Changed`](Self::Changed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileEventKind {
    /// The file was created or its contents were written.
    Changed,
    /// The file no longer exists.
    Removed,
}

/// A file change event with a UTF-8 path guarantee.
///
/// # Examples
///
/// ```
/// use hr_watcher::{FileEvent, FileEventKind};
/// use camino::Utf8PathBuf;
///
/// let event = FileEvent::changed(Utf8PathBuf::from("cogs/ping.py"));
/// assert_eq!(event.kind, FileEventKind::Changed);
/// assert!(event.is_python());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    /// The path of the file that changed.
    pub path: Utf8PathBuf,

    /// Whether the file changed or went away.
    pub kind: FileEventKind,

    /// When this event was received.
    pub timestamp: Instant,
}

impl FileEvent {
    /// Creates an event for `path`, classifying it by whether the path
    /// currently exists.
    #[must_use]
    pub fn new(path: Utf8PathBuf) -> Self {
        let kind = if path.exists() {
            FileEventKind::Changed
        } else {
            FileEventKind::Removed
        };
        Self::with_kind(path, kind)
    }

    /// Creates a [`FileEventKind::Changed`] event.
    #[inline]
    #[must_use]
    pub fn changed(path: Utf8PathBuf) -> Self {
        Self::with_kind(path, FileEventKind::Changed)
    }

    /// Creates a [`FileEventKind::Removed`] event.
    #[inline]
    #[must_use]
    pub fn removed(path: Utf8PathBuf) -> Self {
        Self::with_kind(path, FileEventKind::Removed)
    }

    /// Creates an event of the given kind, stamped now.
    #[inline]
    #[must_use]
    pub fn with_kind(path: Utf8PathBuf, kind: FileEventKind) -> Self {
        Self {
            path,
            kind,
            timestamp: Instant::now(),
        }
    }

    /// Returns `true` for [`FileEventKind::Removed`].
    #[inline]
    #[must_use]
    pub fn is_removed(&self) -> bool {
        self.kind == FileEventKind::Removed
    }

    /// Returns the file extension, if any.
    #[inline]
    #[must_use]
    pub fn extension(&self) -> Option<&str> {
        self.path.extension()
    }

    /// Returns `true` if this is a Python source file.
    ///
    /// ```
    /// use hr_watcher::FileEvent;
    /// use camino::Utf8PathBuf;
    ///
    /// assert!(!FileEvent::changed(Utf8PathBuf::from("cogs/ping.pyc")).is_python());
    /// ```
    #[inline]
    #[must_use]
    pub fn is_python(&self) -> bool {
        self.extension() == Some("py")
    }

    /// Returns the file name without the directory path.
    #[inline]
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name()
    }

    /// Returns the path as a borrowed [`Utf8Path`].
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_classifies_by_existence() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = Utf8Path::from_path(dir.path()).expect("utf8");
        let present = root.join("present.py");
        std::fs::write(&present, "").expect("write");

        assert_eq!(FileEvent::new(present).kind, FileEventKind::Changed);
        assert_eq!(
            FileEvent::new(root.join("gone.py")).kind,
            FileEventKind::Removed
        );
    }

    #[test]
    fn test_accessors() {
        let event = FileEvent::removed(Utf8PathBuf::from("/bot/cogs/admin/ban.py"));
        assert!(event.is_removed());
        assert!(event.is_python());
        assert_eq!(event.extension(), Some("py"));
        assert_eq!(event.file_name(), Some("ban.py"));
        assert_eq!(event.path(), Utf8Path::new("/bot/cogs/admin/ban.py"));
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&FileEventKind::Removed).expect("serialize");
        assert_eq!(json, "\"removed\"");
    }
}
