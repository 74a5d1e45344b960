//! Content-hash change detection.
//!
//! [`FileHashTracker`] remembers the SHA-256 digest of every file it has
//! seen. It is the gate that keeps duplicate filesystem notifications for an
//! unchanged file from doing any further work.

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use hr_core::FxHashMap;
use sha2::{Digest, Sha256};

/// Returns the lowercase hex SHA-256 digest of `bytes`.
///
/// # Examples
///
/// ```
/// let digest = hr_tracker::digest_bytes(b"");
/// assert!(digest.starts_with("e3b0c442"));
/// assert_eq!(digest.len(), 64);
/// ```
#[must_use]
pub fn digest_bytes(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Per-file content digests.
///
/// Not synchronized; the owner decides how to share it.
///
/// # Examples
///
/// ```
/// use hr_tracker::FileHashTracker;
/// # let dir = tempfile::tempdir()?;
/// # let path = camino::Utf8PathBuf::try_from(dir.path().join("a.py"))?;
///
/// std::fs::write(&path, "x = 1\n")?;
/// let mut tracker = FileHashTracker::new();
///
/// assert!(tracker.has_changed(&path));
/// assert!(!tracker.has_changed(&path));
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Default)]
pub struct FileHashTracker {
    digests: FxHashMap<Utf8PathBuf, String>,
}

impl FileHashTracker {
    /// Creates an empty tracker.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Computes the digest of a file's current contents.
    ///
    /// Returns `None` (and logs) if the file cannot be read.
    #[must_use]
    pub fn hash(path: &Utf8Path) -> Option<String> {
        match fs::read(path) {
            Ok(bytes) => Some(digest_bytes(&bytes)),
            Err(e) => {
                tracing::debug!(path = %path, error = %e, "could not hash file");
                None
            }
        }
    }

    /// Returns `true` if the file is new or its contents changed since the
    /// last call, recording the new digest.
    ///
    /// An unreadable file is reported as unchanged and its stored digest is
    /// left alone.
    pub fn has_changed(&mut self, path: &Utf8Path) -> bool {
        let Some(digest) = Self::hash(path) else {
            return false;
        };
        self.update(path, digest)
    }

    /// Records `digest` for `path`, returning `true` if it differs from the
    /// stored one (or none was stored).
    pub fn update(&mut self, path: &Utf8Path, digest: String) -> bool {
        match self.digests.get_mut(path) {
            Some(stored) if *stored == digest => false,
            Some(stored) => {
                *stored = digest;
                true
            }
            None => {
                self.digests.insert(path.to_owned(), digest);
                true
            }
        }
    }

    /// Returns the stored digest for `path`.
    #[must_use]
    pub fn digest(&self, path: &Utf8Path) -> Option<&str> {
        self.digests.get(path).map(String::as_str)
    }

    /// Drops the stored digest of a deleted file.
    ///
    /// Returns `true` if one was stored.
    pub fn forget(&mut self, path: &Utf8Path) -> bool {
        self.digests.remove(path).is_some()
    }

    /// Number of tracked files.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.digests.len()
    }

    /// Returns `true` if no file is tracked.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.digests.is_empty()
    }

    /// Forgets every file.
    pub fn clear(&mut self) {
        self.digests.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_file(contents: &str) -> (tempfile::TempDir, Utf8PathBuf) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = Utf8PathBuf::try_from(dir.path().join("mod.py")).expect("utf8 path");
        fs::write(&path, contents).expect("write");
        (dir, path)
    }

    #[test]
    fn test_has_changed_is_idempotent() {
        let (_dir, path) = temp_file("import os\n");
        let mut tracker = FileHashTracker::new();

        assert!(tracker.has_changed(&path));
        assert!(!tracker.has_changed(&path));
        assert!(!tracker.has_changed(&path));
    }

    #[test]
    fn test_detects_modification() {
        let (_dir, path) = temp_file("a = 1\n");
        let mut tracker = FileHashTracker::new();
        assert!(tracker.has_changed(&path));

        fs::write(&path, "a = 2\n").expect("write");
        assert!(tracker.has_changed(&path));
        assert!(!tracker.has_changed(&path));
    }

    #[test]
    fn test_rewrite_with_same_content_is_unchanged() {
        let (_dir, path) = temp_file("same\n");
        let mut tracker = FileHashTracker::new();
        assert!(tracker.has_changed(&path));

        fs::write(&path, "same\n").expect("write");
        assert!(!tracker.has_changed(&path));
    }

    #[test]
    fn test_unreadable_file_is_unchanged() {
        let mut tracker = FileHashTracker::new();
        let missing = Utf8Path::new("/definitely/not/here.py");
        assert!(FileHashTracker::hash(missing).is_none());
        assert!(!tracker.has_changed(missing));
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_forget() {
        let (_dir, path) = temp_file("x\n");
        let mut tracker = FileHashTracker::new();
        assert!(tracker.has_changed(&path));
        assert!(tracker.forget(&path));
        assert!(!tracker.forget(&path));

        // a forgotten file counts as new again
        assert!(tracker.has_changed(&path));
    }

    #[test]
    fn test_update_seeds_without_reporting_twice() {
        let (_dir, path) = temp_file("seed\n");
        let mut tracker = FileHashTracker::new();
        let digest = digest_bytes(b"seed\n");

        assert!(tracker.update(&path, digest.clone()));
        assert_eq!(tracker.digest(&path), Some(digest.as_str()));
        assert!(!tracker.has_changed(&path));
    }

    #[test]
    fn test_digest_is_hex_sha256() {
        assert_eq!(
            digest_bytes(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
