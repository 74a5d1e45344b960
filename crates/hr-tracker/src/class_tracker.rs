//! Class-level change detection.
//!
//! [`ClassDefinitionTracker`] keeps the last observed method-signature
//! fingerprints per file. It is a best-effort secondary signal: a file that
//! cannot be read or parsed simply has no classes.

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use hr_core::FxHashMap;
use hr_py_parser::{ClassSignatures, PyParser};

/// Remembers class fingerprints per file and reports changes against them.
///
/// # Examples
///
/// ```
/// use hr_tracker::ClassDefinitionTracker;
/// # let dir = tempfile::tempdir()?;
/// # let path = camino::Utf8PathBuf::try_from(dir.path().join("cog.py"))?;
///
/// std::fs::write(&path, "class Cog:\n    def a(self):\n        pass\n")?;
/// let mut tracker = ClassDefinitionTracker::new();
///
/// // first observation is always a change
/// assert!(tracker.changed(&path, "Cog"));
/// assert!(!tracker.changed(&path, "Cog"));
///
/// std::fs::write(&path, "class Cog:\n    def a(self, x):\n        pass\n")?;
/// assert!(tracker.changed(&path, "Cog"));
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Default)]
pub struct ClassDefinitionTracker {
    signatures: FxHashMap<Utf8PathBuf, ClassSignatures>,
    parser: Option<PyParser>,
}

impl ClassDefinitionTracker {
    /// Creates an empty tracker. The parser is created on first use.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `path` and returns its class fingerprints.
    ///
    /// Read and parse failures yield an empty map. Nothing is recorded.
    pub fn signatures_for(&mut self, path: &Utf8Path) -> ClassSignatures {
        let source = match fs::read_to_string(path) {
            Ok(source) => source,
            Err(e) => {
                tracing::debug!(path = %path, error = %e, "could not read file for class tracking");
                return ClassSignatures::default();
            }
        };

        let Some(parser) = self.parser() else {
            return ClassSignatures::default();
        };
        match parser.parse(&source) {
            Ok(result) => result.classes,
            Err(e) => {
                tracing::debug!(path = %path, error = %e, "could not parse file for class tracking");
                ClassSignatures::default()
            }
        }
    }

    /// Returns `true` if the fingerprint of `class_name` in `path` differs
    /// from the last one recorded, then records the file's current set.
    ///
    /// The first observation of a file always reports a change.
    pub fn changed(&mut self, path: &Utf8Path, class_name: &str) -> bool {
        let current = self.signatures_for(path);
        let changed = match self.signatures.get(path) {
            None => true,
            Some(previous) => previous.get(class_name) != current.get(class_name),
        };
        self.signatures.insert(path.to_owned(), current);
        changed
    }

    /// Records an already computed set for `path` and returns the names of
    /// classes that were added, removed, or changed, sorted.
    ///
    /// On the first observation of a file every class is reported.
    pub fn observe(&mut self, path: &Utf8Path, current: ClassSignatures) -> Vec<String> {
        let mut changed: Vec<String> = match self.signatures.get(path) {
            None => current.keys().cloned().collect(),
            Some(previous) => {
                let mut names: Vec<String> = current
                    .iter()
                    .filter(|(name, fingerprint)| previous.get(*name) != Some(*fingerprint))
                    .map(|(name, _)| name.clone())
                    .collect();
                names.extend(
                    previous
                        .keys()
                        .filter(|name| !current.contains_key(*name))
                        .cloned(),
                );
                names
            }
        };
        changed.sort_unstable();
        self.signatures.insert(path.to_owned(), current);
        changed
    }

    /// Returns the recorded fingerprints of `path`.
    #[must_use]
    pub fn recorded(&self, path: &Utf8Path) -> Option<&ClassSignatures> {
        self.signatures.get(path)
    }

    /// Drops the record of a deleted file.
    pub fn forget(&mut self, path: &Utf8Path) {
        self.signatures.remove(path);
    }

    /// Number of files with a recorded set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    /// Returns `true` if nothing is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    /// Forgets every file.
    pub fn clear(&mut self) {
        self.signatures.clear();
    }

    fn parser(&mut self) -> Option<&mut PyParser> {
        if self.parser.is_none() {
            match PyParser::new() {
                Ok(parser) => self.parser = Some(parser),
                Err(e) => {
                    tracing::warn!(error = %e, "class tracking disabled: parser unavailable");
                    return None;
                }
            }
        }
        self.parser.as_mut()
    }
}
