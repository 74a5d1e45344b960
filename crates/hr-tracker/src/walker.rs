//! Directory traversal for Python module trees.
//!
//! This module provides [`FileWalker`], which uses the `ignore` crate to walk
//! watch directories while respecting `.gitignore` patterns.

use camino::{Utf8Path, Utf8PathBuf};
use ignore::WalkBuilder;

use crate::error::TrackerError;

/// Directories never worth descending into.
const SKIP_DIRECTORIES: &[&str] = &[
    "__pycache__",
    ".git",
    ".venv",
    "venv",
    ".mypy_cache",
    ".pytest_cache",
    ".ruff_cache",
    ".tox",
    "node_modules",
];

/// Python source extension.
const PYTHON_EXTENSION: &str = "py";

/// A file walker that discovers Python modules in a directory tree.
///
/// Paths are collected single-threaded; callers parallelize the analysis
/// afterwards (see [`ModuleAnalyzer`](crate::ModuleAnalyzer)).
///
/// # Examples
///
/// ```
/// use hr_tracker::FileWalker;
/// # let dir = tempfile::tempdir()?;
/// # let root = camino::Utf8Path::from_path(dir.path()).ok_or("utf8")?;
/// # std::fs::write(root.join("ping.py"), "")?;
///
/// let paths = FileWalker::new(root)?.collect_paths()?;
/// assert_eq!(paths.len(), 1);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct FileWalker {
    root: Utf8PathBuf,
    skip_dirs: Vec<String>,
    follow_links: bool,
}

impl FileWalker {
    /// Creates a walker rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::InvalidRoot`] if `root` is not a directory.
    pub fn new(root: &Utf8Path) -> Result<Self, TrackerError> {
        if !root.is_dir() {
            return Err(TrackerError::InvalidRoot(root.to_owned()));
        }

        Ok(Self {
            root: root.to_owned(),
            skip_dirs: Vec::new(),
            follow_links: false,
        })
    }

    /// Adds directory names to skip, on top of the built-in list.
    #[must_use]
    pub fn with_skip_dirs(mut self, dirs: &[&str]) -> Self {
        self.skip_dirs.extend(dirs.iter().map(ToString::to_string));
        self
    }

    /// Configures whether to follow symbolic links (off by default).
    #[must_use]
    pub const fn with_follow_links(mut self, follow: bool) -> Self {
        self.follow_links = follow;
        self
    }

    /// Collects every `.py` file under the root.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::Walk`] if directory traversal fails and
    /// [`TrackerError::NonUtf8Path`] for a non-UTF-8 path.
    pub fn collect_paths(&self) -> Result<Vec<Utf8PathBuf>, TrackerError> {
        let mut paths = Vec::new();

        for result in self.build_walker() {
            let entry = result?;
            if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                continue;
            }

            let path = entry.path();
            let utf8_path = Utf8Path::from_path(path)
                .ok_or_else(|| TrackerError::NonUtf8Path(path.to_owned()))?;

            if !is_python_file(utf8_path) || self.should_skip_path(utf8_path) {
                continue;
            }
            paths.push(utf8_path.to_owned());
        }

        paths.sort();
        Ok(paths)
    }

    fn build_walker(&self) -> ignore::Walk {
        WalkBuilder::new(&self.root)
            .standard_filters(true)
            .follow_links(self.follow_links)
            .require_git(false)
            .build()
    }

    fn should_skip_path(&self, path: &Utf8Path) -> bool {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        relative.components().any(|component| {
            let name = component.as_str();
            SKIP_DIRECTORIES.contains(&name) || self.skip_dirs.iter().any(|d| d == name)
        })
    }

    /// Returns the root directory being walked.
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }
}

fn is_python_file(path: &Utf8Path) -> bool {
    path.extension() == Some(PYTHON_EXTENSION)
}
