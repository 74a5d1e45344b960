//! File filtering for watch events.
//!
//! Filtering happens first, before any file is read, because it is the
//! cheapest check in the pipeline.
//!
//! # Pattern semantics
//!
//! [`GlobFilter`] matches each glob against every trailing part of the
//! path that starts at a directory boundary, relative to the watch root.
//! For `cogs/__pycache__/ping.pyc` the candidates are the whole relative
//! path, `__pycache__/ping.pyc`, and `ping.pyc`, so `*.pyc` and
//! `__pycache__/*` both match it.
//!
//! # Examples
//!
//! ```
//! use hr_watcher::{FileFilter, GlobFilter};
//! use camino::Utf8Path;
//!
//! let filter = GlobFilter::new(&["*.py"], &["__pycache__/*", "*.swp"])?;
//!
//! assert!(filter.should_process(Utf8Path::new("cogs/ping.py")));
//! assert!(!filter.should_process(Utf8Path::new("cogs/__pycache__/ping.py")));
//! assert!(!filter.should_process(Utf8Path::new("cogs/.ping.py.swp")));
//! # Ok::<(), hr_watcher::WatchError>(())
//! ```

use camino::{Utf8Path, Utf8PathBuf};
use globset::{Glob, GlobSet, GlobSetBuilder};
use hr_core::HotReloadConfig;
use smallvec::SmallVec;

use crate::error::WatchError;

/// A filter for determining which file events to process.
///
/// Filters must be [`Send`] and [`Sync`] because they are called from the
/// blocking watcher thread as well as from async tasks.
///
/// ```
/// use hr_watcher::FileFilter;
/// use camino::Utf8Path;
///
/// struct OnlyCogs;
///
/// impl FileFilter for OnlyCogs {
///     fn should_process(&self, path: &Utf8Path) -> bool {
///         path.starts_with("cogs")
///     }
/// }
///
/// assert!(OnlyCogs.should_process(Utf8Path::new("cogs/ping.py")));
/// ```
pub trait FileFilter: Send + Sync + 'static {
    /// Returns `true` if the file at the given path should be processed.
    fn should_process(&self, path: &Utf8Path) -> bool;
}

/// A filter that accepts all files.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAllFilter;

impl FileFilter for AcceptAllFilter {
    #[inline]
    fn should_process(&self, _path: &Utf8Path) -> bool {
        true
    }
}

/// Include/ignore glob filter built from the configured patterns.
///
/// A path passes when some include pattern matches and no ignore pattern
/// does.
#[derive(Debug, Clone)]
pub struct GlobFilter {
    include: GlobSet,
    ignore: GlobSet,
    roots: SmallVec<[Utf8PathBuf; 4]>,
}

impl GlobFilter {
    /// Builds a filter from include and ignore patterns.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::InvalidPattern`] if a pattern does not compile.
    pub fn new<S: AsRef<str>>(include: &[S], ignore: &[S]) -> Result<Self, WatchError> {
        Ok(Self {
            include: build_set(include)?,
            ignore: build_set(ignore)?,
            roots: SmallVec::new(),
        })
    }

    /// Builds a filter from the configuration's patterns, rooted at its
    /// watch directories.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::InvalidPattern`] if a pattern does not compile.
    pub fn from_config(config: &HotReloadConfig) -> Result<Self, WatchError> {
        Ok(Self::new(config.file_patterns(), config.ignore_patterns())?
            .with_roots(config.watch_directories().iter().cloned()))
    }

    /// Sets the directories paths are made relative to before matching.
    ///
    /// Without roots, or for a path under none of them, the whole path is
    /// used.
    #[must_use]
    pub fn with_roots(mut self, roots: impl IntoIterator<Item = Utf8PathBuf>) -> Self {
        self.roots = roots.into_iter().collect();
        self
    }

    fn relative<'a>(&self, path: &'a Utf8Path) -> &'a Utf8Path {
        self.roots
            .iter()
            .find_map(|root| path.strip_prefix(root).ok())
            .unwrap_or(path)
    }

    fn matches_any(set: &GlobSet, relative: &Utf8Path) -> bool {
        candidates(relative.as_str()).any(|candidate| set.is_match(candidate))
    }

    /// Returns `true` if an ignore pattern matches `path`.
    #[must_use]
    pub fn is_ignored(&self, path: &Utf8Path) -> bool {
        Self::matches_any(&self.ignore, self.relative(path))
    }

    /// Returns `true` if an include pattern matches `path`.
    #[must_use]
    pub fn is_included(&self, path: &Utf8Path) -> bool {
        Self::matches_any(&self.include, self.relative(path))
    }
}

impl FileFilter for GlobFilter {
    fn should_process(&self, path: &Utf8Path) -> bool {
        let relative = self.relative(path);
        Self::matches_any(&self.include, relative) && !Self::matches_any(&self.ignore, relative)
    }
}

impl<F: FileFilter + ?Sized> FileFilter for Box<F> {
    fn should_process(&self, path: &Utf8Path) -> bool {
        (**self).should_process(path)
    }
}

impl<F: FileFilter + ?Sized> FileFilter for std::sync::Arc<F> {
    fn should_process(&self, path: &Utf8Path) -> bool {
        (**self).should_process(path)
    }
}

fn build_set<S: AsRef<str>>(patterns: &[S]) -> Result<GlobSet, WatchError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern.as_ref())?);
    }
    Ok(builder.build()?)
}

/// The path itself, then each suffix following a `/`.
fn candidates(path: &str) -> impl Iterator<Item = &str> {
    std::iter::once(path).chain(path.match_indices('/').map(move |(i, _)| &path[i + 1..]))
}

#[cfg(test)]
mod tests {
    use hr_core::HotReloadSettings;

    use super::*;

    const IGNORE: &[&str] = &["*.pyc", "__pycache__/*", ".git/*", "*.tmp", "*.swp", "*~", ".#*"];

    fn default_filter() -> GlobFilter {
        GlobFilter::new(&["*.py"], IGNORE).expect("patterns")
    }

    #[test]
    fn test_accept_all_filter() {
        assert!(AcceptAllFilter.should_process(Utf8Path::new("anything.txt")));
        assert!(AcceptAllFilter.should_process(Utf8Path::new("")));
    }

    #[test]
    fn test_candidates() {
        let all: Vec<_> = candidates("a/b/c.py").collect();
        assert_eq!(all, ["a/b/c.py", "b/c.py", "c.py"]);
    }

    #[test]
    fn test_includes_python_sources() {
        let filter = default_filter();
        assert!(filter.should_process(Utf8Path::new("cogs/ping.py")));
        assert!(filter.should_process(Utf8Path::new("ping.py")));
        assert!(!filter.should_process(Utf8Path::new("cogs/README.md")));
        assert!(!filter.should_process(Utf8Path::new("cogs/ping.pyc")));
    }

    #[test]
    fn test_ignores_editor_and_cache_artifacts() {
        let filter = default_filter();
        assert!(!filter.should_process(Utf8Path::new("cogs/__pycache__/ping.py")));
        assert!(!filter.should_process(Utf8Path::new(".git/hooks/pre-commit.py")));
        assert!(!filter.should_process(Utf8Path::new("cogs/ping.py~")));
        assert!(!filter.should_process(Utf8Path::new("cogs/.#ping.py")));
        assert!(filter.is_ignored(Utf8Path::new("cogs/x.tmp")));
    }

    #[test]
    fn test_roots_hide_ancestor_directories() {
        let filter = GlobFilter::new(&["*.py"], &[".git/*"])
            .expect("patterns")
            .with_roots([Utf8PathBuf::from("/srv/.git/bot")]);

        assert!(filter.should_process(Utf8Path::new("/srv/.git/bot/cogs/ping.py")));
        assert!(!filter.should_process(Utf8Path::new("/srv/.git/bot/.git/x.py")));
    }

    #[test]
    fn test_invalid_pattern() {
        let err = GlobFilter::new(&["[oops"], &[]).expect_err("bad glob");
        assert!(matches!(err, WatchError::InvalidPattern(_)));
    }

    #[test]
    fn test_from_config() {
        let config = HotReloadSettings::default().validate().expect("valid");
        let filter = GlobFilter::from_config(&config).expect("patterns");
        assert!(filter.is_included(Utf8Path::new("cogs/ping.py")));
        assert!(!filter.should_process(Utf8Path::new("cogs/ping.swp")));
    }

    #[test]
    fn test_shared_filters() {
        let boxed: Box<dyn FileFilter> = Box::new(default_filter());
        assert!(boxed.should_process(Utf8Path::new("a.py")));
        let shared = std::sync::Arc::new(default_filter());
        assert!(!shared.should_process(Utf8Path::new("a.pyc")));
    }
}
