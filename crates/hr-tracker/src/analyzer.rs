//! Parallel module analysis for priming the trackers.
//!
//! When watching starts, every existing module is read, hashed, and parsed
//! so that the first change already knows its dependents. [`ModuleAnalyzer`]
//! does this with rayon, one parser per worker thread.
//!
//! # Design
//!
//! Uses the "collect-then-parallelize" pattern:
//!
//! 1. Paths are collected first by [`FileWalker`](crate::FileWalker)
//! 2. `ModuleAnalyzer` processes paths in parallel with `rayon::par_iter()`
//! 3. Per-thread parser state is initialized via `map_init()`
//! 4. The results are applied to the trackers sequentially

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use hr_core::{ExtensionId, FxHashSet};
use hr_py_parser::{ClassSignatures, ParseError, PyParser};
use rayon::prelude::*;

use crate::class_tracker::ClassDefinitionTracker;
use crate::error::TrackerError;
use crate::graph::{DependencyGraph, package_of};
use crate::hash_tracker::{FileHashTracker, digest_bytes};

/// Everything learned from one module file.
#[derive(Debug, Clone)]
pub struct ModuleAnalysis {
    /// The analyzed file.
    pub path: Utf8PathBuf,
    /// Module name, if the file lives under the base directory.
    pub module: Option<ExtensionId>,
    /// SHA-256 of the contents.
    pub digest: String,
    /// Dotted names the module imports.
    pub dependencies: FxHashSet<String>,
    /// Class fingerprints.
    pub classes: ClassSignatures,
    /// Whether the file has syntax errors.
    pub has_syntax_error: bool,
}

/// Counts from applying a batch of analyses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrimeSummary {
    /// Files analyzed successfully.
    pub files: usize,
    /// Files skipped because they could not be read or parsed.
    pub errors: usize,
    /// Files with syntax errors (still recorded).
    pub invalid: usize,
}

/// Parallel analyzer for module files under one base directory.
///
/// # Examples
///
/// ```
/// use hr_tracker::{DependencyGraph, FileHashTracker, ModuleAnalyzer};
/// # let dir = tempfile::tempdir()?;
/// # let base = camino::Utf8Path::from_path(dir.path()).ok_or("utf8")?;
///
/// std::fs::write(base.join("a.py"), "import b\n")?;
/// std::fs::write(base.join("b.py"), "")?;
///
/// let analyzer = ModuleAnalyzer::new(base);
/// let results = analyzer.analyze_files(&[base.join("a.py"), base.join("b.py")]);
///
/// let mut graph = DependencyGraph::new(base);
/// let mut hashes = FileHashTracker::new();
/// let summary = ModuleAnalyzer::apply(results, &mut graph, &mut hashes, None);
///
/// assert_eq!(summary.files, 2);
/// assert!(graph.dependents_of("b").contains("a"));
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone)]
pub struct ModuleAnalyzer {
    base_dir: Utf8PathBuf,
}

impl ModuleAnalyzer {
    /// Creates an analyzer for modules under `base_dir`.
    #[must_use]
    pub fn new(base_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Analyzes files in parallel.
    ///
    /// Results keep the order of `paths`.
    #[must_use]
    pub fn analyze_files(
        &self,
        paths: &[Utf8PathBuf],
    ) -> Vec<Result<ModuleAnalysis, TrackerError>> {
        paths
            .par_iter()
            .map_init(
                || PyParser::new().ok(),
                |parser, path| match parser {
                    Some(parser) => self.analyze_file(parser, path),
                    None => Err(TrackerError::parse(path.clone(), ParseError::LanguageInit)),
                },
            )
            .collect()
    }

    /// Analyzes a single file with the given parser.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::Read`] or [`TrackerError::Parse`].
    pub fn analyze_file(
        &self,
        parser: &mut PyParser,
        path: &Utf8Path,
    ) -> Result<ModuleAnalysis, TrackerError> {
        let bytes = fs::read(path).map_err(|e| TrackerError::read(path, e))?;
        let digest = digest_bytes(&bytes);
        let source = String::from_utf8_lossy(&bytes);
        let result = parser
            .parse(&source)
            .map_err(|e| TrackerError::parse(path, e))?;

        let package = package_of(path, &self.base_dir);
        Ok(ModuleAnalysis {
            path: path.to_owned(),
            module: ExtensionId::from_path(path, &self.base_dir),
            digest,
            dependencies: result
                .dependency_names(package.as_deref())
                .into_iter()
                .collect(),
            has_syntax_error: !result.is_valid(),
            classes: result.classes,
        })
    }

    /// Records analyses in the trackers.
    ///
    /// Hashes and class sets are seeded without counting as changes; each
    /// module's forward edges are replaced and its imports cached. Errors
    /// are logged and counted.
    pub fn apply(
        results: Vec<Result<ModuleAnalysis, TrackerError>>,
        graph: &mut DependencyGraph,
        hashes: &mut FileHashTracker,
        mut classes: Option<&mut ClassDefinitionTracker>,
    ) -> PrimeSummary {
        let mut summary = PrimeSummary::default();

        for result in results {
            let analysis = match result {
                Ok(analysis) => analysis,
                Err(e) => {
                    tracing::warn!(error = %e, "skipping module during priming");
                    summary.errors += 1;
                    continue;
                }
            };

            summary.files += 1;
            if analysis.has_syntax_error {
                summary.invalid += 1;
            }

            hashes.update(&analysis.path, analysis.digest);
            if let Some(tracker) = classes.as_deref_mut() {
                tracker.observe(&analysis.path, analysis.classes);
            }
            if let Some(module) = &analysis.module {
                graph.set_dependencies(module.as_str(), &analysis.dependencies);
            }
            graph.cache_imports(&analysis.path, analysis.dependencies);
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(base: &Utf8Path, relative: &str, contents: &str) -> Utf8PathBuf {
        let path = base.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("mkdir");
        }
        fs::write(&path, contents).expect("write");
        path
    }

    #[test]
    fn test_analyze_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let base = Utf8Path::from_path(dir.path()).expect("utf8");
        let path = write(
            base,
            "cogs/fun/roll.py",
            "from .dice import d6\n\nclass Roll:\n    def go(self):\n        pass\n",
        );

        let analyzer = ModuleAnalyzer::new(base);
        let mut parser = PyParser::new().expect("parser");
        let analysis = analyzer.analyze_file(&mut parser, &path).expect("analysis");

        assert_eq!(analysis.module, Some(ExtensionId::new("cogs.fun.roll")));
        assert!(analysis.dependencies.contains("cogs.fun.dice"));
        assert!(analysis.dependencies.contains("cogs.fun.dice.d6"));
        assert_eq!(analysis.classes["Roll"], "go(self)");
        assert!(!analysis.has_syntax_error);
        assert_eq!(analysis.digest.len(), 64);
    }

    #[test]
    fn test_analyze_files_keeps_order_and_errors() {
        let dir = tempfile::tempdir().expect("tempdir");
        let base = Utf8Path::from_path(dir.path()).expect("utf8");
        let good = write(base, "good.py", "import os\n");
        let missing = base.join("missing.py");

        let results = ModuleAnalyzer::new(base).analyze_files(&[good, missing]);
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(TrackerError::Read { .. })));
    }

    #[test]
    fn test_apply_seeds_trackers() {
        let dir = tempfile::tempdir().expect("tempdir");
        let base = Utf8Path::from_path(dir.path()).expect("utf8");
        let a = write(base, "a.py", "import b\nclass A:\n    pass\n");
        let b = write(base, "b.py", "def broken(:\n");
        let missing = base.join("gone.py");

        let results = ModuleAnalyzer::new(base).analyze_files(&[a.clone(), b, missing]);
        let mut graph = DependencyGraph::new(base);
        let mut hashes = FileHashTracker::new();
        let mut classes = ClassDefinitionTracker::new();
        let summary = ModuleAnalyzer::apply(results, &mut graph, &mut hashes, Some(&mut classes));

        assert_eq!(
            summary,
            PrimeSummary {
                files: 2,
                errors: 1,
                invalid: 1
            }
        );
        assert!(graph.dependents_of("b").contains("a"));
        assert_eq!(graph.cached_files(), 2);
        assert!(!hashes.has_changed(&a));
        assert!(classes.recorded(&a).is_some_and(|c| c.contains_key("A")));
    }
}
