//! File to extension resolution.
//!
//! Not every changed file is a loadable extension. A helper module inside a
//! cog package is reloaded through the package's `__init__.py`. The
//! [`ExtensionResolver`] checks the file itself first, then the aggregator of
//! the directory it lives in, asking a [`LoadableUnitProbe`] each time.

use std::fmt;
use std::fs;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use hr_core::ExtensionId;
use hr_py_parser::PyParser;

/// Aggregator file of a package directory.
const PACKAGE_INIT_FILE: &str = "__init__.py";

/// Decides whether a source file is an independently loadable extension.
///
/// Any `Fn(&Utf8Path) -> bool` closure is a probe, which lets the host
/// runtime supply its own rule.
pub trait LoadableUnitProbe: Send + Sync {
    /// Returns `true` if the file at `path` can be loaded on its own.
    fn is_loadable(&self, path: &Utf8Path) -> bool;
}

impl<F> LoadableUnitProbe for F
where
    F: Fn(&Utf8Path) -> bool + Send + Sync,
{
    fn is_loadable(&self, path: &Utf8Path) -> bool {
        self(path)
    }
}

/// Treats a module as loadable when it defines a top-level `setup` function.
///
/// Unreadable or unparseable files are not loadable.
#[derive(Debug, Clone, Copy, Default)]
pub struct SetupFunctionProbe;

impl LoadableUnitProbe for SetupFunctionProbe {
    fn is_loadable(&self, path: &Utf8Path) -> bool {
        let Ok(source) = fs::read_to_string(path) else {
            return false;
        };
        match PyParser::new().and_then(|mut parser| parser.defines_setup(&source)) {
            Ok(found) => found,
            Err(e) => {
                tracing::debug!(path = %path, error = %e, "setup probe failed");
                false
            }
        }
    }
}

/// Maps between source paths and extension identifiers under a base
/// directory.
///
/// # Examples
///
/// ```
/// use hr_core::ExtensionId;
/// use hr_tracker::ExtensionResolver;
/// # let dir = tempfile::tempdir()?;
/// # let base = camino::Utf8Path::from_path(dir.path()).ok_or("utf8")?;
/// # std::fs::create_dir_all(base.join("cogs/fun"))?;
///
/// std::fs::write(base.join("cogs/fun/__init__.py"), "async def setup(bot):\n    pass\n")?;
/// std::fs::write(base.join("cogs/fun/dice.py"), "def roll():\n    return 4\n")?;
///
/// let resolver = ExtensionResolver::new(base);
/// assert_eq!(
///     resolver.to_extension(&base.join("cogs/fun/dice.py")),
///     Some(ExtensionId::new("cogs.fun")),
/// );
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Clone)]
pub struct ExtensionResolver {
    base_dir: Utf8PathBuf,
    probe: Arc<dyn LoadableUnitProbe>,
}

impl ExtensionResolver {
    /// Creates a resolver that looks for a `setup` function.
    #[must_use]
    pub fn new(base_dir: impl Into<Utf8PathBuf>) -> Self {
        Self::with_probe(base_dir, SetupFunctionProbe)
    }

    /// Creates a resolver with a custom loadability rule.
    #[must_use]
    pub fn with_probe(
        base_dir: impl Into<Utf8PathBuf>,
        probe: impl LoadableUnitProbe + 'static,
    ) -> Self {
        Self::with_shared_probe(base_dir, Arc::new(probe))
    }

    /// Creates a resolver around a probe shared with other components.
    #[must_use]
    pub fn with_shared_probe(
        base_dir: impl Into<Utf8PathBuf>,
        probe: Arc<dyn LoadableUnitProbe>,
    ) -> Self {
        Self {
            base_dir: base_dir.into(),
            probe,
        }
    }

    /// Returns the base directory.
    #[inline]
    #[must_use]
    pub fn base_dir(&self) -> &Utf8Path {
        &self.base_dir
    }

    /// Returns the expected module file of `extension`.
    #[must_use]
    pub fn to_path(&self, extension: &ExtensionId) -> Utf8PathBuf {
        extension.to_path(&self.base_dir)
    }

    /// Returns the source file of `extension`, preferring `a/b.py` and
    /// falling back to the package file `a/b/__init__.py` if only that exists.
    #[must_use]
    pub fn source_path(&self, extension: &ExtensionId) -> Utf8PathBuf {
        let module = extension.to_path(&self.base_dir);
        if module.is_file() {
            return module;
        }
        let package = extension.to_package_path(&self.base_dir);
        if package.is_file() { package } else { module }
    }

    /// Returns the module name of `path`, whether or not it is loadable.
    #[must_use]
    pub fn module_of(&self, path: &Utf8Path) -> Option<ExtensionId> {
        ExtensionId::from_path(path, &self.base_dir)
    }

    /// Returns the extension a change to `path` should reload.
    ///
    /// That is the file's own module if it is loadable, otherwise the
    /// package of its directory if that package's `__init__.py` is loadable,
    /// otherwise `None`.
    #[must_use]
    pub fn to_extension(&self, path: &Utf8Path) -> Option<ExtensionId> {
        let module = self.module_of(path)?;
        if self.probe.is_loadable(path) {
            return Some(module);
        }

        if path.file_name() == Some(PACKAGE_INIT_FILE) {
            return None;
        }
        let aggregator = path.parent()?.join(PACKAGE_INIT_FILE);
        if aggregator.is_file() && self.probe.is_loadable(&aggregator) {
            let package = self.module_of(&aggregator)?;
            tracing::trace!(path = %path, extension = %package, "resolved through package aggregator");
            return Some(package);
        }

        None
    }

    /// Every extension whose reload would pick up `path`, without reading it.
    ///
    /// The file's own module first, then the package of its directory unless
    /// `path` is that package's `__init__.py`.
    #[must_use]
    pub fn candidates_for(&self, path: &Utf8Path) -> Vec<ExtensionId> {
        let mut candidates: Vec<ExtensionId> = self.module_of(path).into_iter().collect();
        if path.file_name() != Some(PACKAGE_INIT_FILE) {
            let package = path
                .parent()
                .and_then(|dir| self.module_of(&dir.join(PACKAGE_INIT_FILE)));
            candidates.extend(package);
        }
        candidates
    }
}

impl fmt::Debug for ExtensionResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionResolver")
            .field("base_dir", &self.base_dir)
            .finish_non_exhaustive()
    }
}
