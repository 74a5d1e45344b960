//! Extension identifiers.
//!
//! An extension is an independently loadable unit of bot functionality,
//! named by a dotted module path such as `tux.cogs.moderation.ban`. This
//! module provides [`ExtensionId`] and the pure mapping between identifiers
//! and source file paths.

use std::borrow::Borrow;
use std::fmt;

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

/// Source file suffix of a module.
const SOURCE_SUFFIX: &str = ".py";

/// File stem of a package aggregator module.
const PACKAGE_INIT: &str = "__init__";

/// Dotted identifier of a loadable extension (or of any module).
///
/// The identifier is not validated against the filesystem; use
/// [`to_path`](Self::to_path) to find where its source is expected to live.
///
/// # Examples
///
/// ```
/// use hr_core::ExtensionId;
/// use camino::Utf8Path;
///
/// let id = ExtensionId::new("cogs.admin.ban");
/// assert_eq!(id.to_path(Utf8Path::new("/bot")), Utf8Path::new("/bot/cogs/admin/ban.py"));
/// assert_eq!(id.parent(), Some(ExtensionId::new("cogs.admin")));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtensionId(String);

impl ExtensionId {
    /// Creates an identifier from a dotted name.
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the dotted name.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Iterates over the dot-separated segments.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }

    /// Returns the last segment (the module's own name).
    #[must_use]
    pub fn name(&self) -> &str {
        self.0.rsplit_once('.').map_or(self.0.as_str(), |(_, name)| name)
    }

    /// Returns the enclosing package, or `None` for a top-level module.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        self.0
            .rsplit_once('.')
            .map(|(parent, _)| Self(parent.to_owned()))
    }

    /// Maps the identifier to its expected module file under `base_dir`.
    ///
    /// This is a pure function: `a.b.c` always becomes `base_dir/a/b/c.py`.
    #[must_use]
    pub fn to_path(&self, base_dir: &Utf8Path) -> Utf8PathBuf {
        let mut path = base_dir.to_path_buf();
        path.extend(self.segments());
        path.set_extension("py");
        path
    }

    /// Maps the identifier to its package aggregator file under `base_dir`.
    ///
    /// `a.b` becomes `base_dir/a/b/__init__.py`.
    #[must_use]
    pub fn to_package_path(&self, base_dir: &Utf8Path) -> Utf8PathBuf {
        let mut path = base_dir.to_path_buf();
        path.extend(self.segments());
        path.push("__init__.py");
        path
    }

    /// Builds the identifier for a module file given relative to the base.
    ///
    /// `__init__.py` maps to its package. Returns `None` for paths that
    /// cannot name an importable module (absolute paths, `..` components,
    /// non-source files, or segments containing dots).
    ///
    /// # Examples
    ///
    /// ```
    /// use hr_core::ExtensionId;
    /// use camino::Utf8Path;
    ///
    /// assert_eq!(
    ///     ExtensionId::from_relative_path(Utf8Path::new("cogs/fun/__init__.py")),
    ///     Some(ExtensionId::new("cogs.fun")),
    /// );
    /// assert_eq!(ExtensionId::from_relative_path(Utf8Path::new("README.md")), None);
    /// ```
    #[must_use]
    pub fn from_relative_path(relative: &Utf8Path) -> Option<Self> {
        let mut segments: Vec<&str> = Vec::new();
        for component in relative.components() {
            match component {
                Utf8Component::Normal(part) => segments.push(part),
                Utf8Component::CurDir => {}
                Utf8Component::Prefix(_) | Utf8Component::RootDir | Utf8Component::ParentDir => {
                    return None;
                }
            }
        }

        let file = segments.pop()?;
        let stem = file.strip_suffix(SOURCE_SUFFIX)?;
        if stem != PACKAGE_INIT {
            segments.push(stem);
        }

        if segments.is_empty() || segments.iter().any(|s| s.is_empty() || s.contains('.')) {
            return None;
        }

        Some(Self(segments.join(".")))
    }

    /// Builds the identifier for `path`, which must live under `base_dir`.
    ///
    /// Both paths are compared as given; callers working with absolute event
    /// paths should pass a canonicalized base directory.
    #[must_use]
    pub fn from_path(path: &Utf8Path, base_dir: &Utf8Path) -> Option<Self> {
        let relative = path.strip_prefix(base_dir).ok()?;
        Self::from_relative_path(relative)
    }
}

impl fmt::Display for ExtensionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ExtensionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ExtensionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for ExtensionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ExtensionId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_path() {
        let id = ExtensionId::new("tux.cogs.moderation.ban");
        assert_eq!(
            id.to_path(Utf8Path::new("/srv/bot")),
            Utf8PathBuf::from("/srv/bot/tux/cogs/moderation/ban.py")
        );
    }

    #[test]
    fn test_to_package_path() {
        let id = ExtensionId::new("cogs.levels");
        assert_eq!(
            id.to_package_path(Utf8Path::new("base")),
            Utf8PathBuf::from("base/cogs/levels/__init__.py")
        );
    }

    #[test]
    fn test_from_relative_path_module() {
        assert_eq!(
            ExtensionId::from_relative_path(Utf8Path::new("cogs/admin/ban.py")),
            Some(ExtensionId::new("cogs.admin.ban"))
        );
    }

    #[test]
    fn test_from_relative_path_curdir() {
        assert_eq!(
            ExtensionId::from_relative_path(Utf8Path::new("./a.py")),
            Some(ExtensionId::new("a"))
        );
    }

    #[test]
    fn test_from_relative_path_rejects() {
        assert_eq!(ExtensionId::from_relative_path(Utf8Path::new("../a.py")), None);
        assert_eq!(ExtensionId::from_relative_path(Utf8Path::new("/abs/a.py")), None);
        assert_eq!(ExtensionId::from_relative_path(Utf8Path::new("a/b.txt")), None);
        assert_eq!(ExtensionId::from_relative_path(Utf8Path::new("a/b.c.py")), None);
        assert_eq!(ExtensionId::from_relative_path(Utf8Path::new("__init__.py")), None);
    }

    #[test]
    fn test_path_roundtrip() {
        let base = Utf8Path::new("/bot");
        let id = ExtensionId::new("cogs.utility.ping");
        assert_eq!(ExtensionId::from_path(&id.to_path(base), base), Some(id));
    }

    #[test]
    fn test_from_path_outside_base() {
        assert_eq!(
            ExtensionId::from_path(Utf8Path::new("/elsewhere/a.py"), Utf8Path::new("/bot")),
            None
        );
    }

    #[test]
    fn test_parent_and_name() {
        let id = ExtensionId::new("a.b.c");
        assert_eq!(id.name(), "c");
        assert_eq!(id.parent(), Some(ExtensionId::new("a.b")));
        assert_eq!(ExtensionId::new("top").parent(), None);
        assert_eq!(ExtensionId::new("top").name(), "top");
    }

    #[test]
    fn test_serializes_as_string() {
        let id = ExtensionId::new("cogs.fun");
        assert_eq!(serde_json::to_string(&id).expect("serialize"), r#""cogs.fun""#);
    }
}
