//! Module dependency graph.
//!
//! [`DependencyGraph`] records `dependent -> dependency` edges between dotted
//! module names and answers both directions in constant time. It also owns
//! the bounded cache of parsed imports per file and computes reload orders
//! that put dependencies before their dependents.
//!
//! # Graceful Degradation
//!
//! The graph is never required to be complete. Unknown modules have no
//! dependencies and no dependents; unreadable or unparseable files have no
//! imports. Cycles are tolerated everywhere.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fs;
use std::num::NonZeroUsize;

use camino::{Utf8Path, Utf8PathBuf};
use hr_core::{ExtensionId, FxHashMap, FxHashSet};
use hr_py_parser::PyParser;
use lru::LruCache;
use serde::Serialize;

/// Default import cache capacity.
const DEFAULT_CACHE_SIZE: NonZeroUsize = match NonZeroUsize::new(1000) {
    Some(n) => n,
    None => NonZeroUsize::MIN,
};

/// Stem of a package aggregator file.
const PACKAGE_INIT_FILE: &str = "__init__.py";

/// Directed graph of module imports.
///
/// # Examples
///
/// ```
/// use hr_tracker::DependencyGraph;
///
/// let mut graph = DependencyGraph::new(".");
/// graph.add_dependency("cogs.a", "cogs.b");
///
/// assert!(graph.dependents_of("cogs.b").contains("cogs.a"));
/// assert_eq!(graph.reload_order(["cogs.a", "cogs.b"]), ["cogs.b", "cogs.a"]);
/// ```
#[derive(Debug)]
pub struct DependencyGraph {
    /// Directory that module names are relative to.
    base_dir: Utf8PathBuf,
    /// Forward edges: module -> modules it imports.
    dependencies: FxHashMap<String, FxHashSet<String>>,
    /// Reverse edges: module -> modules that import it.
    dependents: FxHashMap<String, FxHashSet<String>>,
    /// Parsed imports per file, least recently used evicted first.
    import_cache: LruCache<Utf8PathBuf, FxHashSet<String>>,
    /// Recursion bound for ordering and transitive lookups.
    max_depth: usize,
    parser: Option<PyParser>,
}

impl DependencyGraph {
    /// Creates an empty graph for modules under `base_dir` with default
    /// cache size and a depth bound of 5.
    #[must_use]
    pub fn new(base_dir: impl Into<Utf8PathBuf>) -> Self {
        Self::with_limits(base_dir, DEFAULT_CACHE_SIZE, 5)
    }

    /// Creates an empty graph with explicit cache capacity and depth bound.
    #[must_use]
    pub fn with_limits(
        base_dir: impl Into<Utf8PathBuf>,
        cache_size: NonZeroUsize,
        max_depth: usize,
    ) -> Self {
        Self {
            base_dir: base_dir.into(),
            dependencies: FxHashMap::default(),
            dependents: FxHashMap::default(),
            import_cache: LruCache::new(cache_size),
            max_depth,
            parser: None,
        }
    }

    /// Returns the directory module names are relative to.
    #[inline]
    #[must_use]
    pub fn base_dir(&self) -> &Utf8Path {
        &self.base_dir
    }

    /// Returns the traversal depth bound.
    #[inline]
    #[must_use]
    pub const fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Returns the dotted names imported by the file at `path`.
    ///
    /// `from X import Y` contributes both `X` and `X.Y`; relative imports are
    /// resolved against the file's package under the base directory. The
    /// result is cached by path until [`clear_cache`](Self::clear_cache) or
    /// [`invalidate`](Self::invalidate). Unreadable or unparseable files yield
    /// an empty set, which is not cached.
    pub fn dependencies_of(&mut self, path: &Utf8Path) -> FxHashSet<String> {
        if let Some(cached) = self.import_cache.get(path) {
            return cached.clone();
        }

        let source = match fs::read_to_string(path) {
            Ok(source) => source,
            Err(e) => {
                tracing::debug!(path = %path, error = %e, "could not read file for import analysis");
                return FxHashSet::default();
            }
        };

        let package = package_of(path, &self.base_dir);
        let Some(parser) = self.parser() else {
            return FxHashSet::default();
        };
        let result = match parser.parse(&source) {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "could not parse imports");
                return FxHashSet::default();
            }
        };

        let names: FxHashSet<String> = result
            .dependency_names(package.as_deref())
            .into_iter()
            .collect();
        self.import_cache.put(path.to_owned(), names.clone());
        names
    }

    /// Seeds the import cache with already parsed names for `path`.
    pub fn cache_imports(&mut self, path: &Utf8Path, names: FxHashSet<String>) {
        self.import_cache.put(path.to_owned(), names);
    }

    /// Drops the cached imports of one file.
    pub fn invalidate(&mut self, path: &Utf8Path) {
        self.import_cache.pop(path);
    }

    /// Drops every cached import set. Edges are kept.
    pub fn clear_cache(&mut self) {
        self.import_cache.clear();
    }

    /// Number of files with cached imports.
    #[must_use]
    pub fn cached_files(&self) -> usize {
        self.import_cache.len()
    }

    /// Records that `dependent` imports `dependency`, in both directions.
    ///
    /// Self-edges are ignored.
    pub fn add_dependency(&mut self, dependent: &str, dependency: &str) {
        if dependent == dependency {
            tracing::trace!(module = dependent, "ignoring self-import");
            return;
        }
        self.dependencies
            .entry(dependent.to_owned())
            .or_default()
            .insert(dependency.to_owned());
        self.dependents
            .entry(dependency.to_owned())
            .or_default()
            .insert(dependent.to_owned());
    }

    /// Replaces the forward edges of `module` with `dependencies`.
    ///
    /// Modules that import `module` keep their edges.
    pub fn set_dependencies<I, S>(&mut self, module: &str, dependencies: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.drop_forward_edges(module);
        for dependency in dependencies {
            self.add_dependency(module, dependency.as_ref());
        }
    }

    /// Re-reads the imports of `path` and replaces the forward edges of the
    /// module it defines.
    ///
    /// Returns the module name, or `None` if the path does not name a module
    /// under the base directory.
    pub fn refresh_module(&mut self, path: &Utf8Path) -> Option<ExtensionId> {
        let module = ExtensionId::from_path(path, &self.base_dir)?;
        self.invalidate(path);
        let names = self.dependencies_of(path);
        tracing::debug!(module = %module, imports = names.len(), "refreshed module edges");
        self.set_dependencies(module.as_str(), names);
        Some(module)
    }

    /// Removes a module from the graph entirely, including every edge that
    /// mentions it.
    pub fn remove_module(&mut self, module: &str) {
        self.drop_forward_edges(module);

        if let Some(importers) = self.dependents.remove(module) {
            for importer in importers {
                if let Some(deps) = self.dependencies.get_mut(&importer) {
                    deps.remove(module);
                    if deps.is_empty() {
                        self.dependencies.remove(&importer);
                    }
                }
            }
        }
    }

    /// Returns the modules that import `module` directly.
    #[must_use]
    pub fn dependents_of(&self, module: &str) -> FxHashSet<String> {
        self.dependents.get(module).cloned().unwrap_or_default()
    }

    /// Returns the modules `module` imports directly.
    #[must_use]
    pub fn dependencies(&self, module: &str) -> FxHashSet<String> {
        self.dependencies.get(module).cloned().unwrap_or_default()
    }

    /// Returns every module that depends on `module` through at most
    /// `max_depth` import hops, nearest first, excluding `module` itself.
    #[must_use]
    pub fn transitive_dependents(&self, module: &str, max_depth: usize) -> Vec<String> {
        let mut seen: FxHashSet<&str> = FxHashSet::default();
        seen.insert(module);
        let mut queue: VecDeque<(&str, usize)> = VecDeque::from([(module, 0)]);
        let mut out = Vec::new();

        while let Some((current, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            let Some(importers) = self.dependents.get(current) else {
                continue;
            };
            let mut next: Vec<&str> = importers.iter().map(String::as_str).collect();
            next.sort_unstable();
            for importer in next {
                if seen.insert(importer) {
                    out.push(importer.to_owned());
                    queue.push_back((importer, depth + 1));
                }
            }
        }
        out
    }

    /// Orders a batch of changed modules so that every module comes after
    /// the modules it imports that are also in the batch.
    ///
    /// Modules unknown to the graph are treated as having no dependencies.
    /// Each input module appears exactly once, even on cycles. A branch
    /// deeper than the graph's depth bound stops descending; the skipped
    /// modules are still placed when the outer loop reaches them.
    ///
    /// Input order does not matter: modules are visited in sorted order.
    pub fn reload_order<I, S>(&self, changed: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let changed: BTreeSet<String> = changed
            .into_iter()
            .map(|s| s.as_ref().to_owned())
            .collect();
        let mut visited: FxHashSet<&str> = FxHashSet::default();
        let mut order: Vec<String> = Vec::with_capacity(changed.len());

        for module in &changed {
            self.visit(module, &changed, 0, &mut visited, &mut order);
        }
        order
    }

    fn visit<'a>(
        &'a self,
        module: &'a str,
        changed: &'a BTreeSet<String>,
        depth: usize,
        visited: &mut FxHashSet<&'a str>,
        order: &mut Vec<String>,
    ) {
        if visited.contains(module) {
            return;
        }
        if depth > self.max_depth {
            tracing::warn!(
                module,
                max_depth = self.max_depth,
                "dependency depth exceeded, stopping descent"
            );
            return;
        }
        visited.insert(module);

        if let Some(deps) = self.dependencies.get(module) {
            let mut in_batch: Vec<&str> = deps
                .iter()
                .filter(|dep| changed.contains(dep.as_str()))
                .map(String::as_str)
                .collect();
            in_batch.sort_unstable();
            for dep in in_batch {
                self.visit(dep, changed, depth + 1, visited, order);
            }
        }

        order.push(module.to_owned());
    }

    /// Returns `true` if the module has any edge.
    #[must_use]
    pub fn contains(&self, module: &str) -> bool {
        self.dependencies.contains_key(module) || self.dependents.contains_key(module)
    }

    /// Number of modules with at least one edge.
    #[must_use]
    pub fn module_count(&self) -> usize {
        let mut modules: FxHashSet<&str> = self.dependencies.keys().map(String::as_str).collect();
        modules.extend(self.dependents.keys().map(String::as_str));
        modules.len()
    }

    /// Number of `dependent -> dependency` edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.dependencies.values().map(FxHashSet::len).sum()
    }

    /// Removes every edge and cached import set.
    pub fn clear(&mut self) {
        self.dependencies.clear();
        self.dependents.clear();
        self.import_cache.clear();
    }

    /// Returns a sorted, serializable copy of the forward edges.
    #[must_use]
    pub fn snapshot(&self) -> GraphSnapshot {
        let dependencies = self
            .dependencies
            .iter()
            .map(|(module, deps)| (module.clone(), deps.iter().cloned().collect()))
            .collect();
        GraphSnapshot { dependencies }
    }

    fn drop_forward_edges(&mut self, module: &str) {
        let Some(deps) = self.dependencies.remove(module) else {
            return;
        };
        for dep in deps {
            if let Some(importers) = self.dependents.get_mut(&dep) {
                importers.remove(module);
                if importers.is_empty() {
                    self.dependents.remove(&dep);
                }
            }
        }
    }

    fn parser(&mut self) -> Option<&mut PyParser> {
        if self.parser.is_none() {
            match PyParser::new() {
                Ok(parser) => self.parser = Some(parser),
                Err(e) => {
                    tracing::warn!(error = %e, "import analysis disabled: parser unavailable");
                    return None;
                }
            }
        }
        self.parser.as_mut()
    }
}

/// Forward edges of a [`DependencyGraph`], sorted for display.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GraphSnapshot {
    /// Module to the modules it imports.
    pub dependencies: BTreeMap<String, BTreeSet<String>>,
}

/// Returns the package a module file belongs to, for relative imports.
///
/// `a/b/c.py` belongs to `a.b`; `a/b/__init__.py` is the package `a.b`.
#[must_use]
pub fn package_of(path: &Utf8Path, base_dir: &Utf8Path) -> Option<String> {
    let module = ExtensionId::from_path(path, base_dir)?;
    if path.file_name() == Some(PACKAGE_INIT_FILE) {
        return Some(module.as_str().to_owned());
    }
    module.parent().map(|parent| parent.as_str().to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph_with(edges: &[(&str, &str)], max_depth: usize) -> DependencyGraph {
        let mut graph = DependencyGraph::with_limits(".", DEFAULT_CACHE_SIZE, max_depth);
        for (from, to) in edges {
            graph.add_dependency(from, to);
        }
        graph
    }

    fn write(root: &Utf8Path, relative: &str, contents: &str) -> Utf8PathBuf {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("mkdir");
        }
        fs::write(&path, contents).expect("write");
        path
    }

    #[test]
    fn test_add_dependency_indexes_both_directions() {
        let graph = graph_with(&[("a", "b")], 5);
        assert!(graph.dependencies("a").contains("b"));
        assert!(graph.dependents_of("b").contains("a"));
        assert!(graph.dependents_of("a").is_empty());
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.module_count(), 2);
    }

    #[test]
    fn test_self_loop_ignored() {
        let graph = graph_with(&[("a", "a")], 5);
        assert_eq!(graph.edge_count(), 0);
        assert!(!graph.contains("a"));
    }

    #[test]
    fn test_remove_module_prunes_everything() {
        let mut graph = graph_with(&[("a", "b"), ("b", "c"), ("d", "b")], 5);
        graph.remove_module("b");

        assert!(!graph.contains("b"));
        assert!(graph.dependencies("a").is_empty());
        assert!(graph.dependencies("d").is_empty());
        assert!(graph.dependents_of("c").is_empty());
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn test_dependencies_before_dependents() {
        let graph = graph_with(&[("a", "b")], 5);
        assert_eq!(graph.reload_order(["a", "b"]), ["b", "a"]);
        assert_eq!(graph.reload_order(["b", "a"]), ["b", "a"]);
    }

    #[test]
    fn test_chain_order() {
        let graph = graph_with(&[("a", "b"), ("b", "c"), ("a", "c")], 5);
        assert_eq!(graph.reload_order(["a", "b", "c"]), ["c", "b", "a"]);
    }

    #[test]
    fn test_only_in_batch_dependencies_are_pulled_in() {
        let graph = graph_with(&[("a", "b"), ("b", "c")], 5);
        assert_eq!(graph.reload_order(["a", "c"]), ["a", "c"]);
    }

    #[test]
    fn test_unknown_module_orders_as_itself() {
        let graph = DependencyGraph::new(".");
        assert_eq!(graph.reload_order(["unknown.module"]), ["unknown.module"]);
    }

    #[test]
    fn test_cycle_terminates_with_each_module_once() {
        let graph = graph_with(&[("a", "b"), ("b", "c"), ("c", "a")], 5);
        let order = graph.reload_order(["a", "b", "c"]);
        assert_eq!(order.len(), 3);
        let unique: BTreeSet<_> = order.iter().collect();
        assert_eq!(unique.len(), 3);
    }

    #[test]
    fn test_two_node_cycle() {
        let graph = graph_with(&[("a", "b"), ("b", "a")], 5);
        assert_eq!(graph.reload_order(["a", "b"]), ["b", "a"]);
    }

    #[test]
    fn test_depth_bound_still_places_everything() {
        let graph = graph_with(&[("a", "b"), ("b", "c"), ("c", "d")], 1);
        let order = graph.reload_order(["a", "b", "c", "d"]);

        // a -> b is within bound, c is cut off below b and placed later
        assert_eq!(order, ["b", "a", "d", "c"]);
    }

    #[test]
    fn test_transitive_dependents_bounded() {
        let graph = graph_with(&[("b", "a"), ("c", "b"), ("d", "c"), ("e", "a")], 2);
        assert_eq!(graph.transitive_dependents("a", 1), ["b", "e"]);
        assert_eq!(graph.transitive_dependents("a", 2), ["b", "e", "c"]);
        assert_eq!(graph.transitive_dependents("a", 10), ["b", "e", "c", "d"]);
        assert!(graph.transitive_dependents("a", 0).is_empty());
    }

    #[test]
    fn test_transitive_dependents_cycle() {
        let graph = graph_with(&[("a", "b"), ("b", "a")], 5);
        assert_eq!(graph.transitive_dependents("a", 10), ["b"]);
    }

    #[test]
    fn test_set_dependencies_replaces_forward_edges_only() {
        let mut graph = graph_with(&[("a", "b"), ("x", "a")], 5);
        graph.set_dependencies("a", ["c"]);

        assert!(graph.dependencies("a").contains("c"));
        assert!(!graph.dependencies("a").contains("b"));
        assert!(graph.dependents_of("b").is_empty());
        assert!(graph.dependents_of("a").contains("x"));
    }

    #[test]
    fn test_dependencies_of_file_and_scenario() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = Utf8Path::from_path(dir.path()).expect("utf8");
        let a = write(root, "a.py", "import b\n");
        let b = write(root, "b.py", "x = 1\n");

        let mut graph = DependencyGraph::new(root);
        assert_eq!(graph.refresh_module(&a), Some(ExtensionId::new("a")));
        assert_eq!(graph.refresh_module(&b), Some(ExtensionId::new("b")));

        assert_eq!(graph.reload_order(["a", "b"]), ["b", "a"]);
    }

    #[test]
    fn test_from_import_records_submodule() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = Utf8Path::from_path(dir.path()).expect("utf8");
        let path = write(root, "cogs/fun.py", "from utils import embeds\n");

        let mut graph = DependencyGraph::new(root);
        let deps = graph.dependencies_of(&path);
        assert!(deps.contains("utils"));
        assert!(deps.contains("utils.embeds"));
    }

    #[test]
    fn test_relative_imports_use_package() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = Utf8Path::from_path(dir.path()).expect("utf8");
        let module = write(root, "cogs/fun/roll.py", "from .dice import d6\n");
        let init = write(root, "cogs/fun/__init__.py", "from . import roll\n");

        let mut graph = DependencyGraph::new(root);
        assert!(graph.dependencies_of(&module).contains("cogs.fun.dice.d6"));
        assert!(graph.dependencies_of(&init).contains("cogs.fun.roll"));
    }

    #[test]
    fn test_cache_is_explicit() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = Utf8Path::from_path(dir.path()).expect("utf8");
        let path = write(root, "m.py", "import one\n");

        let mut graph = DependencyGraph::new(root);
        assert!(graph.dependencies_of(&path).contains("one"));

        write(root, "m.py", "import two\n");
        assert!(graph.dependencies_of(&path).contains("one"));

        graph.clear_cache();
        assert!(graph.dependencies_of(&path).contains("two"));
    }

    #[test]
    fn test_refresh_module_self_heals() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = Utf8Path::from_path(dir.path()).expect("utf8");
        let path = write(root, "m.py", "import old\n");

        let mut graph = DependencyGraph::new(root);
        graph.refresh_module(&path);
        assert!(graph.dependents_of("old").contains("m"));

        write(root, "m.py", "import new\n");
        graph.refresh_module(&path);
        assert!(graph.dependents_of("old").is_empty());
        assert!(graph.dependents_of("new").contains("m"));
    }

    #[test]
    fn test_cache_is_bounded() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = Utf8Path::from_path(dir.path()).expect("utf8");
        let cap = NonZeroUsize::new(2).expect("non-zero");
        let mut graph = DependencyGraph::with_limits(root, cap, 5);

        for name in ["a.py", "b.py", "c.py"] {
            let path = write(root, name, "import os\n");
            graph.dependencies_of(&path);
        }
        assert_eq!(graph.cached_files(), 2);
    }

    #[test]
    fn test_unreadable_file_has_no_imports() {
        let mut graph = DependencyGraph::new(".");
        assert!(graph.dependencies_of(Utf8Path::new("/missing/x.py")).is_empty());
        assert_eq!(graph.cached_files(), 0);
    }

    #[test]
    fn test_package_of() {
        let base = Utf8Path::new("/bot");
        assert_eq!(
            package_of(Utf8Path::new("/bot/cogs/fun/roll.py"), base).as_deref(),
            Some("cogs.fun")
        );
        assert_eq!(
            package_of(Utf8Path::new("/bot/cogs/fun/__init__.py"), base).as_deref(),
            Some("cogs.fun")
        );
        assert_eq!(package_of(Utf8Path::new("/bot/top.py"), base), None);
    }

    #[test]
    fn test_snapshot_sorted() {
        let graph = graph_with(&[("b", "z"), ("b", "y"), ("a", "x")], 5);
        let snapshot = graph.snapshot();
        let keys: Vec<_> = snapshot.dependencies.keys().collect();
        assert_eq!(keys, ["a", "b"]);
        let json = serde_json::to_string(&snapshot).expect("serialize");
        assert!(json.contains(r#""b":["y","z"]"#));
    }

    #[test]
    fn test_clear() {
        let mut graph = graph_with(&[("a", "b")], 5);
        graph.clear();
        assert_eq!(graph.edge_count(), 0);
        assert_eq!(graph.module_count(), 0);
    }
}
