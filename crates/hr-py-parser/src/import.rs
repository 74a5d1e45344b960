//! Import extraction from Python source using tree-sitter queries.
//!
//! This module provides [`ImportInfo`] and [`extract_imports`], which turn a
//! parsed syntax tree into the list of modules a file depends on.

use smallvec::{SmallVec, smallvec};
use streaming_iterator::StreamingIterator;
use tree_sitter::{Node, Query, QueryCursor, Tree};

use crate::queries::{CAPTURE_IMPORT_FROM, CAPTURE_IMPORT_MODULE};

/// The syntactic form of an import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImportKind {
    /// `import a.b` or `import a.b as c`.
    Module,
    /// `from a import b, c`.
    From,
    /// `from a import *`.
    Wildcard,
}

/// A single import statement (or a single name of a multi-name `import`).
///
/// # Examples
///
/// ```
/// use hr_py_parser::PyParser;
///
/// let mut parser = PyParser::new()?;
/// let result = parser.parse("from ..utils import embeds\n")?;
/// let import = &result.imports[0];
///
/// assert_eq!(import.level, 2);
/// assert_eq!(import.module, "utils");
/// assert_eq!(
///     import.dependency_names(Some("tux.cogs.admin")).as_slice(),
///     ["tux.cogs.utils", "tux.cogs.utils.embeds"],
/// );
/// # Ok::<(), hr_py_parser::ParseError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportInfo {
    /// The imported module, without any leading dots.
    ///
    /// Empty for `from . import x`.
    pub module: String,

    /// Names imported by a `from` statement (aliases are dropped).
    pub names: SmallVec<[String; 4]>,

    /// Number of leading dots of a relative import; `0` when absolute.
    pub level: usize,

    /// The syntactic form.
    pub kind: ImportKind,

    /// 1-based line of the statement.
    pub line: usize,
}

impl ImportInfo {
    /// Returns `true` for `from .x import y` style imports.
    #[inline]
    #[must_use]
    pub const fn is_relative(&self) -> bool {
        self.level > 0
    }

    /// Resolves the module this import refers to.
    ///
    /// `package` is the package the importing file belongs to (for
    /// `a/b/c.py` that is `a.b`; for `a/b/__init__.py` it is `a.b` as well).
    /// Returns `None` for relative imports that cannot be resolved: no
    /// package given, or more leading dots than the package is deep.
    #[must_use]
    pub fn resolved_module(&self, package: Option<&str>) -> Option<String> {
        if self.level == 0 {
            return Some(self.module.clone());
        }

        let package = package.filter(|p| !p.is_empty())?;
        let mut parts: Vec<&str> = package.split('.').collect();
        let strip = self.level - 1;
        if strip >= parts.len() {
            return None;
        }
        parts.truncate(parts.len() - strip);

        let base = parts.join(".");
        if self.module.is_empty() {
            Some(base)
        } else {
            Some(format!("{base}.{}", self.module))
        }
    }

    /// Returns the dotted module names this import makes the file depend on.
    ///
    /// `import X` yields `X`. `from X import Y` yields both `X` and `X.Y`,
    /// since `Y` may be a submodule. Unresolvable relative imports yield
    /// nothing.
    #[must_use]
    pub fn dependency_names(&self, package: Option<&str>) -> SmallVec<[String; 4]> {
        let Some(base) = self.resolved_module(package) else {
            return SmallVec::new();
        };
        if base.is_empty() {
            return SmallVec::new();
        }

        let mut out: SmallVec<[String; 4]> = smallvec![base.clone()];
        if self.kind == ImportKind::From {
            out.extend(self.names.iter().map(|name| format!("{base}.{name}")));
        }
        out
    }
}

/// Extracts all imports from a parsed Python syntax tree.
///
/// Imports are found at any depth, including inside functions and
/// `try`/`if` blocks. `from __future__` imports are not reported.
///
/// # Arguments
///
/// * `tree` - The parsed syntax tree
/// * `source` - The original source code (needed to extract text from nodes)
/// * `query` - The pre-compiled import query
pub fn extract_imports(tree: &Tree, source: &str, query: &Query) -> SmallVec<[ImportInfo; 8]> {
    let source_bytes = source.as_bytes();
    let mut cursor = QueryCursor::new();
    let mut imports: SmallVec<[ImportInfo; 8]> = SmallVec::new();

    let mut matches = cursor.matches(query, tree.root_node(), source_bytes);
    while let Some(match_) = matches.next() {
        for capture in match_.captures {
            let node = capture.node;
            match capture.index {
                idx if idx == CAPTURE_IMPORT_MODULE => {
                    if let Some(module) = node_text(node, source_bytes) {
                        imports.push(ImportInfo {
                            module: module.to_owned(),
                            names: SmallVec::new(),
                            level: 0,
                            kind: ImportKind::Module,
                            line: line_of(node),
                        });
                    }
                }
                idx if idx == CAPTURE_IMPORT_FROM => {
                    if let Some(import) = build_from_import(node, source_bytes) {
                        imports.push(import);
                    }
                }
                _ => {}
            }
        }
    }

    imports.sort_by_key(|i| i.line);
    imports
}

/// Builds an [`ImportInfo`] from an `import_from_statement` node.
fn build_from_import(statement: Node<'_>, source: &[u8]) -> Option<ImportInfo> {
    let module_node = statement.child_by_field_name("module_name")?;
    let (module, level) = match module_node.kind() {
        "relative_import" => split_relative(node_text(module_node, source)?),
        _ => (node_text(module_node, source)?.to_owned(), 0),
    };

    let mut names: SmallVec<[String; 4]> = SmallVec::new();
    let mut cursor = statement.walk();
    for name_node in statement.children_by_field_name("name", &mut cursor) {
        let target = if name_node.kind() == "aliased_import" {
            name_node.child_by_field_name("name")
        } else {
            Some(name_node)
        };
        if let Some(text) = target.and_then(|n| node_text(n, source)) {
            names.push(text.to_owned());
        }
    }

    let mut cursor = statement.walk();
    let wildcard = statement
        .named_children(&mut cursor)
        .any(|child| child.kind() == "wildcard_import");

    Some(ImportInfo {
        module,
        names,
        level,
        kind: if wildcard {
            ImportKind::Wildcard
        } else {
            ImportKind::From
        },
        line: line_of(statement),
    })
}

/// Splits the text of a `relative_import` node into module and level.
fn split_relative(text: &str) -> (String, usize) {
    let module = text.trim_start_matches('.');
    let level = text.len() - module.len();
    (module.trim().to_owned(), level)
}

/// Returns the UTF-8 text of a node.
#[inline]
pub(crate) fn node_text<'a>(node: Node<'_>, source: &'a [u8]) -> Option<&'a str> {
    node.utf8_text(source).ok()
}

/// Returns the 1-based line a node starts on.
#[inline]
pub(crate) fn line_of(node: Node<'_>) -> usize {
    node.start_position().row + 1
}
