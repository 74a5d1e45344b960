//! Pre-compiled tree-sitter queries for Python import extraction.
//!
//! This module provides the [`IMPORT_QUERY`] constant and
//! [`get_import_query`] for lazily compiling and caching it.

use std::sync::OnceLock;

use tree_sitter::{Language, Query};

use crate::error::ParseError;

/// Tree-sitter query for extracting Python imports.
///
/// # Capture Names
///
/// - `import.module` - each dotted name of an `import a.b, c as d` statement
/// - `import.from` - the whole `from X import Y` statement; its `module_name`
///   and `name` fields are read directly from the node
pub const IMPORT_QUERY: &str = r"
; import a.b
(import_statement
  name: (dotted_name) @import.module)

; import a.b as c
(import_statement
  name: (aliased_import
    name: (dotted_name) @import.module))

; from a.b import c, d as e / from . import f / from a import *
(import_from_statement) @import.from
";

/// Capture index for `import.module`.
pub const CAPTURE_IMPORT_MODULE: u32 = 0;

/// Capture index for `import.from`.
pub const CAPTURE_IMPORT_FROM: u32 = 1;

/// Global cache for the compiled import query.
static COMPILED_IMPORT_QUERY: OnceLock<Query> = OnceLock::new();

/// Returns the tree-sitter Python language.
#[inline]
#[must_use]
pub fn python_language() -> Language {
    tree_sitter_python::LANGUAGE.into()
}

/// Returns the compiled import query.
///
/// The query is compiled once and cached for all subsequent calls.
/// This function is thread-safe.
///
/// # Errors
///
/// Returns [`ParseError::QueryCompile`] if the query fails to compile.
pub fn get_import_query() -> Result<&'static Query, ParseError> {
    if let Some(query) = COMPILED_IMPORT_QUERY.get() {
        return Ok(query);
    }

    let query = compile_query(&python_language(), IMPORT_QUERY)?;
    Ok(COMPILED_IMPORT_QUERY.get_or_init(|| query))
}

/// Compiles `source` for the given language.
fn compile_query(language: &Language, source: &str) -> Result<Query, ParseError> {
    Query::new(language, source).map_err(|e| ParseError::QueryCompile {
        offset: e.offset,
        kind: e,
    })
}
