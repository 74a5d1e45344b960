//! Python parser management using tree-sitter.
//!
//! This module provides the [`PyParser`] struct for parsing Python modules
//! and extracting everything the reload pipeline needs from one parse.

use smallvec::SmallVec;
use tree_sitter::{Language, Parser, Tree};

use crate::class::{ClassSignatures, defines_setup, extract_class_signatures};
use crate::error::ParseError;
use crate::import::{ImportInfo, extract_imports};
use crate::queries::{get_import_query, python_language};
use crate::syntax::{SyntaxIssue, find_syntax_issue};

/// Result of parsing a Python module.
#[derive(Debug)]
pub struct ParseResult {
    /// All import statements detected in the file.
    ///
    /// Uses `SmallVec<[ImportInfo; 8]>` to avoid heap allocation for
    /// typical modules with 8 or fewer imports.
    pub imports: SmallVec<[ImportInfo; 8]>,

    /// Method-signature fingerprint of every class in the file.
    pub classes: ClassSignatures,

    /// Whether the module defines a top-level `setup` entry point.
    pub defines_setup: bool,

    /// First syntax problem, if any.
    pub syntax_issue: Option<SyntaxIssue>,

    /// The syntax tree from parsing.
    pub tree: Tree,
}

impl ParseResult {
    /// Returns `true` if the module parsed without syntax errors.
    #[inline]
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.syntax_issue.is_none()
    }

    /// Returns the dotted names of every module this file imports.
    ///
    /// See [`ImportInfo::dependency_names`] for how `package` is used.
    #[must_use]
    pub fn dependency_names(&self, package: Option<&str>) -> Vec<String> {
        let mut names: Vec<String> = self
            .imports
            .iter()
            .flat_map(|import| import.dependency_names(package))
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}

/// Python parser for extracting imports, classes, and syntax errors.
///
/// Wraps a tree-sitter parser configured for Python. The parser can be
/// reused for multiple files to avoid repeated initialization.
///
/// # Thread Safety
///
/// `PyParser` is `Send` but not `Sync`. For parallel work with rayon,
/// create one parser per task (for example with `map_init`). The compiled
/// import query is shared across all parser instances.
///
/// # Examples
///
/// ```
/// use hr_py_parser::PyParser;
///
/// let mut parser = PyParser::new()?;
/// let result = parser.parse("import discord\nfrom tux.bot import Tux\n")?;
///
/// assert_eq!(result.imports.len(), 2);
/// assert!(result.is_valid());
/// # Ok::<(), hr_py_parser::ParseError>(())
/// ```
pub struct PyParser {
    parser: Parser,
    language: Language,
}

impl PyParser {
    /// Creates a new Python parser.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::LanguageInit`] if the Python grammar cannot be
    /// set on the parser.
    pub fn new() -> Result<Self, ParseError> {
        let mut parser = Parser::new();
        let language = python_language();

        parser
            .set_language(&language)
            .map_err(|_| ParseError::LanguageInit)?;

        Ok(Self { parser, language })
    }

    /// Parses Python source and runs every extraction pass over it.
    ///
    /// Syntax errors do not fail the parse: tree-sitter recovers and the
    /// problem is reported in [`ParseResult::syntax_issue`].
    ///
    /// # Errors
    ///
    /// - Returns [`ParseError::Parse`] if tree-sitter produced no tree
    /// - Returns [`ParseError::QueryCompile`] if the import query fails to compile
    pub fn parse(&mut self, source: &str) -> Result<ParseResult, ParseError> {
        let tree = self.parse_tree(source)?;
        let query = get_import_query()?;

        Ok(ParseResult {
            imports: extract_imports(&tree, source, query),
            classes: extract_class_signatures(&tree, source),
            defines_setup: defines_setup(&tree, source),
            syntax_issue: find_syntax_issue(&tree),
            tree,
        })
    }

    /// Parses Python source and reports only the first syntax problem.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::Parse`] if tree-sitter produced no tree.
    ///
    /// # Examples
    ///
    /// ```
    /// use hr_py_parser::PyParser;
    ///
    /// let mut parser = PyParser::new()?;
    /// assert!(parser.check_syntax("x = (1,\n")?.is_some());
    /// assert!(parser.check_syntax("x = (1,)\n")?.is_none());
    /// # Ok::<(), hr_py_parser::ParseError>(())
    /// ```
    pub fn check_syntax(&mut self, source: &str) -> Result<Option<SyntaxIssue>, ParseError> {
        let tree = self.parse_tree(source)?;
        Ok(find_syntax_issue(&tree))
    }

    /// Returns `true` if the source defines a top-level `setup` function.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::Parse`] if tree-sitter produced no tree.
    pub fn defines_setup(&mut self, source: &str) -> Result<bool, ParseError> {
        let tree = self.parse_tree(source)?;
        Ok(defines_setup(&tree, source))
    }

    /// Returns the tree-sitter language used by this parser.
    #[inline]
    pub fn language(&self) -> &Language {
        &self.language
    }

    fn parse_tree(&mut self, source: &str) -> Result<Tree, ParseError> {
        self.parser.parse(source, None).ok_or(ParseError::Parse)
    }
}

impl std::fmt::Debug for PyParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PyParser")
            .field("language", &"Python")
            .finish_non_exhaustive()
    }
}
