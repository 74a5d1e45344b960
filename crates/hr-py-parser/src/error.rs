//! Error types for the hr-py-parser crate.
//!
//! This module provides the [`ParseError`] type for failures of the parsing
//! machinery itself. A source file that merely contains syntax errors is not
//! a [`ParseError`]; it parses into a tree whose
//! [`syntax_issue`](crate::ParseResult::syntax_issue) is set.

/// Errors that can occur while setting up or running the Python parser.
///
/// # Examples
///
/// ```
/// use hr_py_parser::ParseError;
///
/// fn handle_error(err: ParseError) {
///     match err {
///         ParseError::ParserInit => eprintln!("Failed to initialize parser"),
///         ParseError::LanguageInit => eprintln!("Failed to set Python language"),
///         ParseError::QueryCompile { offset, .. } => {
///             eprintln!("Query compilation failed at offset {offset}");
///         }
///         ParseError::Parse => eprintln!("Failed to parse source code"),
///     }
/// }
/// ```
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// Failed to create a new tree-sitter parser.
    #[error("failed to initialize tree-sitter parser")]
    ParserInit,

    /// Failed to set the Python language on the parser.
    #[error("failed to set Python language")]
    LanguageInit,

    /// Failed to compile a tree-sitter query.
    #[error("failed to compile query at offset {offset}: {kind:?}")]
    QueryCompile {
        /// The byte offset in the query string where the error occurred.
        offset: usize,
        /// The kind of query error.
        kind: tree_sitter::QueryError,
    },

    /// Tree-sitter returned no tree.
    ///
    /// This only happens when parsing is cancelled or times out.
    #[error("failed to parse source code")]
    Parse,
}
