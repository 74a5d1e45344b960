//! Python parser using tree-sitter for import, class, and syntax analysis.
//!
//! This crate turns the source of a watched Python module into the facts the
//! hot-reload pipeline needs:
//!
//! - Import statements, resolved to dotted module names (relative imports
//!   included) for the dependency graph
//! - A method-signature fingerprint per class, for structural change detection
//! - Whether the module defines the `setup` entry point of a loadable extension
//! - The location of the first syntax error, so broken files are never reloaded
//!
//! # Overview
//!
//! The main entry point is [`PyParser`]. One [`PyParser::parse`] call runs
//! every extraction pass over a single syntax tree:
//!
//! ```
//! use hr_py_parser::PyParser;
//!
//! let mut parser = PyParser::new()?;
//! let source = r#"
//! from discord.ext import commands
//! from .shared import helpers
//!
//! class Fun(commands.Cog):
//!     async def roll(self, ctx, sides=6):
//!         ...
//!
//! async def setup(bot):
//!     await bot.add_cog(Fun(bot))
//! "#;
//!
//! let result = parser.parse(source)?;
//! assert!(result.is_valid());
//! assert!(result.defines_setup);
//! assert_eq!(result.classes["Fun"], "roll(self, ctx, sides)");
//! assert!(result
//!     .dependency_names(Some("cogs.fun"))
//!     .contains(&"cogs.fun.shared.helpers".to_owned()));
//! # Ok::<(), hr_py_parser::ParseError>(())
//! ```
//!
//! # Import Detection
//!
//! | Pattern | Example | Dependencies |
//! |---------|---------|--------------|
//! | Module | `import a.b as c` | `a.b` |
//! | From | `from a import b` | `a`, `a.b` |
//! | Wildcard | `from a import *` | `a` |
//! | Relative | `from ..a import b` (in package `p.q`) | `p.a`, `p.a.b` |
//!
//! # Thread Safety
//!
//! [`PyParser`] is `Send` but not `Sync`. The compiled import query is
//! shared globally.

#![deny(clippy::all)]
#![warn(missing_docs)]

mod class;
pub mod error;
mod import;
mod parser;
pub mod queries;
mod syntax;

pub use class::{ClassSignatures, defines_setup, extract_class_signatures};
pub use error::ParseError;
pub use import::{ImportInfo, ImportKind, extract_imports};
pub use parser::{ParseResult, PyParser};
pub use syntax::{SyntaxIssue, find_syntax_issue};
