//! Change trackers, dependency graph, and extension resolution.
//!
//! This crate holds the in-memory state the hot-reload pipeline consults for
//! every file change:
//!
//! - [`FileHashTracker`]: content digests, to drop duplicate notifications
//! - [`ClassDefinitionTracker`]: per-class method signatures, to tell
//!   structural edits from body-only edits
//! - [`DependencyGraph`]: module import edges in both directions, and the
//!   dependency-respecting reload order
//! - [`ExtensionResolver`]: file path to loadable extension, through the
//!   package aggregator when needed
//! - [`FileWalker`] and [`ModuleAnalyzer`]: parallel priming of all of the
//!   above from the files already on disk
//!
//! # Example
//!
//! ```
//! use hr_tracker::DependencyGraph;
//!
//! let mut graph = DependencyGraph::new(".");
//! graph.add_dependency("cogs.levels", "utils.db");
//! graph.add_dependency("cogs.tickets", "utils.db");
//! graph.add_dependency("utils.db", "utils.config");
//!
//! assert_eq!(
//!     graph.reload_order(["cogs.levels", "utils.db", "utils.config"]),
//!     ["utils.config", "utils.db", "cogs.levels"],
//! );
//! assert_eq!(
//!     graph.transitive_dependents("utils.config", 5),
//!     ["utils.db", "cogs.levels", "cogs.tickets"],
//! );
//! ```
//!
//! # Architecture
//!
//! ```text
//! ModuleAnalyzer (priming, rayon)
//!     │
//!     ├── FileWalker (ignore crate)
//!     └── PyParser per thread (hr-py-parser)
//!             │
//!             ▼
//! FileHashTracker   ClassDefinitionTracker   DependencyGraph (+ LRU import cache)
//! ```
//!
//! None of the trackers synchronize internally; the owner wraps them in
//! whatever lock fits its concurrency model.

#![deny(clippy::all)]
#![warn(missing_docs)]

mod analyzer;
mod class_tracker;
pub mod error;
mod graph;
mod hash_tracker;
mod resolve;
mod walker;

pub use analyzer::{ModuleAnalysis, ModuleAnalyzer, PrimeSummary};
pub use class_tracker::ClassDefinitionTracker;
pub use error::TrackerError;
pub use graph::{DependencyGraph, GraphSnapshot, package_of};
pub use hash_tracker::{FileHashTracker, digest_bytes};
pub use resolve::{ExtensionResolver, LoadableUnitProbe, SetupFunctionProbe};
pub use walker::FileWalker;
