//! Domain types for the hot-reload engine.
//!
//! - [`extension`] - dotted extension identifiers and their file paths
//! - [`state`] - per-extension reload lifecycle
//!
//! All public types are re-exported here and at the crate root:
//!
//! ```
//! use hr_core::{ExtensionId, ReloadState};
//! ```

mod extension;
mod state;

pub use extension::ExtensionId;
pub use state::ReloadState;
