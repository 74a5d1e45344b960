//! Core configuration, errors, and domain types for the hot-reload engine.
//!
//! This crate provides the foundational types used across the workspace:
//!
//! - [`HotReloadSettings`] (raw, serde-friendly options) and
//!   [`HotReloadConfig`] (validated, immutable configuration)
//! - [`ConfigError`] for configuration failures
//! - [`ExtensionId`], the dotted identifier of a loadable extension
//! - [`ReloadState`], the per-extension reload lifecycle
//!
//! # Crate Dependencies
//!
//! ```text
//! hr-cli ──► hr-service ──► hr-watcher ──► hr-tracker ──► hr-py-parser ──► hr-core
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod types;

pub use config::{HotReloadConfig, HotReloadSettings, LogLevel};
pub use error::ConfigError;
pub use types::{ExtensionId, ReloadState};

/// A [`HashMap`](std::collections::HashMap) keyed with the Fx hash algorithm.
pub type FxHashMap<K, V> = rustc_hash::FxHashMap<K, V>;

/// A [`HashSet`](std::collections::HashSet) keyed with the Fx hash algorithm.
pub type FxHashSet<V> = rustc_hash::FxHashSet<V>;
