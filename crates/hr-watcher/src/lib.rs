//! Filesystem watching and debounced reload scheduling.
//!
//! This crate bridges OS file notifications to the reload pipeline:
//!
//! - [`FileWatcher`]: `notify` on a blocking thread, streaming
//!   [`FileEvent`]s over a tokio channel
//! - [`GlobFilter`]: include/ignore globs, applied before anything else
//! - [`ChangeHandler`]: digest, syntax check, class and graph bookkeeping,
//!   then resolution to an extension
//! - [`Debouncer`]: one cancellable timer per extension, so a burst of saves
//!   produces a single reload
//!
//! # Architecture
//!
//! ```text
//! notify thread ──FileEvent──► ChangeHandler::run ──schedule(ext)──► Debouncer
//!                                    │                                  │
//!                                    ▼                                  ▼ (delay elapsed)
//!                            Trackers (hashes,                   reload callback
//!                             classes, graph)
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

mod debounce;
pub mod error;
mod events;
mod filter;
mod handler;
mod watcher;

pub use debounce::{DebounceCallback, Debouncer};
pub use error::WatchError;
pub use events::{FileEvent, FileEventKind};
pub use filter::{AcceptAllFilter, FileFilter, GlobFilter};
pub use handler::{ChangeHandler, HandleOutcome, SharedTrackers, Trackers};
pub use watcher::{DEFAULT_NOTIFY_WINDOW, FileWatcher, existing_directories};
