//! Hot-reload orchestration for bot extensions.
//!
//! [`HotReloadService`] ties the pipeline together:
//!
//! - primes the trackers from the watch directories on start
//! - runs a [`ChangeHandler`](hr_watcher::ChangeHandler) over a
//!   [`FileWatcher`](hr_watcher::FileWatcher)
//! - performs debounced and manual reloads through an [`ExtensionHost`],
//!   one at a time, with retries and a timeout per host call
//! - cascades successful reloads to loaded dependents in dependency order
//! - records [`ReloadStatistics`]
//!
//! # Reload Flow
//!
//! ```text
//! debounce fires / manual_reload
//!         │
//!         ▼
//!   reload lock ──► attempt (load | reload) ──retry──► attempt ...
//!         │                 │
//!         │            timeout bound
//!         ▼
//!   stats + state ──success──► dependents in reload order
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod error;
mod host;
mod service;
mod stats;

pub use error::ServiceError;
pub use host::{ExtensionHost, HostError};
pub use service::{HotReloadService, SLOW_RELOAD_THRESHOLD, ServiceStatus};
pub use stats::{ReloadStatistics, StatsSnapshot};
