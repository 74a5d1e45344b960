//! Reload lifecycle states.

use serde::{Deserialize, Serialize};

/// Where an extension currently sits in the reload lifecycle.
///
/// ```text
/// Idle ──change──► Pending ──timer fires──► Reloading ──done──► Idle
///                   ▲   │
///                   └───┘ change (timer restarted)
/// ```
///
/// A change observed while `Reloading` schedules a fresh `Pending` entry
/// that runs after the current reload releases the service lock.
///
/// # Examples
///
/// ```
/// use hr_core::ReloadState;
///
/// assert!(ReloadState::Pending.is_busy());
/// assert!(!ReloadState::Idle.is_busy());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReloadState {
    /// Nothing scheduled.
    #[default]
    Idle,

    /// A debounce timer is running.
    Pending,

    /// A load/reload is executing under the service lock.
    Reloading,
}

impl ReloadState {
    /// Returns `true` for [`Pending`](Self::Pending) and
    /// [`Reloading`](Self::Reloading).
    #[inline]
    #[must_use]
    pub const fn is_busy(self) -> bool {
        !matches!(self, Self::Idle)
    }

    /// Returns a human-readable label.
    ///
    /// ```
    /// use hr_core::ReloadState;
    ///
    /// assert_eq!(ReloadState::Reloading.label(), "Reloading");
    /// ```
    #[inline]
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Pending => "Pending",
            Self::Reloading => "Reloading",
        }
    }
}

impl std::fmt::Display for ReloadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
