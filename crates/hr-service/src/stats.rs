//! Reload statistics.
//!
//! This module provides [`ReloadStatistics`] for recording reload outcomes
//! and [`StatsSnapshot`] for point-in-time views.
//!
//! # Consistency
//!
//! The service updates statistics only while it holds its reload lock, and
//! keeps them behind a mutex, so a snapshot never sees a half-recorded
//! outcome.
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//!
//! use hr_core::ExtensionId;
//! use hr_service::ReloadStatistics;
//!
//! let mut stats = ReloadStatistics::new();
//! stats.record_success(&ExtensionId::new("cogs.ping"), Duration::from_millis(120));
//!
//! let snapshot = stats.snapshot();
//! assert_eq!(snapshot.successful_reloads, 1);
//! assert_eq!(snapshot.last_reload.as_deref(), Some("cogs.ping"));
//! ```

use std::time::Duration;

use hr_core::ExtensionId;
use serde::{Deserialize, Serialize};

/// Cumulative reload counters with a running average duration.
#[derive(Debug, Clone, Default)]
pub struct ReloadStatistics {
    total: u64,
    successful: u64,
    failed: u64,
    average: Duration,
    last_reload: Option<ExtensionId>,
    last_error: Option<String>,
}

impl ReloadStatistics {
    /// Creates statistics with all counters at zero.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a successful attempt.
    pub fn record_success(&mut self, extension: &ExtensionId, duration: Duration) {
        self.successful += 1;
        self.record(extension, duration);
    }

    /// Records a failed attempt.
    pub fn record_failure(&mut self, extension: &ExtensionId, duration: Duration, error: &str) {
        self.failed += 1;
        self.last_error = Some(format!("{extension}: {error}"));
        self.record(extension, duration);
    }

    #[allow(clippy::cast_precision_loss)] // counts stay far below 2^52
    fn record(&mut self, extension: &ExtensionId, duration: Duration) {
        self.total += 1;
        self.last_reload = Some(extension.clone());
        // running mean: avg += (x - avg) / n
        let n = self.total as f64;
        let avg = self.average.as_secs_f64();
        let next = avg + (duration.as_secs_f64() - avg) / n;
        self.average = Duration::from_secs_f64(next.max(0.0));
    }

    /// Number of recorded attempts.
    #[inline]
    #[must_use]
    pub const fn total_reloads(&self) -> u64 {
        self.total
    }

    /// Mean duration over all recorded attempts.
    #[inline]
    #[must_use]
    pub const fn average_duration(&self) -> Duration {
        self.average
    }

    /// Returns a copy of the current values.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_reloads: self.total,
            successful_reloads: self.successful,
            failed_reloads: self.failed,
            average_reload_ms: self.average.as_secs_f64() * 1000.0,
            last_reload: self.last_reload.as_ref().map(|e| e.as_str().to_owned()),
            last_error: self.last_error.clone(),
        }
    }

    /// Resets every counter.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// A point-in-time copy of [`ReloadStatistics`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Attempts recorded, successful or not.
    pub total_reloads: u64,
    /// Attempts that succeeded.
    pub successful_reloads: u64,
    /// Attempts that failed, including timeouts.
    pub failed_reloads: u64,
    /// Mean attempt duration in milliseconds.
    pub average_reload_ms: f64,
    /// Extension of the most recent attempt.
    pub last_reload: Option<String>,
    /// Most recent failure, prefixed with its extension.
    pub last_error: Option<String>,
}

impl StatsSnapshot {
    /// Percentage of attempts that succeeded. Zero when nothing ran.
    ///
    /// ```
    /// use hr_service::StatsSnapshot;
    ///
    /// let snapshot = StatsSnapshot { total_reloads: 4, successful_reloads: 3, ..Default::default() };
    /// assert!((snapshot.success_rate_percent() - 75.0).abs() < f64::EPSILON);
    /// ```
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn success_rate_percent(&self) -> f64 {
        if self.total_reloads == 0 {
            return 0.0;
        }
        (self.successful_reloads as f64 / self.total_reloads as f64) * 100.0
    }
}

impl std::fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} reloads ({} ok, {} failed), avg {:.1}ms",
            self.total_reloads, self.successful_reloads, self.failed_reloads, self.average_reload_ms
        )
    }
}
