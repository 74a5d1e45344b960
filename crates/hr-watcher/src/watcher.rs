//! File watcher with async event streaming.
//!
//! This module provides the [`FileWatcher`] type that bridges the synchronous
//! `notify` file watching crate to the async tokio runtime.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Blocking Thread (spawn_blocking)             │
//! │  ┌──────────────────┐    ┌────────────────┐    ┌────────────┐  │
//! │  │ RecommendedWatcher│ -> │ Debouncer      │ -> │ Callback   │  │
//! │  │ (one per tree)   │    │ (100ms window) │    │ (filtering)│  │
//! │  └──────────────────┘    └────────────────┘    └─────┬──────┘  │
//! └──────────────────────────────────────────────────────│─────────┘
//!                                                        │
//!                                          blocking_send │
//!                                                        ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Async Runtime (tokio)                        │
//! │  ┌──────────────────┐    ┌────────────────┐                     │
//! │  │ FileWatcher      │    │ mpsc::Receiver │ -> ChangeHandler    │
//! │  │ (shutdown ctrl)  │    │ (events)       │                     │
//! │  └──────────────────┘    └────────────────┘                     │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The short notify-level window only merges the several raw OS events a
//! single save produces. Per-extension debouncing happens later, in
//! [`Debouncer`](crate::Debouncer).

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use notify::RecursiveMode;
use notify_debouncer_mini::{DebounceEventResult, Debouncer, new_debouncer};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::WatchError;
use crate::events::FileEvent;
use crate::filter::FileFilter;

/// Default channel capacity for file events.
const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Window in which raw notify events for one path are merged.
pub const DEFAULT_NOTIFY_WINDOW: Duration = Duration::from_millis(100);

/// Canonicalizes the directories that exist and skips the rest with a
/// warning.
///
/// ```
/// use camino::Utf8PathBuf;
/// use hr_watcher::existing_directories;
///
/// let dirs = existing_directories(&[Utf8PathBuf::from("/definitely/missing")]);
/// assert!(dirs.is_empty());
/// ```
pub fn existing_directories(dirs: &[Utf8PathBuf]) -> Vec<Utf8PathBuf> {
    let mut existing: Vec<Utf8PathBuf> = Vec::with_capacity(dirs.len());
    for dir in dirs {
        if !dir.is_dir() {
            tracing::warn!(path = %dir, "watch directory does not exist, skipping");
            continue;
        }
        match dir.canonicalize_utf8() {
            Ok(canonical) => {
                if !existing.contains(&canonical) {
                    existing.push(canonical);
                }
            }
            Err(e) => {
                tracing::warn!(path = %dir, error = %e, "cannot resolve watch directory, skipping");
            }
        }
    }
    existing
}

/// A file watcher over one or more directory trees that streams filtered
/// events to an async context.
///
/// # Lifecycle
///
/// 1. **Creation**: [`FileWatcher::new`] skips missing directories, spawns a
///    blocking task with the notify watcher, and waits until it is watching.
/// 2. **Event Reception**: [`recv`](Self::recv) yields events that already
///    passed the filter.
/// 3. **Shutdown**: [`shutdown`](Self::shutdown) stops the thread and awaits
///    it. Dropping the watcher sends the same signal without waiting.
///
/// # Examples
///
/// ```no_run
/// use camino::Utf8PathBuf;
/// use hr_watcher::{FileWatcher, GlobFilter};
///
/// # async fn example() -> Result<(), hr_watcher::WatchError> {
/// let filter = GlobFilter::new(&["*.py"], &["__pycache__/*"])?;
/// let mut watcher = FileWatcher::new(&[Utf8PathBuf::from("cogs")], filter).await?;
///
/// while let Some(event) = watcher.recv().await {
///     println!("{:?}: {}", event.kind, event.path);
/// }
/// # Ok(())
/// # }
/// ```
pub struct FileWatcher {
    /// Shutdown signal sender. `None` after shutdown is initiated.
    shutdown_tx: Option<oneshot::Sender<()>>,

    /// Handle to the blocking watcher task.
    task_handle: Option<JoinHandle<Result<(), WatchError>>>,

    /// Event receiver for async consumption.
    event_rx: mpsc::Receiver<FileEvent>,

    /// Canonical directories actually being watched.
    watch_paths: Vec<Utf8PathBuf>,
}

impl std::fmt::Debug for FileWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileWatcher")
            .field("watch_paths", &self.watch_paths)
            .field("is_running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl FileWatcher {
    /// Starts watching every existing directory in `dirs` recursively.
    ///
    /// Directories that do not exist are logged and skipped. If none exist,
    /// the watcher still starts and simply never reports anything.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Notify`] if the notify watcher fails to
    /// initialize or to watch a directory, and
    /// [`WatchError::ChannelClosed`] if the watcher thread dies during
    /// startup.
    pub async fn new<F: FileFilter>(dirs: &[Utf8PathBuf], filter: F) -> Result<Self, WatchError> {
        Self::with_options(dirs, filter, DEFAULT_NOTIFY_WINDOW, DEFAULT_CHANNEL_CAPACITY).await
    }

    /// Like [`new`](Self::new) with an explicit notify window and channel
    /// capacity.
    ///
    /// # Errors
    ///
    /// See [`new`](Self::new).
    pub async fn with_options<F: FileFilter>(
        dirs: &[Utf8PathBuf],
        filter: F,
        notify_window: Duration,
        channel_capacity: usize,
    ) -> Result<Self, WatchError> {
        let watch_paths = existing_directories(dirs);
        if watch_paths.is_empty() {
            tracing::warn!("no watch directory exists, watcher will stay idle");
        }

        let (event_tx, event_rx) = mpsc::channel(channel_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (ready_tx, ready_rx) = oneshot::channel();

        let task_paths = watch_paths.clone();
        let task_handle = tokio::task::spawn_blocking(move || {
            run_watcher_loop(
                &task_paths,
                notify_window,
                event_tx,
                shutdown_rx,
                ready_tx,
                filter,
            )
        });

        match ready_rx.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(WatchError::ChannelClosed),
        }

        Ok(Self {
            shutdown_tx: Some(shutdown_tx),
            task_handle: Some(task_handle),
            event_rx,
            watch_paths,
        })
    }

    /// Receives the next file event.
    ///
    /// Returns `None` once the watcher thread has stopped.
    pub async fn recv(&mut self) -> Option<FileEvent> {
        self.event_rx.recv().await
    }

    /// Tries to receive a file event without waiting.
    pub fn try_recv(&mut self) -> Result<FileEvent, mpsc::error::TryRecvError> {
        self.event_rx.try_recv()
    }

    /// Returns a mutable reference to the event receiver, for use with
    /// `tokio::select!`.
    pub fn events(&mut self) -> &mut mpsc::Receiver<FileEvent> {
        &mut self.event_rx
    }

    /// Returns the directories being watched.
    #[must_use]
    pub fn watch_paths(&self) -> &[Utf8PathBuf] {
        &self.watch_paths
    }

    /// Returns `true` if `path` is inside a watched directory.
    #[must_use]
    pub fn is_watching(&self, path: &Utf8Path) -> bool {
        self.watch_paths.iter().any(|root| path.starts_with(root))
    }

    /// Returns `true` if the watcher thread is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shutdown_tx.is_some() && self.task_handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stops the watcher thread and waits for it to exit.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::ThreadPanicked`] if the thread panicked.
    pub async fn shutdown(mut self) -> Result<(), WatchError> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(handle) = self.task_handle.take() {
            match handle.await {
                Ok(result) => result?,
                Err(_join_error) => return Err(WatchError::ThreadPanicked),
            }
        }

        Ok(())
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Runs the notify watcher in a blocking context until shutdown.
///
/// Setup errors go back through `ready_tx`.
fn run_watcher_loop<F: FileFilter>(
    paths: &[Utf8PathBuf],
    notify_window: Duration,
    event_tx: mpsc::Sender<FileEvent>,
    shutdown_rx: oneshot::Receiver<()>,
    ready_tx: oneshot::Sender<Result<(), WatchError>>,
    filter: F,
) -> Result<(), WatchError> {
    let mut debouncer = match start_debouncer(paths, notify_window, event_tx, filter) {
        Ok(debouncer) => debouncer,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return Ok(());
        }
    };

    tracing::info!(directories = paths.len(), "file watcher started");
    let _ = ready_tx.send(Ok(()));

    let _ = shutdown_rx.blocking_recv();

    for path in paths {
        if let Err(e) = debouncer.watcher().unwatch(path.as_std_path()) {
            tracing::debug!(path = %path, error = %e, "unwatch failed");
        }
    }
    tracing::info!("file watcher stopped");
    Ok(())
}

fn start_debouncer<F: FileFilter>(
    paths: &[Utf8PathBuf],
    notify_window: Duration,
    tx: mpsc::Sender<FileEvent>,
    filter: F,
) -> Result<Debouncer<notify::RecommendedWatcher>, WatchError> {
    let mut debouncer = new_debouncer(notify_window, move |res: DebounceEventResult| match res {
        Ok(events) => {
            for event in events {
                let path = match Utf8PathBuf::try_from(event.path) {
                    Ok(p) => p,
                    Err(e) => {
                        let invalid_path = e.into_path_buf();
                        tracing::warn!(
                            path = %invalid_path.display(),
                            "skipping non-UTF-8 path in file event"
                        );
                        continue;
                    }
                };

                if !filter.should_process(&path) {
                    tracing::trace!(path = %path, "filtered out file event");
                    continue;
                }

                if tx.blocking_send(FileEvent::new(path)).is_err() {
                    tracing::debug!("event channel closed, dropping file events");
                    break;
                }
            }
        }
        Err(error) => tracing::warn!(error = %error, "notify error"),
    })?;

    for path in paths {
        debouncer
            .watcher()
            .watch(path.as_std_path(), RecursiveMode::Recursive)?;
        tracing::debug!(path = %path, "watching directory");
    }

    Ok(debouncer)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;
    use crate::filter::{AcceptAllFilter, GlobFilter};

    fn temp_root() -> (TempDir, Utf8PathBuf) {
        let dir = TempDir::new().expect("tempdir");
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).expect("utf8");
        (dir, root)
    }

    #[test]
    fn test_existing_directories_skips_missing_and_duplicates() {
        let (_dir, root) = temp_root();
        let dirs = [root.clone(), root.join("missing"), root.clone()];
        let existing = existing_directories(&dirs);
        assert_eq!(existing.len(), 1);
        assert!(existing[0].is_absolute());
    }

    #[tokio::test]
    async fn test_watcher_creation() {
        let (_dir, root) = temp_root();
        let watcher = FileWatcher::new(&[root], AcceptAllFilter)
            .await
            .expect("watcher");
        assert!(watcher.is_running());
        assert_eq!(watcher.watch_paths().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_directories_are_tolerated() {
        let (_dir, root) = temp_root();
        let watcher = FileWatcher::new(&[root.join("nope"), root.clone()], AcceptAllFilter)
            .await
            .expect("watcher");

        assert_eq!(watcher.watch_paths().len(), 1);
        let canonical = root.canonicalize_utf8().expect("canonical");
        assert!(watcher.is_watching(&canonical.join("x.py")));
        watcher.shutdown().await.expect("shutdown");
    }

    #[tokio::test]
    async fn test_no_directories_still_starts() {
        let watcher = FileWatcher::new(&[Utf8PathBuf::from("/definitely/missing")], AcceptAllFilter)
            .await
            .expect("watcher");
        assert!(watcher.watch_paths().is_empty());
        watcher.shutdown().await.expect("shutdown");
    }

    #[tokio::test]
    async fn test_watcher_receives_filtered_events() {
        let (_dir, root) = temp_root();
        let filter = GlobFilter::new(&["*.py"], &[]).expect("filter");
        let mut watcher = FileWatcher::with_options(
            &[root.clone()],
            filter,
            Duration::from_millis(50),
            16,
        )
        .await
        .expect("watcher");

        fs::write(root.join("notes.txt"), "ignored").expect("write");
        fs::write(root.join("ping.py"), "x = 1\n").expect("write");

        let event = tokio::time::timeout(Duration::from_secs(2), watcher.recv()).await;
        watcher.shutdown().await.expect("shutdown");

        // Timing dependent on some CI filesystems.
        if let Ok(Some(event)) = event {
            assert!(event.path.as_str().ends_with("ping.py"));
        }
    }
}
