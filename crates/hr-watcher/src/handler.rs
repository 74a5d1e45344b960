//! From file event to scheduled reload.
//!
//! [`ChangeHandler`] runs every event through the same pipeline, cheapest
//! checks first:
//!
//! ```text
//! FileEvent
//!   │ filter (globs)            ──► Filtered
//!   │ content digest            ──► Unchanged
//!   │ parse; syntax check       ──► InvalidSyntax (warn, cancel pending)
//!   │ class signatures (log)
//!   │ graph edges refreshed
//!   │ resolve to extension      ──► NotReloadable
//!   ▼
//! Debouncer::schedule(extension)  ──► Scheduled
//! ```
//!
//! Removed files are forgotten by every tracker and dropped from the graph.
//! They never schedule anything, and a timer still pending for them is
//! cancelled.

use std::fs;
use std::sync::Arc;

use camino::Utf8Path;
use hr_core::{ExtensionId, FxHashSet, HotReloadConfig};
use hr_py_parser::{PyParser, SyntaxIssue};
use hr_tracker::{
    ClassDefinitionTracker, DependencyGraph, ExtensionResolver, FileHashTracker, digest_bytes,
    package_of,
};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::debounce::Debouncer;
use crate::error::WatchError;
use crate::events::{FileEvent, FileEventKind};
use crate::filter::FileFilter;
use crate::watcher::FileWatcher;

/// Change-detection state shared by the handler and its owner.
#[derive(Debug)]
pub struct Trackers {
    /// Content digests per file.
    pub hashes: FileHashTracker,
    /// Class fingerprints per file.
    pub classes: ClassDefinitionTracker,
    /// Module import graph.
    pub graph: DependencyGraph,
}

impl Trackers {
    /// Creates empty hash and class trackers around `graph`.
    #[must_use]
    pub fn new(graph: DependencyGraph) -> Self {
        Self {
            hashes: FileHashTracker::new(),
            classes: ClassDefinitionTracker::new(),
            graph,
        }
    }

    /// Forgets everything, including the graph's import cache.
    pub fn clear(&mut self) {
        self.hashes.clear();
        self.classes.clear();
        self.graph.clear();
    }
}

/// [`Trackers`] behind a lock. Never held across an `.await`.
pub type SharedTrackers = Arc<Mutex<Trackers>>;

/// What the handler did with one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleOutcome {
    /// Rejected by the include/ignore globs.
    Filtered,
    /// Contents identical to the last observation, or unreadable.
    Unchanged,
    /// The file does not parse; the reload was suppressed.
    InvalidSyntax(SyntaxIssue),
    /// The file maps to no loadable extension.
    NotReloadable,
    /// A debounced reload of this extension is pending.
    Scheduled(ExtensionId),
    /// The file was deleted and forgotten.
    Removed,
}

/// Turns file events into debounced reload requests.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// use futures_util::FutureExt;
/// use hr_core::ExtensionId;
/// use hr_tracker::{DependencyGraph, ExtensionResolver};
/// use hr_watcher::{AcceptAllFilter, ChangeHandler, Debouncer, FileEvent, HandleOutcome, Trackers};
/// use parking_lot::Mutex;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// # let dir = tempfile::tempdir()?;
/// # let base = camino::Utf8Path::from_path(dir.path()).ok_or("utf8")?;
/// let path = base.join("ping.py");
/// std::fs::write(&path, "async def setup(bot):\n    pass\n")?;
///
/// let debouncer = Arc::new(Debouncer::new(Duration::from_millis(10), |_ext: ExtensionId| {
///     async {}.boxed()
/// }));
/// let trackers = Arc::new(Mutex::new(Trackers::new(DependencyGraph::new(base))));
/// let mut handler = ChangeHandler::new(
///     Arc::new(AcceptAllFilter),
///     ExtensionResolver::new(base),
///     trackers,
///     debouncer,
/// );
///
/// assert_eq!(
///     handler.handle(&FileEvent::changed(path)),
///     HandleOutcome::Scheduled(ExtensionId::new("ping")),
/// );
/// # Ok(())
/// # }
/// ```
pub struct ChangeHandler {
    filter: Arc<dyn FileFilter>,
    resolver: ExtensionResolver,
    trackers: SharedTrackers,
    debouncer: Arc<Debouncer<ExtensionId>>,
    parser: Option<PyParser>,
    syntax_checking: bool,
    class_tracking: bool,
    track_dependencies: bool,
}

impl ChangeHandler {
    /// Creates a handler with syntax checking, class tracking, and
    /// dependency tracking enabled.
    #[must_use]
    pub fn new(
        filter: Arc<dyn FileFilter>,
        resolver: ExtensionResolver,
        trackers: SharedTrackers,
        debouncer: Arc<Debouncer<ExtensionId>>,
    ) -> Self {
        Self {
            filter,
            resolver,
            trackers,
            debouncer,
            parser: None,
            syntax_checking: true,
            class_tracking: true,
            track_dependencies: true,
        }
    }

    /// Applies the feature switches from `config`.
    #[must_use]
    pub fn configured(self, config: &HotReloadConfig) -> Self {
        self.with_syntax_checking(config.syntax_checking())
            .with_class_tracking(config.class_tracking())
            .with_dependency_tracking(config.track_dependencies())
    }

    /// Enables or disables suppressing reloads of unparseable files.
    #[must_use]
    pub const fn with_syntax_checking(mut self, enabled: bool) -> Self {
        self.syntax_checking = enabled;
        self
    }

    /// Enables or disables logging class signature changes.
    #[must_use]
    pub const fn with_class_tracking(mut self, enabled: bool) -> Self {
        self.class_tracking = enabled;
        self
    }

    /// Enables or disables keeping the dependency graph current.
    #[must_use]
    pub const fn with_dependency_tracking(mut self, enabled: bool) -> Self {
        self.track_dependencies = enabled;
        self
    }

    /// Processes one event.
    pub fn handle(&mut self, event: &FileEvent) -> HandleOutcome {
        let path = event.path();
        if !self.filter.should_process(path) {
            tracing::trace!(path = %path, "event filtered");
            return HandleOutcome::Filtered;
        }

        match event.kind {
            FileEventKind::Removed => self.handle_removed(path),
            FileEventKind::Changed => self.handle_changed(path),
        }
    }

    fn handle_changed(&mut self, path: &Utf8Path) -> HandleOutcome {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::debug!(path = %path, error = %e, "changed file is unreadable");
                return HandleOutcome::Unchanged;
            }
        };
        if !self.trackers.lock().hashes.update(path, digest_bytes(&bytes)) {
            tracing::trace!(path = %path, "contents unchanged");
            return HandleOutcome::Unchanged;
        }

        let source = String::from_utf8_lossy(&bytes);
        if let Some(outcome) = self.analyze(path, &source) {
            self.cancel_pending(path);
            return outcome;
        }

        let Some(extension) = self.resolver.to_extension(path) else {
            tracing::debug!(path = %path, "change is not reload-relevant");
            return HandleOutcome::NotReloadable;
        };

        let restarted = self.debouncer.schedule(extension.clone());
        tracing::debug!(
            path = %path,
            extension = %extension,
            restarted,
            "reload scheduled"
        );
        HandleOutcome::Scheduled(extension)
    }

    /// Parses the file once for the syntax check, class tracking, and the
    /// graph. Returns an outcome only when the reload must be suppressed.
    fn analyze(&mut self, path: &Utf8Path, source: &str) -> Option<HandleOutcome> {
        if !(self.syntax_checking || self.class_tracking || self.track_dependencies) {
            return None;
        }
        let parser = self.parser()?;
        let result = match parser.parse(source) {
            Ok(result) => result,
            Err(e) => {
                tracing::debug!(path = %path, error = %e, "parse failed, skipping analysis");
                return None;
            }
        };

        if self.syntax_checking {
            if let Some(issue) = result.syntax_issue {
                tracing::warn!(
                    path = %path,
                    line = issue.line,
                    column = issue.column,
                    "syntax error, reload suppressed"
                );
                return Some(HandleOutcome::InvalidSyntax(issue));
            }
        }

        let base_dir = self.resolver.base_dir().to_owned();
        let module = self.resolver.module_of(path);
        let dependencies: FxHashSet<String> = if self.track_dependencies {
            result
                .dependency_names(package_of(path, &base_dir).as_deref())
                .into_iter()
                .collect()
        } else {
            FxHashSet::default()
        };

        let mut trackers = self.trackers.lock();
        if self.class_tracking {
            let changed = trackers.classes.observe(path, result.classes);
            if !changed.is_empty() {
                tracing::debug!(path = %path, classes = ?changed, "class signatures changed");
            }
        }
        if self.track_dependencies {
            if let Some(module) = module {
                trackers
                    .graph
                    .set_dependencies(module.as_str(), &dependencies);
                tracing::trace!(module = %module, imports = dependencies.len(), "graph edges refreshed");
            }
            trackers.graph.cache_imports(path, dependencies);
        }
        None
    }

    fn handle_removed(&self, path: &Utf8Path) -> HandleOutcome {
        self.cancel_pending(path);
        let mut trackers = self.trackers.lock();
        trackers.hashes.forget(path);
        trackers.classes.forget(path);
        trackers.graph.invalidate(path);
        if let Some(module) = self.resolver.module_of(path) {
            trackers.graph.remove_module(module.as_str());
            tracing::info!(path = %path, module = %module, "file removed, not reloading");
        }
        HandleOutcome::Removed
    }

    /// Drops timers that would reload `path` as it is now on disk.
    fn cancel_pending(&self, path: &Utf8Path) {
        for extension in self.resolver.candidates_for(path) {
            if self.debouncer.cancel(&extension) {
                tracing::debug!(path = %path, extension = %extension, "pending reload cancelled");
            }
        }
    }

    fn parser(&mut self) -> Option<&mut PyParser> {
        if self.parser.is_none() {
            match PyParser::new() {
                Ok(parser) => self.parser = Some(parser),
                Err(e) => {
                    tracing::warn!(error = %e, "python parser unavailable");
                    return None;
                }
            }
        }
        self.parser.as_mut()
    }

    /// Feeds events from `watcher` through [`handle`](Self::handle) until
    /// `cancel` fires or the watcher stops, then shuts the watcher down.
    ///
    /// # Errors
    ///
    /// Returns the watcher's shutdown error.
    pub async fn run(
        mut self,
        mut watcher: FileWatcher,
        cancel: CancellationToken,
    ) -> Result<(), WatchError> {
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                event = watcher.recv() => match event {
                    Some(event) => {
                        self.handle(&event);
                    }
                    None => {
                        tracing::debug!("watcher channel closed");
                        break;
                    }
                },
            }
        }
        watcher.shutdown().await
    }
}

impl std::fmt::Debug for ChangeHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeHandler")
            .field("resolver", &self.resolver)
            .field("syntax_checking", &self.syntax_checking)
            .field("class_tracking", &self.class_tracking)
            .field("track_dependencies", &self.track_dependencies)
            .finish_non_exhaustive()
    }
}
