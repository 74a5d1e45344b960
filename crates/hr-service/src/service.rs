//! The hot-reload service.
//!
//! [`HotReloadService`] owns the trackers, the debouncer, and the watch
//! session, and is the only component that calls into the
//! [`ExtensionHost`].
//!
//! # Concurrency
//!
//! - Every host call that mutates the extension table runs under one async
//!   reload lock, so reloads never overlap.
//! - Statistics and per-extension states sit behind short synchronous locks
//!   that are never held across an `.await`.
//! - The debounce callback holds only a weak reference, so dropping the last
//!   service handle tears everything down.

use std::collections::BTreeMap;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use camino::Utf8PathBuf;
use futures_util::FutureExt;
use hr_core::{ExtensionId, FxHashMap, FxHashSet, HotReloadConfig, HotReloadSettings, ReloadState};
use hr_tracker::{
    DependencyGraph, ExtensionResolver, FileWalker, GraphSnapshot, LoadableUnitProbe,
    ModuleAnalyzer, PrimeSummary, SetupFunctionProbe,
};
use hr_watcher::{
    ChangeHandler, Debouncer, FileFilter, FileWatcher, GlobFilter, SharedTrackers, Trackers,
    WatchError, existing_directories,
};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::ServiceError;
use crate::host::{ExtensionHost, HostError};
use crate::stats::{ReloadStatistics, StatsSnapshot};

/// Reloads slower than this are logged as warnings when performance
/// monitoring is on.
pub const SLOW_RELOAD_THRESHOLD: Duration = Duration::from_secs(1);

/// What a successful attempt did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReloadAction {
    Loaded,
    Reloaded,
}

impl ReloadAction {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Loaded => "loaded",
            Self::Reloaded => "reloaded",
        }
    }
}

/// A point-in-time view of the service.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    /// Whether hot reloading is enabled.
    pub enabled: bool,
    /// Whether a watch session is running.
    pub watching: bool,
    /// Reload counters.
    pub stats: StatsSnapshot,
    /// Extensions that are pending or reloading. Idle ones are omitted.
    pub extensions: BTreeMap<String, ReloadState>,
    /// Extensions the host reports as loaded.
    pub loaded: Vec<String>,
    /// Modules with at least one dependency edge.
    pub tracked_modules: usize,
    /// Import edges in the dependency graph.
    pub dependency_edges: usize,
}

struct WatchSession {
    cancel: CancellationToken,
    task: JoinHandle<Result<(), WatchError>>,
}

struct ServiceInner {
    config: HotReloadConfig,
    host: Arc<dyn ExtensionHost>,
    resolver: ExtensionResolver,
    trackers: SharedTrackers,
    debouncer: Arc<Debouncer<ExtensionId>>,
    reload_lock: tokio::sync::Mutex<()>,
    stats: Mutex<ReloadStatistics>,
    states: Mutex<FxHashMap<ExtensionId, ReloadState>>,
    session: tokio::sync::Mutex<Option<WatchSession>>,
    enabled: AtomicBool,
    watching: AtomicBool,
}

/// Watches extension sources and keeps the host's loaded extensions in
/// sync with them.
///
/// Cloning is cheap; clones share one service.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
///
/// use hr_core::{ExtensionId, HotReloadSettings};
/// use hr_service::{ExtensionHost, HotReloadService};
///
/// # async fn demo(host: Arc<dyn ExtensionHost>) -> Result<(), hr_service::ServiceError> {
/// let service = HotReloadService::from_settings(HotReloadSettings::default(), host)?;
/// service.start().await?;
///
/// service.manual_reload(&ExtensionId::new("cogs.ping")).await?;
/// println!("{}", service.status().stats);
///
/// service.stop().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct HotReloadService {
    inner: Arc<ServiceInner>,
}

impl HotReloadService {
    /// Creates a stopped service that treats modules defining `setup` as
    /// extensions.
    #[must_use]
    pub fn new(config: HotReloadConfig, host: Arc<dyn ExtensionHost>) -> Self {
        Self::with_probe(config, host, Arc::new(SetupFunctionProbe))
    }

    /// Creates a stopped service with a custom loadability rule.
    #[must_use]
    pub fn with_probe(
        config: HotReloadConfig,
        host: Arc<dyn ExtensionHost>,
        probe: Arc<dyn LoadableUnitProbe>,
    ) -> Self {
        let base_dir = config
            .base_dir()
            .canonicalize_utf8()
            .unwrap_or_else(|_| config.base_dir().to_owned());
        let cache_size =
            NonZeroUsize::new(config.dependency_cache_size()).unwrap_or(NonZeroUsize::MIN);
        let graph =
            DependencyGraph::with_limits(base_dir.clone(), cache_size, config.max_dependency_depth());
        let resolver = ExtensionResolver::with_shared_probe(base_dir, probe);

        let inner = Arc::new_cyclic(|weak: &Weak<ServiceInner>| {
            let weak = Weak::clone(weak);
            let debouncer = Debouncer::new(config.debounce_delay(), move |extension: ExtensionId| {
                let weak = Weak::clone(&weak);
                async move {
                    let Some(inner) = weak.upgrade() else {
                        return;
                    };
                    if let Err(e) = inner.reload_with_dependents(&extension).await {
                        tracing::error!(extension = %extension, error = %e, "debounced reload failed");
                    }
                }
                .boxed()
            });

            ServiceInner {
                enabled: AtomicBool::new(config.enabled()),
                config,
                host,
                resolver,
                trackers: Arc::new(Mutex::new(Trackers::new(graph))),
                debouncer: Arc::new(debouncer),
                reload_lock: tokio::sync::Mutex::new(()),
                stats: Mutex::new(ReloadStatistics::new()),
                states: Mutex::new(FxHashMap::default()),
                session: tokio::sync::Mutex::new(None),
                watching: AtomicBool::new(false),
            }
        });

        Self { inner }
    }

    /// Validates `settings` and creates a stopped service.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Config`] if the settings are invalid.
    pub fn from_settings(
        settings: HotReloadSettings,
        host: Arc<dyn ExtensionHost>,
    ) -> Result<Self, ServiceError> {
        Ok(Self::new(settings.validate()?, host))
    }

    /// Returns the validated configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &HotReloadConfig {
        &self.inner.config
    }

    /// Returns `true` if hot reloading is enabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    /// Returns `true` while a watch session is running.
    #[must_use]
    pub fn is_watching(&self) -> bool {
        self.inner.watching.load(Ordering::SeqCst)
    }

    /// Primes the trackers from disk and starts watching.
    ///
    /// Does nothing if the service is disabled or already watching.
    /// Missing watch directories are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Watch`] if the OS watcher cannot be created
    /// or a pattern does not compile.
    pub async fn start(&self) -> Result<(), ServiceError> {
        let mut session = self.inner.session.lock().await;
        if session.is_some() {
            tracing::warn!("hot reload already running");
            return Ok(());
        }
        if !self.is_enabled() {
            tracing::info!("hot reload disabled, not starting");
            return Ok(());
        }

        let dirs = existing_directories(self.inner.config.watch_directories());
        let summary = self.prime_directories(&dirs).await;
        tracing::debug!(
            files = summary.files,
            errors = summary.errors,
            invalid = summary.invalid,
            "trackers primed"
        );

        let filter = Arc::new(GlobFilter::from_config(&self.inner.config)?.with_roots(dirs.clone()));
        let watcher = FileWatcher::new(&dirs, Arc::clone(&filter)).await?;

        let handler = ChangeHandler::new(
            filter,
            self.inner.resolver.clone(),
            Arc::clone(&self.inner.trackers),
            Arc::clone(&self.inner.debouncer),
        )
        .configured(&self.inner.config);

        let cancel = CancellationToken::new();
        let task = tokio::spawn(handler.run(watcher, cancel.clone()));
        *session = Some(WatchSession { cancel, task });
        self.inner.watching.store(true, Ordering::SeqCst);

        tracing::info!(
            directories = dirs.len(),
            debounce_ms = u64::try_from(self.inner.config.debounce_delay().as_millis())
                .unwrap_or(u64::MAX),
            "hot reload started"
        );
        Ok(())
    }

    /// Stops watching, cancels pending reloads, and clears the trackers.
    ///
    /// Statistics are kept. Calling `stop` when nothing runs is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Watch`] if the watcher failed to shut down
    /// cleanly. The service is stopped either way.
    pub async fn stop(&self) -> Result<(), ServiceError> {
        let Some(session) = self.inner.session.lock().await.take() else {
            return Ok(());
        };

        session.cancel.cancel();
        let result = match session.task.await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(error = %e, "watch task did not finish cleanly");
                Ok(())
            }
        };

        let cancelled = self.inner.debouncer.cancel_all();
        self.inner.trackers.lock().clear();
        self.inner.states.lock().clear();
        self.inner.watching.store(false, Ordering::SeqCst);

        tracing::info!(cancelled, "hot reload stopped");
        result.map_err(ServiceError::from)
    }

    /// Enables hot reloading and starts watching.
    ///
    /// # Errors
    ///
    /// See [`start`](Self::start).
    pub async fn enable(&self) -> Result<(), ServiceError> {
        self.inner.enabled.store(true, Ordering::SeqCst);
        tracing::info!("hot reload enabled");
        self.start().await
    }

    /// Disables hot reloading and stops watching.
    ///
    /// # Errors
    ///
    /// See [`stop`](Self::stop).
    pub async fn disable(&self) -> Result<(), ServiceError> {
        self.inner.enabled.store(false, Ordering::SeqCst);
        tracing::info!("hot reload disabled");
        self.stop().await
    }

    /// Seeds hashes, class records, and the dependency graph from every
    /// matching file in the watch directories.
    pub async fn prime(&self) -> PrimeSummary {
        let dirs = existing_directories(self.inner.config.watch_directories());
        self.prime_directories(&dirs).await
    }

    async fn prime_directories(&self, dirs: &[Utf8PathBuf]) -> PrimeSummary {
        let filter = match GlobFilter::from_config(&self.inner.config) {
            Ok(filter) => filter.with_roots(dirs.iter().cloned()),
            Err(e) => {
                tracing::warn!(error = %e, "cannot build file filter, skipping priming");
                return PrimeSummary::default();
            }
        };
        let base_dir = self.inner.resolver.base_dir().to_owned();
        let roots = dirs.to_vec();

        let analyzed = tokio::task::spawn_blocking(move || {
            let mut paths: Vec<Utf8PathBuf> = Vec::new();
            for root in &roots {
                match FileWalker::new(root).and_then(|walker| walker.collect_paths()) {
                    Ok(found) => {
                        paths.extend(found.into_iter().filter(|p| filter.should_process(p)));
                    }
                    Err(e) => tracing::warn!(path = %root, error = %e, "priming walk failed"),
                }
            }
            paths.sort_unstable();
            paths.dedup();
            ModuleAnalyzer::new(base_dir).analyze_files(&paths)
        })
        .await;

        let results = match analyzed {
            Ok(results) => results,
            Err(e) => {
                tracing::warn!(error = %e, "priming task failed");
                return PrimeSummary::default();
            }
        };

        let mut trackers = self.inner.trackers.lock();
        let Trackers {
            hashes,
            classes,
            graph,
        } = &mut *trackers;
        let class_tracker = self.inner.config.class_tracking().then_some(classes);
        let summary = ModuleAnalyzer::apply(results, graph, hashes, class_tracker);
        tracing::info!(
            files = summary.files,
            modules = graph.module_count(),
            edges = graph.edge_count(),
            "dependency graph primed"
        );
        summary
    }

    /// Schedules a debounced reload of `extension`.
    ///
    /// Returns `true` if an already pending reload was pushed back.
    pub fn request_reload(&self, extension: ExtensionId) -> bool {
        self.inner.debouncer.schedule(extension)
    }

    /// Reloads `extension` now, then its loaded dependents.
    ///
    /// A pending debounced reload of the extension is cancelled first.
    /// Returns `Ok(false)` if the reload failed and `continue_on_error` is
    /// on. Dependents are only reloaded after a successful reload.
    ///
    /// # Errors
    ///
    /// With `continue_on_error` off, returns the first
    /// [`ServiceError::ModuleReload`] or [`ServiceError::Timeout`].
    pub async fn manual_reload(&self, extension: &ExtensionId) -> Result<bool, ServiceError> {
        if self.inner.debouncer.cancel(extension) {
            tracing::debug!(extension = %extension, "pending reload superseded by manual reload");
        }
        self.inner.reload_with_dependents(extension).await
    }

    /// Loads or reloads exactly `extension`, with retries and timeout.
    ///
    /// # Errors
    ///
    /// See [`manual_reload`](Self::manual_reload).
    pub async fn perform_reload(&self, extension: &ExtensionId) -> Result<bool, ServiceError> {
        let _guard = self.inner.reload_lock.lock().await;
        self.inner.reload_locked(extension).await
    }

    /// Unloads `extension` and cancels any pending reload of it.
    ///
    /// # Errors
    ///
    /// With `continue_on_error` off, returns the host's failure.
    pub async fn unload(&self, extension: &ExtensionId) -> Result<bool, ServiceError> {
        self.inner.debouncer.cancel(extension);
        let _guard = self.inner.reload_lock.lock().await;

        let result = self
            .inner
            .bounded(extension, self.inner.host.unload(extension))
            .await;

        match result {
            Ok(()) => {
                self.inner.states.lock().remove(extension);
                tracing::info!(extension = %extension, "extension unloaded");
                Ok(true)
            }
            Err(e) => {
                tracing::error!(extension = %extension, error = %e, "unload failed");
                self.inner.fail_or_continue(e)
            }
        }
    }

    /// Returns the state of one extension.
    #[must_use]
    pub fn state_of(&self, extension: &ExtensionId) -> ReloadState {
        let recorded = self.inner.states.lock().get(extension).copied();
        match recorded {
            Some(state) if state.is_busy() => state,
            _ if self.inner.debouncer.is_pending(extension) => ReloadState::Pending,
            _ => ReloadState::Idle,
        }
    }

    /// Returns a copy of the reload counters.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.lock().snapshot()
    }

    /// Clears the reload counters.
    pub fn reset_stats(&self) {
        self.inner.stats.lock().reset();
    }

    /// Returns a snapshot of the dependency graph.
    #[must_use]
    pub fn dependency_snapshot(&self) -> GraphSnapshot {
        self.inner.trackers.lock().graph.snapshot()
    }

    /// Returns a point-in-time view of the service.
    #[must_use]
    pub fn status(&self) -> ServiceStatus {
        let mut extensions: BTreeMap<String, ReloadState> = self
            .inner
            .debouncer
            .pending_keys()
            .into_iter()
            .map(|ext| (ext.as_str().to_owned(), ReloadState::Pending))
            .collect();
        for (ext, state) in self.inner.states.lock().iter() {
            if state.is_busy() {
                extensions.insert(ext.as_str().to_owned(), *state);
            }
        }

        let mut loaded: Vec<String> = self
            .inner
            .host
            .loaded_extensions()
            .into_iter()
            .map(|ext| ext.as_str().to_owned())
            .collect();
        loaded.sort_unstable();

        let (tracked_modules, dependency_edges) = {
            let trackers = self.inner.trackers.lock();
            (trackers.graph.module_count(), trackers.graph.edge_count())
        };

        ServiceStatus {
            enabled: self.is_enabled(),
            watching: self.is_watching(),
            stats: self.stats(),
            extensions,
            loaded,
            tracked_modules,
            dependency_edges,
        }
    }
}

impl std::fmt::Debug for HotReloadService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HotReloadService")
            .field("enabled", &self.is_enabled())
            .field("watching", &self.is_watching())
            .field("base_dir", &self.inner.resolver.base_dir())
            .finish_non_exhaustive()
    }
}

impl ServiceInner {
    async fn reload_with_dependents(&self, extension: &ExtensionId) -> Result<bool, ServiceError> {
        let _guard = self.reload_lock.lock().await;
        if !self.reload_locked(extension).await? {
            return Ok(false);
        }

        if self.config.track_dependencies() {
            for dependent in self.dependents_to_reload(extension) {
                tracing::info!(
                    extension = %dependent,
                    trigger = %extension,
                    "reloading dependent extension"
                );
                self.reload_locked(&dependent).await?;
            }
        }
        Ok(true)
    }

    /// Loaded extensions owning a module that transitively imports
    /// `extension`, in dependency order.
    fn dependents_to_reload(&self, extension: &ExtensionId) -> Vec<ExtensionId> {
        let loaded = self.host.loaded_extensions();
        if loaded.is_empty() {
            return Vec::new();
        }

        let trackers = self.trackers.lock();
        let graph = &trackers.graph;
        let owners: FxHashSet<&str> = graph
            .transitive_dependents(extension.as_str(), self.config.max_dependency_depth())
            .iter()
            .filter_map(|module| owning_extension(module, &loaded))
            .filter(|owner| *owner != extension)
            .map(ExtensionId::as_str)
            .collect();

        graph
            .reload_order(owners)
            .into_iter()
            .map(ExtensionId::new)
            .collect()
    }

    /// Runs one reload with retries. The caller holds the reload lock.
    async fn reload_locked(&self, extension: &ExtensionId) -> Result<bool, ServiceError> {
        self.states
            .lock()
            .insert(extension.clone(), ReloadState::Reloading);
        let started = Instant::now();
        let outcome = self.attempt_with_retries(extension).await;
        let elapsed = started.elapsed();
        self.states.lock().insert(extension.clone(), ReloadState::Idle);

        match outcome {
            Ok(action) => {
                self.stats.lock().record_success(extension, elapsed);
                self.log_success(extension, action, elapsed);
                Ok(true)
            }
            Err(e) => {
                self.stats
                    .lock()
                    .record_failure(extension, elapsed, &e.to_string());
                tracing::error!(extension = %extension, error = %e, "reload failed");
                self.fail_or_continue(e)
            }
        }
    }

    fn log_success(&self, extension: &ExtensionId, action: ReloadAction, elapsed: Duration) {
        if !self.config.performance_monitoring() {
            tracing::info!(extension = %extension, action = action.as_str(), "extension reloaded");
            return;
        }
        let duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        tracing::info!(
            extension = %extension,
            action = action.as_str(),
            duration_ms,
            "extension reloaded"
        );
        if elapsed > SLOW_RELOAD_THRESHOLD {
            tracing::warn!(extension = %extension, duration_ms, "slow reload");
        }
    }

    async fn attempt_with_retries(
        &self,
        extension: &ExtensionId,
    ) -> Result<ReloadAction, ServiceError> {
        let max_attempts = self.config.max_reload_attempts();
        let mut attempt = 1;
        loop {
            match self.attempt(extension).await {
                Ok(action) => return Ok(action),
                Err(e) if attempt < max_attempts => {
                    tracing::warn!(
                        extension = %extension,
                        attempt,
                        max_attempts,
                        error = %e,
                        "reload attempt failed, retrying"
                    );
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn attempt(&self, extension: &ExtensionId) -> Result<ReloadAction, ServiceError> {
        self.bounded(extension, self.host_attempt(extension)).await
    }

    /// Load if absent, else reload, falling back to load when the host lost
    /// the extension. The fallback shares the attempt's timeout.
    async fn host_attempt(&self, extension: &ExtensionId) -> Result<ReloadAction, HostError> {
        if !self.host.is_loaded(extension) {
            self.host.load(extension).await?;
            return Ok(ReloadAction::Loaded);
        }

        match self.host.reload(extension).await {
            Ok(()) => Ok(ReloadAction::Reloaded),
            Err(HostError::NotLoaded(_)) => {
                tracing::debug!(extension = %extension, "host no longer has extension, loading");
                self.host.load(extension).await?;
                Ok(ReloadAction::Loaded)
            }
            Err(e) => Err(e),
        }
    }

    /// Runs host work under the reload timeout.
    async fn bounded<T, F>(&self, extension: &ExtensionId, call: F) -> Result<T, ServiceError>
    where
        F: Future<Output = Result<T, HostError>>,
    {
        let timeout = self.config.reload_timeout();
        match tokio::time::timeout(timeout, call).await {
            Ok(result) => result.map_err(|e| ServiceError::module_reload(extension, e.to_string())),
            Err(_) => Err(ServiceError::Timeout {
                extension: extension.clone(),
                timeout,
            }),
        }
    }

    fn fail_or_continue(&self, error: ServiceError) -> Result<bool, ServiceError> {
        if self.config.continue_on_error() {
            Ok(false)
        } else {
            Err(error)
        }
    }
}

impl Drop for ServiceInner {
    fn drop(&mut self) {
        if let Ok(mut session) = self.session.try_lock() {
            if let Some(session) = session.take() {
                session.cancel.cancel();
            }
        }
    }
}

/// The loaded extension that owns `module`: the extension itself or the
/// innermost loaded package containing it.
fn owning_extension<'a>(module: &str, loaded: &'a [ExtensionId]) -> Option<&'a ExtensionId> {
    loaded
        .iter()
        .filter(|ext| {
            let name = ext.as_str();
            module == name
                || module
                    .strip_prefix(name)
                    .is_some_and(|rest| rest.starts_with('.'))
        })
        .max_by_key(|ext| ext.as_str().len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ext(name: &str) -> ExtensionId {
        ExtensionId::new(name)
    }

    #[test]
    fn test_owning_extension_rules() {
        let loaded = vec![ext("cogs.fun"), ext("cogs.fun.games"), ext("cogs.ping")];

        assert_eq!(owning_extension("cogs.ping", &loaded), Some(&ext("cogs.ping")));
        assert_eq!(owning_extension("cogs.fun.dice", &loaded), Some(&ext("cogs.fun")));
        assert_eq!(
            owning_extension("cogs.fun.games.chess", &loaded),
            Some(&ext("cogs.fun.games"))
        );
        assert_eq!(owning_extension("cogs.pingpong", &loaded), None);
        assert_eq!(owning_extension("utils.db", &loaded), None);
    }

    #[test]
    fn test_reload_action_labels() {
        assert_eq!(ReloadAction::Loaded.as_str(), "loaded");
        assert_eq!(ReloadAction::Reloaded.as_str(), "reloaded");
    }
}
