//! End-to-end behavior of `HotReloadService` against an in-memory host.

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use camino::Utf8Path;
use hr_core::{ExtensionId, FxHashMap, FxHashSet, HotReloadSettings, ReloadState};
use hr_service::{ExtensionHost, HostError, HotReloadService, ServiceError};
use parking_lot::Mutex;

#[derive(Default)]
struct MockHost {
    loaded: Mutex<FxHashSet<ExtensionId>>,
    stale: Mutex<FxHashSet<ExtensionId>>,
    failures: Mutex<FxHashMap<ExtensionId, u32>>,
    delay: Mutex<Option<Duration>>,
    calls: Mutex<Vec<String>>,
    timeline: Mutex<Vec<String>>,
}

impl MockHost {
    fn with_loaded(names: &[&str]) -> Arc<Self> {
        let host = Self::default();
        host.loaded
            .lock()
            .extend(names.iter().copied().map(ExtensionId::new));
        Arc::new(host)
    }

    fn fail_times(&self, name: &str, times: u32) {
        self.failures.lock().insert(ExtensionId::new(name), times);
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn timeline(&self) -> Vec<String> {
        self.timeline.lock().clone()
    }

    async fn record(&self, action: &str, extension: &ExtensionId) -> Result<(), HostError> {
        self.calls.lock().push(format!("{action}:{extension}"));
        self.timeline.lock().push(format!("start {action}:{extension}"));
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.timeline.lock().push(format!("end {action}:{extension}"));
        let fail = match self.failures.lock().get_mut(extension) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        };
        if fail {
            Err(HostError::failed("ImportError: boom"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ExtensionHost for MockHost {
    fn is_loaded(&self, extension: &ExtensionId) -> bool {
        self.loaded.lock().contains(extension) || self.stale.lock().contains(extension)
    }

    fn loaded_extensions(&self) -> Vec<ExtensionId> {
        self.loaded.lock().iter().cloned().collect()
    }

    async fn load(&self, extension: &ExtensionId) -> Result<(), HostError> {
        self.record("load", extension).await?;
        self.stale.lock().remove(extension);
        self.loaded.lock().insert(extension.clone());
        Ok(())
    }

    async fn reload(&self, extension: &ExtensionId) -> Result<(), HostError> {
        self.record("reload", extension).await?;
        if self.loaded.lock().contains(extension) {
            Ok(())
        } else {
            Err(HostError::NotLoaded(extension.clone()))
        }
    }

    async fn unload(&self, extension: &ExtensionId) -> Result<(), HostError> {
        self.record("unload", extension).await?;
        if self.loaded.lock().remove(extension) {
            Ok(())
        } else {
            Err(HostError::NotLoaded(extension.clone()))
        }
    }
}

fn ext(name: &str) -> ExtensionId {
    ExtensionId::new(name)
}

fn utf8(dir: &tempfile::TempDir) -> &Utf8Path {
    Utf8Path::from_path(dir.path()).expect("utf8 temp path")
}

fn service_with(
    base: &Utf8Path,
    host: &Arc<MockHost>,
    tweak: impl FnOnce(&mut HotReloadSettings),
) -> HotReloadService {
    let mut settings = HotReloadSettings {
        base_dir: base.to_owned(),
        watch_directories: vec![base.to_owned()],
        debounce_delay: 0.05,
        reload_timeout: 5.0,
        ..HotReloadSettings::default()
    };
    tweak(&mut settings);
    let host: Arc<dyn ExtensionHost> = Arc::clone(host) as Arc<dyn ExtensionHost>;
    HotReloadService::from_settings(settings, host).expect("valid settings")
}

fn write(base: &Utf8Path, relative: &str, contents: &str) {
    let path = base.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("mkdir");
    }
    fs::write(path, contents).expect("write");
}

const SETUP: &str = "async def setup(bot):\n    pass\n";

fn write_bot(base: &Utf8Path) {
    write(base, "utils/db.py", "def connect():\n    return None\n");
    write(base, "cogs/levels.py", &format!("import utils.db\n{SETUP}"));
    write(base, "cogs/alerts.py", &format!("from cogs import levels\n{SETUP}"));
    write(base, "cogs/ping.py", SETUP);
}

#[tokio::test]
async fn test_reload_loaded_and_load_unloaded() {
    let dir = tempfile::tempdir().expect("tempdir");
    let host = MockHost::with_loaded(&["cogs.ping"]);
    let service = service_with(utf8(&dir), &host, |_| {});

    assert!(service.manual_reload(&ext("cogs.ping")).await.expect("reload"));
    assert!(service.manual_reload(&ext("cogs.new")).await.expect("load"));

    assert_eq!(host.calls(), ["reload:cogs.ping", "load:cogs.new"]);
    assert!(host.is_loaded(&ext("cogs.new")));

    let stats = service.stats();
    assert_eq!(stats.total_reloads, 2);
    assert_eq!(stats.successful_reloads, 2);
    assert_eq!(stats.last_reload.as_deref(), Some("cogs.new"));
    assert_eq!(service.state_of(&ext("cogs.ping")), ReloadState::Idle);
}

#[tokio::test]
async fn test_stale_loaded_state_falls_back_to_load() {
    let dir = tempfile::tempdir().expect("tempdir");
    let host = MockHost::with_loaded(&[]);
    host.stale.lock().insert(ext("cogs.ghost"));
    let service = service_with(utf8(&dir), &host, |_| {});

    assert!(service.perform_reload(&ext("cogs.ghost")).await.expect("reload"));
    assert_eq!(host.calls(), ["reload:cogs.ghost", "load:cogs.ghost"]);
    assert_eq!(service.stats().successful_reloads, 1);
}

#[tokio::test]
async fn test_retries_until_success() {
    let dir = tempfile::tempdir().expect("tempdir");
    let host = MockHost::with_loaded(&["cogs.flaky"]);
    host.fail_times("cogs.flaky", 2);
    let service = service_with(utf8(&dir), &host, |s| s.max_reload_attempts = 3);

    assert!(service.perform_reload(&ext("cogs.flaky")).await.expect("reload"));
    assert_eq!(host.calls().len(), 3);

    let stats = service.stats();
    assert_eq!(stats.total_reloads, 1);
    assert_eq!(stats.successful_reloads, 1);
}

#[tokio::test]
async fn test_exhausted_retries_continue_on_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let host = MockHost::with_loaded(&["cogs.flaky"]);
    host.fail_times("cogs.flaky", 10);
    let service = service_with(utf8(&dir), &host, |s| s.max_reload_attempts = 2);

    let reloaded = service.perform_reload(&ext("cogs.flaky")).await.expect("no error");
    assert!(!reloaded);
    assert_eq!(host.calls().len(), 2);

    let stats = service.stats();
    assert_eq!(stats.total_reloads, 1);
    assert_eq!(stats.failed_reloads, 1);
    let last_error = stats.last_error.expect("last error");
    assert!(last_error.starts_with("cogs.flaky: "), "{last_error}");
    assert!(last_error.contains("ImportError"), "{last_error}");
}

#[tokio::test]
async fn test_failure_propagates_without_continue_on_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let host = MockHost::with_loaded(&["cogs.bad"]);
    host.fail_times("cogs.bad", 1);
    let service = service_with(utf8(&dir), &host, |s| {
        s.max_reload_attempts = 1;
        s.continue_on_error = false;
    });

    let err = service
        .perform_reload(&ext("cogs.bad"))
        .await
        .expect_err("should fail");
    assert!(matches!(err, ServiceError::ModuleReload { .. }));
    assert_eq!(err.extension(), Some(&ext("cogs.bad")));
    assert_eq!(service.stats().failed_reloads, 1);
}

#[tokio::test(start_paused = true)]
async fn test_host_call_timeout() {
    let dir = tempfile::tempdir().expect("tempdir");
    let host = MockHost::with_loaded(&["cogs.slow"]);
    *host.delay.lock() = Some(Duration::from_secs(10));
    let service = service_with(utf8(&dir), &host, |s| {
        s.reload_timeout = 1.0;
        s.max_reload_attempts = 1;
        s.continue_on_error = false;
    });

    let err = service
        .perform_reload(&ext("cogs.slow"))
        .await
        .expect_err("should time out");
    assert!(matches!(
        err,
        ServiceError::Timeout { timeout, .. } if timeout == Duration::from_secs(1)
    ));
    assert_eq!(service.stats().failed_reloads, 1);
}

#[tokio::test(start_paused = true)]
async fn test_fallback_load_shares_attempt_timeout() {
    let dir = tempfile::tempdir().expect("tempdir");
    let host = Arc::new(MockHost::default());
    host.stale.lock().insert(ext("cogs.stale"));
    *host.delay.lock() = Some(Duration::from_millis(600));
    let service = service_with(utf8(&dir), &host, |s| {
        s.reload_timeout = 1.0;
        s.max_reload_attempts = 1;
        s.continue_on_error = false;
    });

    let err = service
        .perform_reload(&ext("cogs.stale"))
        .await
        .expect_err("reload plus load exceeds one timeout");
    assert!(matches!(err, ServiceError::Timeout { .. }));
    assert_eq!(host.calls(), ["reload:cogs.stale", "load:cogs.stale"]);
}

#[tokio::test(start_paused = true)]
async fn test_reloads_never_overlap() {
    let dir = tempfile::tempdir().expect("tempdir");
    let host = MockHost::with_loaded(&["cogs.a", "cogs.b"]);
    *host.delay.lock() = Some(Duration::from_millis(100));
    let service = service_with(utf8(&dir), &host, |_| {});

    let ext_a = ext("cogs.a");
    let ext_b = ext("cogs.b");
    let (a, b) = tokio::join!(
        service.manual_reload(&ext_a),
        service.manual_reload(&ext_b)
    );
    assert!(a.expect("reload a"));
    assert!(b.expect("reload b"));

    let timeline = host.timeline();
    assert_eq!(timeline.len(), 4, "{timeline:?}");
    for pair in timeline.chunks(2) {
        assert!(pair[0].starts_with("start "), "{timeline:?}");
        assert_eq!(
            pair[0].strip_prefix("start "),
            pair[1].strip_prefix("end "),
            "{timeline:?}"
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_change_during_reload_runs_after_it() {
    let dir = tempfile::tempdir().expect("tempdir");
    let host = MockHost::with_loaded(&["cogs.ping"]);
    *host.delay.lock() = Some(Duration::from_millis(500));
    let service = service_with(utf8(&dir), &host, |_| {});

    service.request_reload(ext("cogs.ping"));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(service.state_of(&ext("cogs.ping")), ReloadState::Reloading);

    assert!(!service.request_reload(ext("cogs.ping")));
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_eq!(
        host.timeline(),
        [
            "start reload:cogs.ping",
            "end reload:cogs.ping",
            "start reload:cogs.ping",
            "end reload:cogs.ping",
        ]
    );
    assert_eq!(service.stats().total_reloads, 2);
    assert_eq!(service.state_of(&ext("cogs.ping")), ReloadState::Idle);
}

#[tokio::test]
async fn test_cascade_reloads_loaded_dependents_in_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    let base = utf8(&dir);
    write_bot(base);
    let host = MockHost::with_loaded(&["utils.db", "cogs.levels", "cogs.alerts", "cogs.ping"]);
    let service = service_with(base, &host, |_| {});

    let summary = service.prime().await;
    assert_eq!(summary.files, 4);
    assert_eq!(summary.errors, 0);

    assert!(service.manual_reload(&ext("utils.db")).await.expect("reload"));
    assert_eq!(
        host.calls(),
        ["reload:utils.db", "reload:cogs.levels", "reload:cogs.alerts"]
    );
    assert_eq!(service.stats().total_reloads, 3);
}

#[tokio::test]
async fn test_no_cascade_after_failure_or_when_disabled() {
    let dir = tempfile::tempdir().expect("tempdir");
    let base = utf8(&dir);
    write_bot(base);

    let host = MockHost::with_loaded(&["utils.db", "cogs.levels", "cogs.alerts"]);
    host.fail_times("utils.db", 1);
    let service = service_with(base, &host, |s| s.max_reload_attempts = 1);
    service.prime().await;
    assert!(!service.manual_reload(&ext("utils.db")).await.expect("no error"));
    assert_eq!(host.calls(), ["reload:utils.db"]);

    let host = MockHost::with_loaded(&["utils.db", "cogs.levels", "cogs.alerts"]);
    let service = service_with(base, &host, |s| s.track_dependencies = false);
    service.prime().await;
    assert!(service.manual_reload(&ext("utils.db")).await.expect("reload"));
    assert_eq!(host.calls(), ["reload:utils.db"]);
}

#[tokio::test(start_paused = true)]
async fn test_request_reload_debounces_burst() {
    let dir = tempfile::tempdir().expect("tempdir");
    let host = MockHost::with_loaded(&["cogs.ping"]);
    let service = service_with(utf8(&dir), &host, |_| {});

    assert!(!service.request_reload(ext("cogs.ping")));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(service.request_reload(ext("cogs.ping")));
    assert_eq!(service.state_of(&ext("cogs.ping")), ReloadState::Pending);
    assert_eq!(
        service.status().extensions.get("cogs.ping"),
        Some(&ReloadState::Pending)
    );

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(host.calls(), ["reload:cogs.ping"]);
    assert_eq!(service.state_of(&ext("cogs.ping")), ReloadState::Idle);
    assert!(service.status().extensions.is_empty());
}

#[tokio::test]
async fn test_manual_reload_cancels_pending() {
    let dir = tempfile::tempdir().expect("tempdir");
    let host = MockHost::with_loaded(&["cogs.ping"]);
    let service = service_with(utf8(&dir), &host, |s| s.debounce_delay = 0.2);

    service.request_reload(ext("cogs.ping"));
    service.manual_reload(&ext("cogs.ping")).await.expect("reload");
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert_eq!(host.calls(), ["reload:cogs.ping"]);
}

#[tokio::test]
async fn test_unload() {
    let dir = tempfile::tempdir().expect("tempdir");
    let host = MockHost::with_loaded(&["cogs.ping"]);
    let service = service_with(utf8(&dir), &host, |_| {});

    assert!(service.unload(&ext("cogs.ping")).await.expect("unload"));
    assert!(!host.is_loaded(&ext("cogs.ping")));
    assert!(!service.unload(&ext("cogs.ping")).await.expect("continue on error"));

    let strict = service_with(utf8(&dir), &host, |s| s.continue_on_error = false);
    let err = strict
        .unload(&ext("cogs.ping"))
        .await
        .expect_err("not loaded");
    assert!(err.to_string().contains("is not loaded"));
}

#[tokio::test]
async fn test_start_stop_idempotent() {
    let dir = tempfile::tempdir().expect("tempdir");
    let base = utf8(&dir);
    write_bot(base);
    let host = MockHost::with_loaded(&[]);
    let service = service_with(base, &host, |_| {});

    service.start().await.expect("start");
    service.start().await.expect("second start");
    let status = service.status();
    assert!(status.enabled);
    assert!(status.watching);
    assert!(status.tracked_modules > 0);
    assert!(status.dependency_edges > 0);

    service.stop().await.expect("stop");
    service.stop().await.expect("second stop");
    let status = service.status();
    assert!(!status.watching);
    assert_eq!(status.tracked_modules, 0);
}

#[tokio::test]
async fn test_enable_and_disable() {
    let dir = tempfile::tempdir().expect("tempdir");
    let host = MockHost::with_loaded(&[]);
    let service = service_with(utf8(&dir), &host, |s| s.enabled = false);

    service.start().await.expect("start");
    assert!(!service.is_watching());

    service.enable().await.expect("enable");
    assert!(service.is_enabled());
    assert!(service.is_watching());

    service.disable().await.expect("disable");
    assert!(!service.is_enabled());
    assert!(!service.is_watching());
}

#[tokio::test]
async fn test_missing_watch_directory_still_starts() {
    let dir = tempfile::tempdir().expect("tempdir");
    let base = utf8(&dir);
    let host = MockHost::with_loaded(&[]);
    let service = service_with(base, &host, |s| {
        s.watch_directories = vec![base.join("does-not-exist")];
    });

    service.start().await.expect("start");
    assert!(service.is_watching());
    service.stop().await.expect("stop");
}

#[test]
fn test_invalid_settings_rejected() {
    let host: Arc<dyn ExtensionHost> = MockHost::with_loaded(&[]);
    let settings = HotReloadSettings {
        max_reload_attempts: 0,
        ..HotReloadSettings::default()
    };
    let err = HotReloadService::from_settings(settings, host).expect_err("invalid");
    assert!(matches!(err, ServiceError::Config(_)));
}

#[tokio::test]
async fn test_status_serializes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let host = MockHost::with_loaded(&["cogs.b", "cogs.a"]);
    let service = service_with(utf8(&dir), &host, |_| {});

    let json = serde_json::to_value(service.status()).expect("serialize");
    assert_eq!(json["loaded"], serde_json::json!(["cogs.a", "cogs.b"]));
    assert_eq!(json["stats"]["total_reloads"], 0);
    assert_eq!(json["watching"], false);
}
