//! Update application.
//!
//! `apply()` runs on a spawned task and returns immediately with a stream
//! of [`ApplyState`] values. Every state is also published on the event
//! bus. Only one apply runs at a time; there is no cancellation once it has
//! started.

use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use futures_util::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::attempts::{AttemptSink, UpdateAttempt};
use crate::candidate::UpdateCandidate;
use crate::download::PackageDownloader;
use crate::error::InstallError;
use crate::events::{EventBus, UpdateEvent};
use crate::install::{PackageInstaller, WebReloader};
use crate::integrity::verify_sha256;
use crate::store::InstalledVersion;
use crate::version::Version;

/// Progress of an update application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApplyState {
    Idle,
    /// Percent downloaded, 0-100
    Downloading(u8),
    Installing,
    Completed,
    Error(String),
}

impl ApplyState {
    /// Whether no further state follows within the same apply.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error(_))
    }

    /// Allowed transitions. Download progress never goes backwards and an
    /// error may only be left by starting a new download.
    pub fn can_transition_to(&self, next: &ApplyState) -> bool {
        use ApplyState::*;
        match (self, next) {
            (Idle | Error(_), Downloading(_)) => true,
            (Downloading(from), Downloading(to)) => to >= from,
            (Downloading(_), Installing) => true,
            (Installing, Completed) => true,
            (Idle | Downloading(_) | Installing, Error(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ApplyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Downloading(percent) => write!(f, "downloading ({}%)", percent),
            Self::Installing => write!(f, "installing"),
            Self::Completed => write!(f, "completed"),
            Self::Error(detail) => write!(f, "error: {}", detail),
        }
    }
}

/// Stream of states produced by one `apply()` call. Ends after a terminal state.
#[must_use = "progress streams do nothing unless polled"]
pub struct ApplyProgress {
    rx: mpsc::UnboundedReceiver<ApplyState>,
}

impl ApplyProgress {
    pub(crate) fn rejected(detail: impl Into<String>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(ApplyState::Error(detail.into()));
        Self { rx }
    }
}

impl Stream for ApplyProgress {
    type Item = ApplyState;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// How an update is put in place.
pub enum ApplyBackend {
    /// Download a package and hand it to the platform installer.
    Native {
        downloader: PackageDownloader,
        installer: Arc<dyn PackageInstaller>,
    },
    /// Drop cached web assets and reload.
    Web { reloader: Arc<dyn WebReloader> },
}

struct ApplierInner {
    backend: ApplyBackend,
    installed: Arc<InstalledVersion>,
    bus: Arc<EventBus>,
    attempts: Vec<Arc<dyn AttemptSink>>,
    state: Mutex<ApplyState>,
    busy: AtomicBool,
}

/// Drives download, install, and completion for one candidate at a time.
#[derive(Clone)]
pub struct UpdateApplier {
    inner: Arc<ApplierInner>,
}

impl UpdateApplier {
    pub fn new(
        backend: ApplyBackend,
        installed: Arc<InstalledVersion>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            inner: Arc::new(ApplierInner {
                backend,
                installed,
                bus,
                attempts: Vec::new(),
                state: Mutex::new(ApplyState::Idle),
                busy: AtomicBool::new(false),
            }),
        }
    }

    /// Native applier using `downloader` and `installer`.
    pub fn native(
        downloader: PackageDownloader,
        installer: Arc<dyn PackageInstaller>,
        installed: Arc<InstalledVersion>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self::new(
            ApplyBackend::Native {
                downloader,
                installer,
            },
            installed,
            bus,
        )
    }

    /// Web applier using `reloader`.
    pub fn web(
        reloader: Arc<dyn WebReloader>,
        installed: Arc<InstalledVersion>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self::new(ApplyBackend::Web { reloader }, installed, bus)
    }

    /// Also record the outcome of every apply in `sink`.
    pub fn with_attempt_sink(mut self, sink: Arc<dyn AttemptSink>) -> Self {
        match Arc::get_mut(&mut self.inner) {
            Some(inner) => inner.attempts.push(sink),
            None => warn!("Applier already shared, attempt sink ignored"),
        }
        self
    }

    /// Current state.
    pub fn state(&self) -> ApplyState {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Whether an apply is in progress.
    pub fn is_busy(&self) -> bool {
        self.inner.busy.load(Ordering::SeqCst)
    }

    /// Start applying `candidate`.
    ///
    /// While another apply is running, or after one has completed, the
    /// returned stream holds a single `Error` item and nothing else changes.
    /// Must be called within a Tokio runtime.
    pub fn apply(&self, candidate: UpdateCandidate) -> ApplyProgress {
        if self
            .inner
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("Apply requested while another update is in progress");
            return ApplyProgress::rejected("an update is already being applied");
        }
        let guard = BusyGuard(self.inner.clone());

        if self.state() == ApplyState::Completed {
            warn!("Apply requested after an update was already applied");
            return ApplyProgress::rejected(
                "an update was already applied, restart to continue",
            );
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let inner = self.inner.clone();
        tokio::spawn(async move {
            let run = Run { inner: &inner, tx };
            run.execute(candidate).await;
            // Not busy anymore by the time the caller sees the stream end.
            drop(guard);
        });

        ApplyProgress { rx }
    }
}

/// Clears the busy flag when the apply task ends, even by panic.
struct BusyGuard(Arc<ApplierInner>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.busy.store(false, Ordering::SeqCst);
    }
}

/// One apply in flight.
struct Run<'a> {
    inner: &'a ApplierInner,
    tx: mpsc::UnboundedSender<ApplyState>,
}

impl Run<'_> {
    async fn execute(&self, candidate: UpdateCandidate) {
        info!(
            "Applying update {} from {}",
            candidate.version(),
            candidate.source()
        );

        let from_version = self.inner.installed.current();
        let result = match &self.inner.backend {
            ApplyBackend::Native {
                downloader,
                installer,
            } => {
                self.apply_native(downloader, installer.as_ref(), &candidate)
                    .await
            }
            ApplyBackend::Web { reloader } => {
                self.apply_web(reloader.as_ref(), &candidate).await
            }
        };

        match result {
            Ok(()) => {
                info!("Update {} applied", candidate.version());
                self.log_attempt(UpdateAttempt::succeeded(from_version, &candidate))
                    .await;
                self.report(ApplyState::Completed);
            }
            Err(e) => {
                error!("Applying update {} failed: {}", candidate.version(), e);
                self.log_attempt(UpdateAttempt::failed(from_version, &candidate, e.to_string()))
                    .await;
                self.report(ApplyState::Error(e.to_string()));
            }
        }
    }

    async fn log_attempt(&self, attempt: UpdateAttempt) {
        for sink in &self.inner.attempts {
            if let Err(e) = sink.record(&attempt).await {
                warn!("Could not record update attempt: {}", e);
            }
        }
    }

    async fn apply_native(
        &self,
        downloader: &PackageDownloader,
        installer: &dyn PackageInstaller,
        candidate: &UpdateCandidate,
    ) -> Result<(), InstallError> {
        let url = candidate.download_url().ok_or_else(|| {
            InstallError::DownloadFailed("candidate has no download URL".to_string())
        })?;
        let dest = downloader.package_path(candidate);

        self.report(ApplyState::Downloading(0));
        let mut last_percent = 0u8;
        downloader
            .download(url, &dest, |progress| {
                if let Some(percent) = progress.percent() {
                    if percent > last_percent {
                        last_percent = percent;
                        self.report(ApplyState::Downloading(percent));
                    }
                }
            })
            .await?;
        if last_percent < 100 {
            self.report(ApplyState::Downloading(100));
        }

        if let Some(expected) = candidate.sha256() {
            let path = dest.clone();
            let expected = expected.to_string();
            let verified = tokio::task::spawn_blocking(move || verify_sha256(&path, &expected))
                .await
                .map_err(|e| InstallError::Unknown(format!("checksum task failed: {}", e)))?;
            if let Err(e) = verified {
                downloader.cleanup(&dest);
                return Err(e);
            }
        }

        self.report(ApplyState::Installing);
        installer.install(&dest).await?;
        self.record(candidate);
        Ok(())
    }

    async fn apply_web(
        &self,
        reloader: &dyn WebReloader,
        candidate: &UpdateCandidate,
    ) -> Result<(), InstallError> {
        self.report(ApplyState::Downloading(0));
        reloader.invalidate_cache().await?;
        self.report(ApplyState::Downloading(100));

        self.report(ApplyState::Installing);
        // The reload may replace this process, so the version is recorded
        // first and put back if the reload returns an error.
        let previous = self.inner.installed.stored();
        self.record(candidate);
        match reloader.reload().await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.roll_back(previous);
                Err(e)
            }
        }
    }

    fn roll_back(&self, previous: Result<Option<Version>, crate::error::UpdateError>) {
        let previous = match previous {
            Ok(previous) => previous,
            Err(e) => {
                warn!("Stored version was unreadable before reload, clearing it: {}", e);
                None
            }
        };
        match self.inner.installed.restore(previous.as_ref()) {
            Ok(()) => debug!("Restored stored version {:?}", previous),
            Err(e) => warn!("Could not restore stored version: {}", e),
        }
    }

    fn record(&self, candidate: &UpdateCandidate) {
        if let Err(e) = self.inner.installed.record(candidate.version()) {
            warn!("Could not record applied version {}: {}", candidate.version(), e);
        }
    }

    /// Move to `next`, then tell the caller and the bus.
    fn report(&self, next: ApplyState) {
        {
            let mut state = self.inner.state.lock().unwrap_or_else(|e| e.into_inner());
            if !state.can_transition_to(&next) {
                warn!("Unexpected apply transition {} -> {}", *state, next);
            }
            debug!("Apply state {}", next);
            *state = next.clone();
        }

        // A caller that dropped its stream still gets events on the bus.
        let _ = self.tx.send(next.clone());
        self.inner.bus.publish(&UpdateEvent::ApplyStateChanged(next));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attempts::MemoryAttemptSink;
    use crate::candidate::SourceName;
    use crate::platform::Platform;
    use crate::store::{MemoryVersionStore, VersionStore};
    use crate::version::Version;
    use async_trait::async_trait;
    use futures_util::StreamExt;
    use sha2::{Digest, Sha256};
    use std::path::{Path, PathBuf};
    use std::time::Duration;
    use tempfile::TempDir;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Default)]
    struct RecordingInstaller {
        installed: Mutex<Vec<PathBuf>>,
        reject: bool,
    }

    #[async_trait]
    impl PackageInstaller for RecordingInstaller {
        async fn install(&self, package: &Path) -> Result<(), InstallError> {
            assert!(package.exists());
            self.installed.lock().unwrap().push(package.to_path_buf());
            if self.reject {
                Err(InstallError::InstallRejected("user cancelled".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[derive(Default)]
    struct RecordingReloader {
        calls: Mutex<Vec<&'static str>>,
        fail_reload: bool,
    }

    #[async_trait]
    impl WebReloader for RecordingReloader {
        async fn invalidate_cache(&self) -> Result<(), InstallError> {
            self.calls.lock().unwrap().push("invalidate");
            Ok(())
        }

        async fn reload(&self) -> Result<(), InstallError> {
            self.calls.lock().unwrap().push("reload");
            if self.fail_reload {
                Err(InstallError::Unknown("reload blocked".to_string()))
            } else {
                Ok(())
            }
        }
    }

    const PACKAGE: &[u8] = &[42u8; 32 * 1024];

    async fn package_server(delay: Duration) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(PACKAGE.to_vec())
                    .set_delay(delay),
            )
            .mount(&server)
            .await;
        server
    }

    fn candidate(server: &MockServer) -> UpdateCandidate {
        UpdateCandidate::new(
            Version::parse("1.0.78"),
            SourceName::PrimaryRegistry,
            Platform::Android,
            chrono::Utc::now(),
        )
        .with_download_url(format!("{}/app-release.apk", server.uri()))
    }

    struct Fixture {
        applier: UpdateApplier,
        installer: Arc<RecordingInstaller>,
        installed: Arc<InstalledVersion>,
        attempts: Arc<MemoryAttemptSink>,
        bus_states: Arc<Mutex<Vec<ApplyState>>>,
        dir: TempDir,
    }

    fn native_fixture(installer: RecordingInstaller) -> Fixture {
        let dir = TempDir::new().unwrap();
        let installer = Arc::new(installer);
        let installed = Arc::new(InstalledVersion::new(
            Version::parse("1.0.77"),
            Arc::new(MemoryVersionStore::new()),
        ));
        let bus = Arc::new(EventBus::new());
        let bus_states = Arc::new(Mutex::new(Vec::new()));
        let sink = bus_states.clone();
        let _sub = bus.subscribe(move |event| {
            if let UpdateEvent::ApplyStateChanged(state) = event {
                sink.lock().unwrap().push(state.clone());
            }
        });

        let downloader =
            PackageDownloader::with_config(&crate::config::NetworkConfig::default(), dir.path())
                .unwrap();
        let attempts = Arc::new(MemoryAttemptSink::default());
        let applier = UpdateApplier::native(downloader, installer.clone(), installed.clone(), bus)
            .with_attempt_sink(attempts.clone());
        Fixture {
            applier,
            installer,
            installed,
            attempts,
            bus_states,
            dir,
        }
    }

    fn assert_monotonic(states: &[ApplyState]) {
        let mut previous = ApplyState::Idle;
        for state in states {
            assert!(
                previous.can_transition_to(state),
                "{} -> {} in {:?}",
                previous,
                state,
                states
            );
            previous = state.clone();
        }
    }

    #[test]
    fn test_transition_rules() {
        assert!(ApplyState::Idle.can_transition_to(&ApplyState::Downloading(0)));
        assert!(ApplyState::Downloading(10).can_transition_to(&ApplyState::Downloading(10)));
        assert!(!ApplyState::Downloading(50).can_transition_to(&ApplyState::Downloading(40)));
        assert!(!ApplyState::Idle.can_transition_to(&ApplyState::Completed));
        assert!(ApplyState::Error("x".into()).can_transition_to(&ApplyState::Downloading(0)));
        assert!(!ApplyState::Completed.can_transition_to(&ApplyState::Downloading(0)));
    }

    #[tokio::test]
    async fn test_native_apply_happy_path() {
        let server = package_server(Duration::ZERO).await;
        let fx = native_fixture(RecordingInstaller::default());

        let states: Vec<ApplyState> = fx.applier.apply(candidate(&server)).collect().await;

        assert_eq!(states.first(), Some(&ApplyState::Downloading(0)));
        assert_eq!(states.last(), Some(&ApplyState::Completed));
        assert!(states.contains(&ApplyState::Downloading(100)));
        assert!(states.contains(&ApplyState::Installing));
        assert_monotonic(&states);

        assert_eq!(*fx.bus_states.lock().unwrap(), states);
        assert_eq!(fx.installer.installed.lock().unwrap().len(), 1);
        assert_eq!(fx.installed.current(), Version::parse("1.0.78"));
        assert_eq!(fx.applier.state(), ApplyState::Completed);
        assert!(!fx.applier.is_busy());
    }

    #[tokio::test]
    async fn test_checksum_mismatch_stops_before_install() {
        let server = package_server(Duration::ZERO).await;
        let fx = native_fixture(RecordingInstaller::default());
        let bad = candidate(&server).with_sha256(hex::encode(Sha256::digest(b"other")));

        let states: Vec<ApplyState> = fx.applier.apply(bad.clone()).collect().await;

        match states.last() {
            Some(ApplyState::Error(detail)) => assert!(detail.contains("checksum mismatch")),
            other => panic!("expected error, got {:?}", other),
        }
        assert!(fx.installer.installed.lock().unwrap().is_empty());
        assert!(!fx.dir.path().join("namustock-update-1.0.78.apk").exists());
        assert_eq!(fx.installed.current(), Version::parse("1.0.77"));
    }

    #[tokio::test]
    async fn test_matching_checksum_installs() {
        let server = package_server(Duration::ZERO).await;
        let fx = native_fixture(RecordingInstaller::default());
        let good = candidate(&server).with_sha256(hex::encode(Sha256::digest(PACKAGE)));

        let states: Vec<ApplyState> = fx.applier.apply(good).collect().await;
        assert_eq!(states.last(), Some(&ApplyState::Completed));
    }

    #[tokio::test]
    async fn test_rejected_install_can_be_retried() {
        let server = package_server(Duration::ZERO).await;
        let fx = native_fixture(RecordingInstaller {
            reject: true,
            ..Default::default()
        });

        let states: Vec<ApplyState> = fx.applier.apply(candidate(&server)).collect().await;
        assert!(matches!(states.last(), Some(ApplyState::Error(_))));

        // A fresh apply from the error state starts downloading again.
        let retry: Vec<ApplyState> = fx.applier.apply(candidate(&server)).collect().await;
        assert_eq!(retry.first(), Some(&ApplyState::Downloading(0)));
        assert_eq!(fx.installer.installed.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_second_apply_while_running_is_rejected() {
        let server = package_server(Duration::from_millis(300)).await;
        let fx = native_fixture(RecordingInstaller::default());

        let first = fx.applier.apply(candidate(&server));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(fx.applier.is_busy());

        let second: Vec<ApplyState> = fx.applier.apply(candidate(&server)).collect().await;
        assert_eq!(second.len(), 1);
        assert!(matches!(second[0], ApplyState::Error(_)));

        let first: Vec<ApplyState> = first.collect().await;
        assert_eq!(first.last(), Some(&ApplyState::Completed));
        assert_monotonic(&first);
        assert_eq!(fx.installer.installed.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_apply_after_completion_is_rejected() {
        let server = package_server(Duration::ZERO).await;
        let fx = native_fixture(RecordingInstaller::default());
        let _: Vec<ApplyState> = fx.applier.apply(candidate(&server)).collect().await;

        let again: Vec<ApplyState> = fx.applier.apply(candidate(&server)).collect().await;
        assert_eq!(again.len(), 1);
        assert_eq!(fx.applier.state(), ApplyState::Completed);
        assert!(!fx.applier.is_busy());
    }

    #[tokio::test]
    async fn test_missing_download_url_is_error() {
        let fx = native_fixture(RecordingInstaller::default());
        let no_url = UpdateCandidate::new(
            Version::parse("2.0"),
            SourceName::StaticManifest,
            Platform::Android,
            chrono::Utc::now(),
        );

        let states: Vec<ApplyState> = fx.applier.apply(no_url).collect().await;
        assert_eq!(states.len(), 1);
        assert!(matches!(states[0], ApplyState::Error(_)));
    }

    #[tokio::test]
    async fn test_web_apply_invalidates_then_reloads() {
        let reloader = Arc::new(RecordingReloader::default());
        let installed = Arc::new(InstalledVersion::new(
            Version::parse("1.0.0"),
            Arc::new(MemoryVersionStore::new()),
        ));
        let applier =
            UpdateApplier::web(reloader.clone(), installed.clone(), Arc::new(EventBus::new()));

        let web = UpdateCandidate::new(
            Version::parse("1.1.0"),
            SourceName::StaticManifest,
            Platform::Web,
            chrono::Utc::now(),
        );
        let states: Vec<ApplyState> = applier.apply(web).collect().await;

        assert_eq!(
            states,
            vec![
                ApplyState::Downloading(0),
                ApplyState::Downloading(100),
                ApplyState::Installing,
                ApplyState::Completed,
            ]
        );
        assert_eq!(*reloader.calls.lock().unwrap(), vec!["invalidate", "reload"]);
        assert_eq!(installed.current(), Version::parse("1.1.0"));
    }

    fn web_candidate() -> UpdateCandidate {
        UpdateCandidate::new(
            Version::parse("1.1.0"),
            SourceName::StaticManifest,
            Platform::Web,
            chrono::Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_previous_version() {
        let reloader = Arc::new(RecordingReloader {
            fail_reload: true,
            ..Default::default()
        });
        let store = Arc::new(MemoryVersionStore::new());
        let installed = Arc::new(InstalledVersion::new(Version::parse("1.0.0"), store.clone()));
        let applier =
            UpdateApplier::web(reloader.clone(), installed.clone(), Arc::new(EventBus::new()));

        let states: Vec<ApplyState> = applier.apply(web_candidate()).collect().await;

        match states.last() {
            Some(ApplyState::Error(detail)) => assert!(detail.contains("reload blocked")),
            other => panic!("expected error, got {:?}", other),
        }
        assert_eq!(installed.current(), Version::parse("1.0.0"));
        assert_eq!(store.load().unwrap(), None);

        // The same update can be tried again.
        let retry: Vec<ApplyState> = applier.apply(web_candidate()).collect().await;
        assert_eq!(retry.first(), Some(&ApplyState::Downloading(0)));
    }

    #[tokio::test]
    async fn test_failed_reload_restores_earlier_record() {
        let reloader = Arc::new(RecordingReloader {
            fail_reload: true,
            ..Default::default()
        });
        let store = Arc::new(MemoryVersionStore::new());
        store.save(&Version::parse("1.0.5")).unwrap();
        let installed = Arc::new(InstalledVersion::new(Version::parse("1.0.0"), store.clone()));
        let applier = UpdateApplier::web(reloader, installed.clone(), Arc::new(EventBus::new()));

        let _: Vec<ApplyState> = applier.apply(web_candidate()).collect().await;
        assert_eq!(installed.current(), Version::parse("1.0.5"));
    }

    #[tokio::test]
    async fn test_successful_apply_is_recorded_once() {
        let server = package_server(Duration::ZERO).await;
        let fx = native_fixture(RecordingInstaller::default());

        let _: Vec<ApplyState> = fx.applier.apply(candidate(&server)).collect().await;

        let attempts = fx.attempts.attempts().await;
        assert_eq!(attempts.len(), 1);
        assert!(attempts[0].success);
        assert_eq!(attempts[0].from_version, Version::parse("1.0.77"));
        assert_eq!(attempts[0].to_version, Version::parse("1.0.78"));
        assert_eq!(attempts[0].platform, Platform::Android);
        assert!(attempts[0].error.is_none());
    }

    #[tokio::test]
    async fn test_failed_apply_is_recorded_with_error() {
        let server = package_server(Duration::ZERO).await;
        let fx = native_fixture(RecordingInstaller {
            reject: true,
            ..Default::default()
        });

        let _: Vec<ApplyState> = fx.applier.apply(candidate(&server)).collect().await;

        let attempts = fx.attempts.attempts().await;
        assert_eq!(attempts.len(), 1);
        assert!(!attempts[0].success);
        assert!(attempts[0].error.as_deref().unwrap().contains("user cancelled"));
    }

    #[tokio::test]
    async fn test_rejected_apply_is_not_an_attempt() {
        let server = package_server(Duration::ZERO).await;
        let fx = native_fixture(RecordingInstaller::default());
        let _: Vec<ApplyState> = fx.applier.apply(candidate(&server)).collect().await;
        let _: Vec<ApplyState> = fx.applier.apply(candidate(&server)).collect().await;

        assert_eq!(fx.attempts.attempts().await.len(), 1);
    }
}
