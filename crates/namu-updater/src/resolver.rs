//! Update resolution.
//!
//! The resolver asks its sources in priority order, each through the result
//! cache, and turns the first answer into an [`UpdateDecision`]. Fetch
//! failures never escape: they show up only as the decision's reason.
//!
//! Concurrent checks share one in-flight resolution.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::ResultCache;
use crate::candidate::UpdateCandidate;
use crate::config::UpdaterConfig;
use crate::error::{FetchError, ResolutionError};
use crate::events::{EventBus, UpdateEvent};
use crate::platform::Platform;
use crate::providers::{PushChannelProvider, VersionSource};
use crate::store::InstalledVersion;
use crate::version::Version;

/// Why a decision came out the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecisionReason {
    /// A newer version is available
    Ok,
    /// Every source failed and all of them were rate limited
    RateLimited,
    /// Automatic updates are disabled for this platform
    PlatformUnsupported,
    /// Every source failed
    NoSourceAvailable,
    /// The newest reported version is not newer than the running one
    AlreadyLatest,
}

/// Outcome of one resolution. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateDecision {
    pub available: bool,
    pub candidate: Option<UpdateCandidate>,
    pub current_version: Version,
    pub platform: Platform,
    pub reason: DecisionReason,
}

impl UpdateDecision {
    fn unavailable(current_version: Version, platform: Platform, reason: DecisionReason) -> Self {
        Self {
            available: false,
            candidate: None,
            current_version,
            platform,
            reason,
        }
    }

    /// The failure behind this decision, if it was one.
    pub fn error(&self) -> Option<ResolutionError> {
        match self.reason {
            DecisionReason::NoSourceAvailable => Some(ResolutionError::NoSourceAvailable),
            DecisionReason::RateLimited => Some(ResolutionError::RateLimited),
            DecisionReason::PlatformUnsupported => {
                Some(ResolutionError::PlatformUnsupported(self.platform))
            }
            DecisionReason::Ok | DecisionReason::AlreadyLatest => None,
        }
    }

    /// Text for end users.
    ///
    /// A failed check reads the same as "no update" so transient network
    /// trouble never alarms anyone.
    pub fn user_message(&self) -> String {
        match (&self.candidate, self.reason) {
            (Some(candidate), DecisionReason::Ok) => format!(
                "Version {} is available (you have {}).",
                candidate.version(),
                self.current_version
            ),
            (_, DecisionReason::PlatformUnsupported) => {
                "Automatic updates are not available on this device.".to_string()
            }
            _ => "You're up to date.".to_string(),
        }
    }
}

/// Lifecycle of the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolverState {
    Idle,
    Resolving,
    Decided,
    Failed,
}

/// Static resolver settings.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Platform of the running build
    pub platform: Platform,
    /// Platforms eligible for automatic updates
    pub supported: Vec<Platform>,
    /// Interval of the background check task, if any
    pub poll_interval: Option<Duration>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            platform: Platform::current(),
            supported: vec![Platform::Android],
            poll_interval: None,
        }
    }
}

impl From<&UpdaterConfig> for ResolverConfig {
    fn from(config: &UpdaterConfig) -> Self {
        Self {
            platform: config.platform.current(),
            supported: config.platform.supported.clone(),
            poll_interval: config.poll_interval(),
        }
    }
}

type InFlight = Shared<BoxFuture<'static, UpdateDecision>>;

struct ResolverInner {
    config: ResolverConfig,
    sources: Vec<Arc<dyn VersionSource>>,
    cache: Arc<ResultCache>,
    installed: Arc<InstalledVersion>,
    bus: Arc<EventBus>,
    push: Option<Arc<PushChannelProvider>>,
    state: Mutex<ResolverState>,
    in_flight: Mutex<Option<InFlight>>,
    startup_checked: AtomicBool,
    poll_task: Mutex<Option<JoinHandle<()>>>,
}

/// Decides whether a newer build exists.
#[derive(Clone)]
pub struct UpdateResolver {
    inner: Arc<ResolverInner>,
}

impl UpdateResolver {
    /// Create a resolver. `sources` are consulted in the given order.
    pub fn new(
        config: ResolverConfig,
        sources: Vec<Arc<dyn VersionSource>>,
        cache: Arc<ResultCache>,
        installed: Arc<InstalledVersion>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            inner: Arc::new(ResolverInner {
                config,
                sources,
                cache,
                installed,
                bus,
                push: None,
                state: Mutex::new(ResolverState::Idle),
                in_flight: Mutex::new(None),
                startup_checked: AtomicBool::new(false),
                poll_task: Mutex::new(None),
            }),
        }
    }

    /// Attach the push channel started and stopped with the resolver.
    pub fn with_push_channel(mut self, push: Arc<PushChannelProvider>) -> Self {
        match Arc::get_mut(&mut self.inner) {
            Some(inner) => inner.push = Some(push),
            None => warn!("Resolver already shared, push channel ignored"),
        }
        self
    }

    pub fn state(&self) -> ResolverState {
        *self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn platform_supported(&self) -> bool {
        self.inner.is_platform_supported()
    }

    /// Check once per process. Later calls return `None` without any work.
    pub async fn check_on_start(&self) -> Option<UpdateDecision> {
        if self.inner.startup_checked.swap(true, Ordering::SeqCst) {
            debug!("Startup check already ran");
            return None;
        }
        Some(self.check_manually().await)
    }

    /// Check now. Joins the in-flight resolution if there is one.
    pub async fn check_manually(&self) -> UpdateDecision {
        let resolution = {
            let mut in_flight = self.inner.in_flight.lock().unwrap_or_else(|e| e.into_inner());
            match in_flight.as_ref() {
                Some(resolution) => {
                    debug!("Joining resolution already in flight");
                    resolution.clone()
                }
                None => {
                    let inner = self.inner.clone();
                    let resolution = async move {
                        let decision = inner.resolve().await;
                        *inner.in_flight.lock().unwrap_or_else(|e| e.into_inner()) = None;
                        decision
                    }
                    .boxed()
                    .shared();
                    *in_flight = Some(resolution.clone());
                    resolution
                }
            }
        };
        resolution.await
    }

    /// Start the push channel and the periodic check, if configured.
    ///
    /// Nothing starts on an unsupported platform.
    pub fn start(&self) {
        if !self.inner.is_platform_supported() {
            info!(
                "Updates not supported on {}, background checks disabled",
                self.inner.config.platform
            );
            return;
        }

        if let Some(push) = &self.inner.push {
            push.start();
        }

        if let Some(interval) = self.inner.config.poll_interval {
            let mut task = self.inner.poll_task.lock().unwrap_or_else(|e| e.into_inner());
            if task.is_none() {
                info!("Checking for updates every {:?}", interval);
                *task = Some(tokio::spawn(poll_loop(Arc::downgrade(&self.inner), interval)));
            }
        }
    }

    /// Stop everything started by [`start`](Self::start).
    pub fn stop(&self) {
        if let Some(push) = &self.inner.push {
            push.stop();
        }
        if let Some(task) = self.inner.poll_task.lock().unwrap_or_else(|e| e.into_inner()).take() {
            task.abort();
            info!("Periodic update check stopped");
        }
    }

    /// Whether the periodic check task is running.
    pub fn is_polling(&self) -> bool {
        self.inner
            .poll_task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|t| !t.is_finished())
    }
}

async fn poll_loop(resolver: Weak<ResolverInner>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick fires immediately; startup checks are the caller's job.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let Some(inner) = resolver.upgrade() else {
            break;
        };
        let decision = UpdateResolver { inner }.check_manually().await;
        debug!("Periodic check finished: {:?}", decision.reason);
    }
}

impl ResolverInner {
    fn is_platform_supported(&self) -> bool {
        self.config.supported.contains(&self.config.platform)
    }

    fn set_state(&self, state: ResolverState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    async fn resolve(&self) -> UpdateDecision {
        self.set_state(ResolverState::Resolving);
        let current = self.installed.current();
        let platform = self.config.platform;

        if !self.is_platform_supported() {
            info!("Updates not supported on {}", self.config.platform);
            self.set_state(ResolverState::Decided);
            return UpdateDecision::unavailable(
                current,
                platform,
                DecisionReason::PlatformUnsupported,
            );
        }

        info!("Checking for updates...");
        let candidate = match self.first_candidate().await {
            Ok(candidate) => candidate,
            Err(failures) => {
                let reason = if !failures.is_empty() && failures.iter().all(FetchError::is_rate_limited)
                {
                    DecisionReason::RateLimited
                } else {
                    DecisionReason::NoSourceAvailable
                };
                warn!("No update source answered ({:?})", reason);
                self.set_state(ResolverState::Failed);
                return UpdateDecision::unavailable(current, platform, reason);
            }
        };
        self.set_state(ResolverState::Decided);

        if !candidate.version().is_newer_than(&current) {
            info!("Already on the latest version ({})", current);
            return UpdateDecision {
                available: false,
                candidate: Some(candidate),
                current_version: current,
                platform,
                reason: DecisionReason::AlreadyLatest,
            };
        }

        info!(
            "Update available: {} (current {}) from {}",
            candidate.version(),
            current,
            candidate.source()
        );
        self.bus.publish(&UpdateEvent::UpdateAvailable {
            candidate: candidate.clone(),
            current_version: current.clone(),
        });
        UpdateDecision {
            available: true,
            candidate: Some(candidate),
            current_version: current,
            platform,
            reason: DecisionReason::Ok,
        }
    }

    /// First successful answer in priority order, or every failure.
    async fn first_candidate(&self) -> Result<UpdateCandidate, Vec<FetchError>> {
        let mut failures = Vec::new();
        for source in &self.sources {
            let name = source.name();
            let fetched = self
                .cache
                .get_or_fetch(name, || async move { source.fetch_latest().await })
                .await;
            match fetched {
                Ok(candidate) => return Ok(candidate),
                Err(e) => {
                    warn!("Source {} failed: {}", name, e);
                    failures.push(e);
                }
            }
        }
        Err(failures)
    }
}
