//! Push-channel source.
//!
//! Watches one remote document through a [`DocumentFeed`]. Each change is
//! decoded like a static manifest; when it is newer than both the installed
//! version and the last version announced here, `UpdateAvailable` goes out
//! on the bus right away without waiting for a resolution.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::manifest::ManifestDocument;
use super::VersionSource;
use crate::cache::ResultCache;
use crate::candidate::{SourceName, UpdateCandidate};
use crate::clock::{Clock, SystemClock};
use crate::error::FetchError;
use crate::events::{EventBus, UpdateEvent};
use crate::fetch::{FetchRequest, RateLimitAwareFetcher};
use crate::platform::Platform;
use crate::store::InstalledVersion;
use crate::version::Version;

/// Stream of document snapshots. `Null` means the document does not exist.
pub type DocumentStream = BoxStream<'static, Result<serde_json::Value, FetchError>>;

/// Remote document store with change subscriptions.
#[async_trait]
pub trait DocumentFeed: Send + Sync {
    /// Start watching `document_id`. The first item is the current snapshot.
    async fn subscribe(&self, document_id: &str) -> Result<DocumentStream, FetchError>;
}

struct PushState {
    feed: Arc<dyn DocumentFeed>,
    document_id: String,
    platform: Platform,
    supported: Vec<Platform>,
    strict_versions: bool,
    bus: Arc<EventBus>,
    installed: Arc<InstalledVersion>,
    cache: Option<Arc<ResultCache>>,
    clock: Arc<dyn Clock>,
    last_document: Mutex<Option<UpdateCandidate>>,
    last_emitted: Mutex<Option<Version>>,
}

impl PushState {
    async fn run(self: Arc<Self>) {
        let mut documents = match self.feed.subscribe(&self.document_id).await {
            Ok(documents) => documents,
            Err(e) => {
                warn!("Push channel subscription to {} failed: {}", self.document_id, e);
                return;
            }
        };
        info!("Push channel watching {}", self.document_id);

        while let Some(item) = documents.next().await {
            match item {
                Ok(value) => self.ingest(value).await,
                Err(e) => warn!("Push channel error: {}", e),
            }
        }
        debug!("Push channel stream for {} ended", self.document_id);
    }

    fn platform_supported(&self) -> bool {
        self.supported.contains(&self.platform)
    }

    async fn ingest(&self, value: serde_json::Value) {
        if !self.platform_supported() {
            debug!("Ignoring push document, {} does not auto-update", self.platform);
            return;
        }
        if value.is_null() {
            debug!("Push document {} does not exist", self.document_id);
            return;
        }

        let candidate = match serde_json::from_value::<ManifestDocument>(value)
            .map_err(FetchError::from)
            .and_then(|doc| {
                doc.to_candidate(
                    SourceName::PushChannel,
                    self.platform,
                    self.strict_versions,
                    self.clock.now(),
                )
            }) {
            Ok(candidate) => candidate,
            Err(e) => {
                warn!("Ignoring push document: {}", e);
                return;
            }
        };

        debug!("Push channel reports version {}", candidate.version());
        *self.last_document.lock().unwrap_or_else(|e| e.into_inner()) = Some(candidate.clone());

        // The static manifest is published from the same data; refetch it next time.
        if let Some(cache) = &self.cache {
            cache.expire(SourceName::StaticManifest).await;
        }

        let current = self.installed.current();
        if !candidate.version().is_newer_than(&current) {
            return;
        }

        {
            let mut last = self.last_emitted.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(previous) = last.as_ref() {
                if !candidate.version().is_newer_than(previous) {
                    debug!("Version {} already announced", candidate.version());
                    return;
                }
            }
            *last = Some(candidate.version().clone());
        }

        info!(
            "Push channel found update {} (current {})",
            candidate.version(),
            current
        );
        self.bus.publish(&UpdateEvent::UpdateAvailable {
            candidate,
            current_version: current,
        });
    }
}

/// Long-lived source fed by a [`DocumentFeed`].
pub struct PushChannelProvider {
    state: Arc<PushState>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PushChannelProvider {
    pub fn new(
        feed: Arc<dyn DocumentFeed>,
        document_id: impl Into<String>,
        platform: Platform,
        bus: Arc<EventBus>,
        installed: Arc<InstalledVersion>,
    ) -> Self {
        Self {
            state: Arc::new(PushState {
                feed,
                document_id: document_id.into(),
                platform,
                supported: vec![Platform::Android],
                strict_versions: false,
                bus,
                installed,
                cache: None,
                clock: Arc::new(SystemClock),
                last_document: Mutex::new(None),
                last_emitted: Mutex::new(None),
            }),
            task: Mutex::new(None),
        }
    }

    /// Expire the cached static-manifest result whenever a document arrives.
    pub fn with_cache(self, cache: Arc<ResultCache>) -> Self {
        self.configure(|s| s.cache = Some(cache))
    }

    pub fn with_strict_versions(self, strict: bool) -> Self {
        self.configure(|s| s.strict_versions = strict)
    }

    /// Platforms that receive announcements. Android only by default.
    pub fn with_supported_platforms(self, supported: Vec<Platform>) -> Self {
        self.configure(|s| s.supported = supported)
    }

    pub fn with_clock(self, clock: Arc<dyn Clock>) -> Self {
        self.configure(|s| s.clock = clock)
    }

    fn configure(mut self, edit: impl FnOnce(&mut PushState)) -> Self {
        match Arc::get_mut(&mut self.state) {
            Some(state) => edit(state),
            None => warn!("Push channel already started, option ignored"),
        }
        self
    }

    /// Start watching. Does nothing if already running or if this
    /// platform is not updated automatically.
    pub fn start(&self) {
        if !self.state.platform_supported() {
            info!("Push channel not started, {} does not auto-update", self.state.platform);
            return;
        }
        let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            debug!("Push channel already running");
            return;
        }
        *task = Some(tokio::spawn(self.state.clone().run()));
    }

    /// Stop watching. The last received document is kept.
    pub fn stop(&self) {
        if let Some(task) = self.task.lock().unwrap_or_else(|e| e.into_inner()).take() {
            task.abort();
            info!("Push channel stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|t| !t.is_finished())
    }

    /// Most recent version announced on the bus by this channel.
    pub fn last_emitted(&self) -> Option<Version> {
        self.state
            .last_emitted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl Drop for PushChannelProvider {
    fn drop(&mut self) {
        self.stop();
    }
}

#[async_trait]
impl VersionSource for PushChannelProvider {
    fn name(&self) -> SourceName {
        SourceName::PushChannel
    }

    async fn fetch_latest(&self) -> Result<UpdateCandidate, FetchError> {
        self.state
            .last_document
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or_else(|| FetchError::network("push channel has not received a document yet"))
    }
}

/// [`DocumentFeed`] that polls a JSON URL and yields the document whenever
/// its content changes. Useful where no realtime store is available.
pub struct PollingDocumentFeed {
    fetcher: Arc<RateLimitAwareFetcher>,
    base_url: String,
    interval: Duration,
}

impl PollingDocumentFeed {
    /// Documents are read from `{base_url}/{document_id}`.
    pub fn new(
        fetcher: Arc<RateLimitAwareFetcher>,
        base_url: impl Into<String>,
        interval: Duration,
    ) -> Self {
        Self {
            fetcher,
            base_url: base_url.into(),
            interval,
        }
    }
}

#[async_trait]
impl DocumentFeed for PollingDocumentFeed {
    async fn subscribe(&self, document_id: &str) -> Result<DocumentStream, FetchError> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), document_id);
        let fetcher = self.fetcher.clone();
        let interval = self.interval;

        let polls = stream::unfold(
            (None::<serde_json::Value>, true),
            move |(previous, first)| {
                let fetcher = fetcher.clone();
                let request = FetchRequest::get(url.clone());
                async move {
                    let mut previous = previous;
                    let mut first = first;
                    loop {
                        if !first {
                            tokio::time::sleep(interval).await;
                        }
                        first = false;

                        let item = match fetcher.fetch(&request).await {
                            Ok(response) if response.status == 204 => Ok(serde_json::Value::Null),
                            Ok(response) => response.json::<serde_json::Value>(),
                            Err(e) if e.status == Some(404) => Ok(serde_json::Value::Null),
                            Err(e) => Err(e),
                        };

                        match item {
                            Ok(value) if previous.as_ref() == Some(&value) => continue,
                            Ok(value) => {
                                previous = Some(value.clone());
                                return Some((Ok(value), (previous, first)));
                            }
                            Err(e) => return Some((Err(e), (previous, first))),
                        }
                    }
                }
            },
        );

        Ok(polls.boxed())
    }
}
