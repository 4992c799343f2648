//! Updater facade.
//!
//! [`Updater`] wires every component from one [`UpdaterConfig`]: a shared
//! fetcher and cache, the sources in priority order, the optional push
//! channel, the installed-version store, the event bus, the resolver and
//! the applier. Hosts supply only what cannot come from configuration.

use std::sync::Arc;

use tracing::{debug, info};

use crate::applier::{ApplyProgress, ApplyState, UpdateApplier};
use crate::attempts::{AttemptSink, FileAttemptSink};
use crate::cache::ResultCache;
use crate::candidate::UpdateCandidate;
use crate::clock::{Clock, SystemClock};
use crate::config::UpdaterConfig;
use crate::download::PackageDownloader;
use crate::error::UpdateError;
use crate::events::{EventBus, Subscription, UpdateEvent};
use crate::fetch::RateLimitAwareFetcher;
use crate::install::{PackageInstaller, WebReloader};
use crate::platform::Platform;
use crate::providers::{
    DocumentFeed, PollingDocumentFeed, PrimaryRegistryProvider, PushChannelProvider,
    StaticManifestProvider, VersionSource,
};
use crate::resolver::{ResolverConfig, UpdateDecision, UpdateResolver};
use crate::store::{FileVersionStore, InstalledVersion, MemoryVersionStore, VersionStore};
use crate::version::Version;

/// Builder for [`Updater`].
pub struct UpdaterBuilder {
    config: UpdaterConfig,
    feed: Option<Arc<dyn DocumentFeed>>,
    installer: Option<Arc<dyn PackageInstaller>>,
    reloader: Option<Arc<dyn WebReloader>>,
    store: Option<Arc<dyn VersionStore>>,
    attempt_sinks: Vec<Arc<dyn AttemptSink>>,
    clock: Arc<dyn Clock>,
}

impl UpdaterBuilder {
    pub fn new(config: UpdaterConfig) -> Self {
        Self {
            config,
            feed: None,
            installer: None,
            reloader: None,
            store: None,
            attempt_sinks: Vec::new(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Realtime document feed for the push channel. Takes precedence over
    /// a configured polling URL.
    pub fn document_feed(mut self, feed: Arc<dyn DocumentFeed>) -> Self {
        self.feed = Some(feed);
        self
    }

    /// Installer for native packages.
    pub fn installer(mut self, installer: Arc<dyn PackageInstaller>) -> Self {
        self.installer = Some(installer);
        self
    }

    /// Reload hooks for web builds.
    pub fn web_reloader(mut self, reloader: Arc<dyn WebReloader>) -> Self {
        self.reloader = Some(reloader);
        self
    }

    /// Store for the last applied version, replacing the configured file.
    pub fn version_store(mut self, store: Arc<dyn VersionStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Extra destination for update attempt records, next to the
    /// configured attempt log.
    pub fn attempt_sink(mut self, sink: Arc<dyn AttemptSink>) -> Self {
        self.attempt_sinks.push(sink);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn build(self) -> Result<Updater, UpdateError> {
        let config = self.config;
        config.validate()?;

        let platform = config.platform.current();
        let strict = config.versions.strict;
        let clock = self.clock;

        let fetcher = Arc::new(
            RateLimitAwareFetcher::new(config.network.retry_policy(), &config.network.user_agent)?
                .with_clock(clock.clone()),
        );
        let cache = Arc::new(ResultCache::with_clock(config.cache.ttl(), clock.clone()));
        let bus = Arc::new(EventBus::new());

        let store: Arc<dyn VersionStore> = match (self.store, &config.storage.version_file) {
            (Some(store), _) => store,
            (None, Some(path)) => Arc::new(FileVersionStore::new(path)),
            (None, None) => Arc::new(MemoryVersionStore::new()),
        };
        let installed = Arc::new(InstalledVersion::new(config.versions.build_version(), store));

        let mut sources: Vec<Arc<dyn VersionSource>> = vec![Arc::new(
            PrimaryRegistryProvider::new(fetcher.clone(), &config.repository, platform)
                .with_strict_versions(strict)
                .with_clock(clock.clone()),
        )];
        if let Some(url) = &config.manifest.url {
            sources.push(Arc::new(
                StaticManifestProvider::new(fetcher.clone(), url.clone(), platform)
                    .with_strict_versions(strict)
                    .with_clock(clock.clone()),
            ));
        }

        let feed = match (self.feed, &config.push.feed_url) {
            (Some(feed), _) => Some(feed),
            (None, Some(url)) => Some(Arc::new(PollingDocumentFeed::new(
                fetcher.clone(),
                url.clone(),
                config.push.feed_poll_interval(),
            )) as Arc<dyn DocumentFeed>),
            (None, None) => None,
        };
        let push = match feed {
            Some(feed) if config.push.enabled => Some(Arc::new(
                PushChannelProvider::new(
                    feed,
                    config.push.document_id.clone(),
                    platform,
                    bus.clone(),
                    installed.clone(),
                )
                .with_cache(cache.clone())
                .with_supported_platforms(config.platform.supported.clone())
                .with_strict_versions(strict)
                .with_clock(clock.clone()),
            )),
            _ => {
                debug!("Push channel disabled");
                None
            }
        };

        let mut resolver = UpdateResolver::new(
            ResolverConfig::from(&config),
            sources,
            cache.clone(),
            installed.clone(),
            bus.clone(),
        );
        if let Some(push) = &push {
            resolver = resolver.with_push_channel(push.clone());
        }

        let applier = match (platform, self.reloader, self.installer) {
            (Platform::Web, Some(reloader), _) => Some(UpdateApplier::web(
                reloader,
                installed.clone(),
                bus.clone(),
            )),
            (Platform::Web, None, _) => None,
            (_, _, Some(installer)) => {
                let downloader = PackageDownloader::with_config(
                    &config.network,
                    config.storage.download_dir(),
                )?;
                Some(UpdateApplier::native(
                    downloader,
                    installer,
                    installed.clone(),
                    bus.clone(),
                ))
            }
            (_, _, None) => None,
        };
        let mut attempt_sinks = self.attempt_sinks;
        if let Some(path) = &config.storage.attempt_log {
            attempt_sinks.push(Arc::new(FileAttemptSink::new(path)));
        }
        let applier = applier.map(|applier| {
            attempt_sinks
                .into_iter()
                .fold(applier, |applier, sink| applier.with_attempt_sink(sink))
        });
        if applier.is_none() {
            info!(
                "No installer configured for {}, updates can be found but not applied",
                platform
            );
        }

        Ok(Updater {
            config,
            platform,
            bus,
            cache,
            installed,
            resolver,
            applier,
            push,
        })
    }
}

/// Update orchestration for one running application.
pub struct Updater {
    config: UpdaterConfig,
    platform: Platform,
    bus: Arc<EventBus>,
    cache: Arc<ResultCache>,
    installed: Arc<InstalledVersion>,
    resolver: UpdateResolver,
    applier: Option<UpdateApplier>,
    push: Option<Arc<PushChannelProvider>>,
}

impl Updater {
    pub fn builder(config: UpdaterConfig) -> UpdaterBuilder {
        UpdaterBuilder::new(config)
    }

    pub fn config(&self) -> &UpdaterConfig {
        &self.config
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Version the application is running (or has just applied).
    pub fn current_version(&self) -> Version {
        self.installed.current()
    }

    pub fn resolver(&self) -> &UpdateResolver {
        &self.resolver
    }

    pub fn applier(&self) -> Option<&UpdateApplier> {
        self.applier.as_ref()
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    pub fn push_channel(&self) -> Option<&Arc<PushChannelProvider>> {
        self.push.as_ref()
    }

    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&UpdateEvent) + Send + Sync + 'static,
    {
        self.bus.subscribe(handler)
    }

    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        self.bus.unsubscribe(subscription)
    }

    /// Start background checks and the push channel.
    pub fn start(&self) {
        self.resolver.start();
    }

    pub fn stop(&self) {
        self.resolver.stop();
    }

    pub async fn check_on_start(&self) -> Option<UpdateDecision> {
        self.resolver.check_on_start().await
    }

    pub async fn check_manually(&self) -> UpdateDecision {
        self.resolver.check_manually().await
    }

    /// Apply `candidate`. Without an installer for this platform the
    /// stream holds a single error.
    pub fn apply(&self, candidate: UpdateCandidate) -> ApplyProgress {
        match &self.applier {
            Some(applier) => applier.apply(candidate),
            None => {
                ApplyProgress::rejected(format!("no installer available on {}", self.platform))
            }
        }
    }

    pub fn apply_state(&self) -> ApplyState {
        self.applier
            .as_ref()
            .map(UpdateApplier::state)
            .unwrap_or(ApplyState::Idle)
    }
}

impl Drop for Updater {
    fn drop(&mut self) {
        self.resolver.stop();
    }
}
