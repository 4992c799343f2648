//! # namu-updater
//!
//! Update orchestration for the NamuStock client.
//!
//! This crate handles:
//! - Dotted-integer version comparison
//! - Rate-limit aware fetching with retries and backoff
//! - Per-source result caching with stale fallback
//! - Three version sources (release registry, static manifest, push channel)
//! - Update resolution with request coalescing and platform gating
//! - Applying an update (download, checksum, install, web reload)
//! - A record of every update attempt
//! - An in-process event bus for update notifications
//!
//! Failures while looking for updates never reach the user as errors: they
//! resolve to "no update" with a reason attached.

pub mod applier;
pub mod attempts;
pub mod cache;
pub mod candidate;
pub mod clock;
pub mod config;
pub mod download;
pub mod error;
pub mod events;
pub mod fetch;
pub mod install;
pub mod integrity;
pub mod platform;
pub mod providers;
#[cfg(test)]
mod proptests;
pub mod resolver;
pub mod service;
pub mod store;
pub mod version;

// Re-export main types for convenience
pub use applier::{ApplyBackend, ApplyProgress, ApplyState, UpdateApplier};
pub use attempts::{AttemptSink, FileAttemptSink, MemoryAttemptSink, UpdateAttempt};
pub use cache::{CacheEntry, ResultCache};
pub use candidate::{SourceName, UpdateCandidate};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::UpdaterConfig;
pub use download::{DownloadProgress, PackageDownloader};
pub use error::{FetchError, FetchErrorKind, InstallError, ResolutionError, UpdateError};
pub use events::{EventBus, Subscription, UpdateEvent};
pub use fetch::{FetchRequest, FetchResponse, RateLimitAwareFetcher, RateLimitInfo, RetryPolicy};
pub use install::{CommandInstaller, PackageInstaller, WebReloader};
pub use platform::Platform;
pub use providers::{
    DocumentFeed, DocumentStream, ManifestDocument, PollingDocumentFeed,
    PrimaryRegistryProvider, PushChannelProvider, StaticManifestProvider, VersionSource,
};
pub use resolver::{DecisionReason, ResolverConfig, ResolverState, UpdateDecision, UpdateResolver};
pub use service::{Updater, UpdaterBuilder};
pub use store::{FileVersionStore, InstalledVersion, MemoryVersionStore, VersionStore};
pub use version::{compare, is_newer, Version};
