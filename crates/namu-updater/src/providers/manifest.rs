//! Static `version.json` manifest source.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{parse_reported_version, VersionSource};
use crate::candidate::{SourceName, UpdateCandidate};
use crate::clock::{Clock, SystemClock};
use crate::error::FetchError;
use crate::fetch::{FetchRequest, RateLimitAwareFetcher};
use crate::platform::Platform;

/// Version document published next to the web build and mirrored into the
/// push-channel document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestDocument {
    pub version: String,

    /// ISO 8601 build timestamp
    #[serde(default)]
    pub build_date: Option<String>,

    #[serde(default)]
    pub release_notes: Option<String>,

    /// Feature bullet points, used when there are no release notes
    #[serde(default)]
    pub features: Vec<String>,

    /// Package URL per platform key (`android`, `ios`, `windows`, ...)
    #[serde(default)]
    pub downloads: BTreeMap<String, String>,

    /// Web deployment URL
    #[serde(default)]
    pub base_url: Option<String>,

    /// SHA-256 of each package, keyed like `downloads`
    #[serde(default)]
    pub checksums: BTreeMap<String, String>,
}

impl ManifestDocument {
    /// Normalize into a candidate for `platform`.
    ///
    /// `fallback_time` is used when `buildDate` is missing or unreadable.
    pub fn to_candidate(
        &self,
        source: SourceName,
        platform: Platform,
        strict_versions: bool,
        fallback_time: DateTime<Utc>,
    ) -> Result<UpdateCandidate, FetchError> {
        let version = parse_reported_version(&self.version, strict_versions)?;

        let published_at = self
            .build_date
            .as_deref()
            .and_then(|d| DateTime::parse_from_rfc3339(d).ok())
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or(fallback_time);

        let mut candidate = UpdateCandidate::new(version, source, platform, published_at)
            .with_release_notes(self.notes());

        let key = download_keys(platform)
            .into_iter()
            .find(|k| self.downloads.contains_key(*k));

        match key {
            Some(key) => {
                if let Some(url) = self.downloads.get(key) {
                    candidate = candidate.with_download_url(url.clone());
                }
                if let Some(sum) = self.checksums.get(key) {
                    candidate = candidate.with_sha256(sum.clone());
                }
            }
            None if platform == Platform::Web => {
                if let Some(base) = &self.base_url {
                    candidate = candidate.with_download_url(base.clone());
                }
            }
            None => return Err(FetchError::no_matching_asset(platform)),
        }

        Ok(candidate)
    }

    fn notes(&self) -> String {
        match &self.release_notes {
            Some(notes) if !notes.trim().is_empty() => notes.clone(),
            _ => self
                .features
                .iter()
                .map(|f| format!("- {}", f))
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// Keys a manifest may use for `platform`, most specific first.
fn download_keys(platform: Platform) -> Vec<&'static str> {
    match platform {
        Platform::Desktop => {
            let os_key = if cfg!(target_os = "windows") {
                "windows"
            } else if cfg!(target_os = "macos") {
                "mac"
            } else {
                "linux"
            };
            vec![os_key, platform.manifest_key()]
        }
        _ => vec![platform.manifest_key()],
    }
}

/// Fallback source reading `version.json` with a cache-busting query.
pub struct StaticManifestProvider {
    fetcher: Arc<RateLimitAwareFetcher>,
    url: String,
    platform: Platform,
    strict_versions: bool,
    clock: Arc<dyn Clock>,
}

impl StaticManifestProvider {
    pub fn new(
        fetcher: Arc<RateLimitAwareFetcher>,
        url: impl Into<String>,
        platform: Platform,
    ) -> Self {
        Self {
            fetcher,
            url: url.into(),
            platform,
            strict_versions: false,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_strict_versions(mut self, strict: bool) -> Self {
        self.strict_versions = strict;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

#[async_trait]
impl VersionSource for StaticManifestProvider {
    fn name(&self) -> SourceName {
        SourceName::StaticManifest
    }

    async fn fetch_latest(&self) -> Result<UpdateCandidate, FetchError> {
        let now = self.clock.now();
        let request = FetchRequest::get(&self.url)
            .query("ts", now.timestamp_millis().to_string())
            .header("Cache-Control", "no-cache");

        debug!("Fetching manifest {}", self.url);
        let response = self.fetcher.fetch(&request).await?;
        let document: ManifestDocument = response.json()?;

        let candidate = document.to_candidate(
            SourceName::StaticManifest,
            self.platform,
            self.strict_versions,
            now,
        )?;
        info!("Manifest reports version {}", candidate.version());
        Ok(candidate)
    }
}
