//! Release-hosting API source (GitHub `releases/latest`).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info};

use super::{parse_reported_version, VersionSource};
use crate::candidate::{SourceName, UpdateCandidate};
use crate::clock::{Clock, SystemClock};
use crate::config::RepositoryConfig;
use crate::error::FetchError;
use crate::fetch::{FetchRequest, RateLimitAwareFetcher};
use crate::platform::Platform;

/// Subset of the release payload we read.
#[derive(Debug, Clone, Deserialize)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

/// A downloadable file attached to a release.
#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    pub browser_download_url: String,
}

impl Release {
    /// Pick the package for `platform`.
    ///
    /// Suffixes are tried in preference order; within one suffix an asset
    /// whose name mentions `release` beats the others.
    pub fn select_asset(&self, platform: Platform) -> Option<&ReleaseAsset> {
        for suffix in platform.package_suffixes() {
            let matching: Vec<&ReleaseAsset> = self
                .assets
                .iter()
                .filter(|a| a.name.to_ascii_lowercase().ends_with(&suffix.to_ascii_lowercase()))
                .collect();

            if let Some(asset) = matching
                .iter()
                .find(|a| a.name.to_ascii_lowercase().contains("release"))
                .or_else(|| matching.first())
            {
                return Some(asset);
            }
        }
        None
    }
}

/// Highest-priority source: the latest published release.
pub struct PrimaryRegistryProvider {
    fetcher: Arc<RateLimitAwareFetcher>,
    url: String,
    platform: Platform,
    strict_versions: bool,
    clock: Arc<dyn Clock>,
}

impl PrimaryRegistryProvider {
    pub fn new(
        fetcher: Arc<RateLimitAwareFetcher>,
        repository: &RepositoryConfig,
        platform: Platform,
    ) -> Self {
        Self {
            fetcher,
            url: repository.latest_release_url(),
            platform,
            strict_versions: false,
            clock: Arc::new(SystemClock),
        }
    }

    /// Reject releases whose tag is not a well-formed version.
    pub fn with_strict_versions(mut self, strict: bool) -> Self {
        self.strict_versions = strict;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn to_candidate(&self, release: Release) -> Result<UpdateCandidate, FetchError> {
        let version = parse_reported_version(&release.tag_name, self.strict_versions)?;
        let published_at = release.published_at.unwrap_or_else(|| self.clock.now());

        let mut candidate =
            UpdateCandidate::new(version, SourceName::PrimaryRegistry, self.platform, published_at)
                .with_release_notes(release.body.clone().unwrap_or_default());

        if self.platform.installs_package() {
            let asset = release
                .select_asset(self.platform)
                .ok_or_else(|| FetchError::no_matching_asset(self.platform))?;
            debug!("Selected release asset {}", asset.name);
            candidate = candidate.with_download_url(asset.browser_download_url.clone());
        }

        Ok(candidate)
    }
}

#[async_trait]
impl VersionSource for PrimaryRegistryProvider {
    fn name(&self) -> SourceName {
        SourceName::PrimaryRegistry
    }

    async fn fetch_latest(&self) -> Result<UpdateCandidate, FetchError> {
        let request = FetchRequest::get(&self.url).header("Accept", "application/vnd.github+json");
        let response = self.fetcher.fetch(&request).await?;
        let release: Release = response.json()?;

        let candidate = self.to_candidate(release)?;
        info!("Latest release is {}", candidate.version());
        Ok(candidate)
    }
}
