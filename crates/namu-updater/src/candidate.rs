//! Normalized records produced by version sources.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::platform::Platform;
use crate::version::Version;

/// Identity of a version source. Also the cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceName {
    /// Release-hosting API (GitHub releases)
    PrimaryRegistry,
    /// `version.json` served alongside the web build
    StaticManifest,
    /// Remote document with change subscriptions
    PushChannel,
}

impl fmt::Display for SourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PrimaryRegistry => write!(f, "primary-registry"),
            Self::StaticManifest => write!(f, "static-manifest"),
            Self::PushChannel => write!(f, "push-channel"),
        }
    }
}

/// A version reported by a source, not yet confirmed newer than the running build.
///
/// Fields are private so a candidate cannot change after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateCandidate {
    version: Version,
    download_url: Option<String>,
    release_notes: String,
    published_at: DateTime<Utc>,
    source: SourceName,
    platform: Platform,
    sha256: Option<String>,
}

impl UpdateCandidate {
    pub fn new(
        version: Version,
        source: SourceName,
        platform: Platform,
        published_at: DateTime<Utc>,
    ) -> Self {
        Self {
            version,
            download_url: None,
            release_notes: String::new(),
            published_at,
            source,
            platform,
            sha256: None,
        }
    }

    pub fn with_download_url(mut self, url: impl Into<String>) -> Self {
        self.download_url = Some(url.into());
        self
    }

    pub fn with_release_notes(mut self, notes: impl Into<String>) -> Self {
        self.release_notes = notes.into();
        self
    }

    /// Attach the expected SHA-256 of the package, hex encoded.
    pub fn with_sha256(mut self, hex_digest: impl Into<String>) -> Self {
        self.sha256 = Some(hex_digest.into().to_ascii_lowercase());
        self
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    pub fn download_url(&self) -> Option<&str> {
        self.download_url.as_deref()
    }

    pub fn release_notes(&self) -> &str {
        &self.release_notes
    }

    pub fn published_at(&self) -> DateTime<Utc> {
        self.published_at
    }

    pub fn source(&self) -> SourceName {
        self.source
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn sha256(&self) -> Option<&str> {
        self.sha256.as_deref()
    }
}
