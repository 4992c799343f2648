//! Error types for the update system.
//!
//! Fetch-level errors are plain values so the resolver can fall back to the
//! next source. Apply-level errors surface to callers through
//! [`ApplyState::Error`](crate::applier::ApplyState::Error).

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::platform::Platform;

/// Category of a failed fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FetchErrorKind {
    /// Transport failure, timeout, or unreadable body
    Network,
    /// Upstream refused the request because of its rate limit
    RateLimited,
    /// Upstream answered with an error status
    ServerError,
    /// The release has no asset for the current platform
    NoMatchingAsset,
    /// The response body could not be mapped into a candidate
    InvalidPayload,
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => write!(f, "network"),
            Self::RateLimited => write!(f, "rate-limited"),
            Self::ServerError => write!(f, "server-error"),
            Self::NoMatchingAsset => write!(f, "no-matching-asset"),
            Self::InvalidPayload => write!(f, "invalid-payload"),
        }
    }
}

/// A fetch that did not produce a usable response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} error: {detail}")]
pub struct FetchError {
    /// What went wrong
    pub kind: FetchErrorKind,
    /// How long the upstream asked us to wait, when known
    pub retry_after: Option<Duration>,
    /// HTTP status of the last response, when there was one
    pub status: Option<u16>,
    /// Human-readable detail for logs
    pub detail: String,
}

impl FetchError {
    pub fn network(detail: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::Network,
            retry_after: None,
            status: None,
            detail: detail.into(),
        }
    }

    pub fn rate_limited(status: u16, retry_after: Option<Duration>) -> Self {
        Self {
            kind: FetchErrorKind::RateLimited,
            retry_after,
            status: Some(status),
            detail: format!("rate limited with status {}", status),
        }
    }

    pub fn server(status: u16) -> Self {
        Self {
            kind: FetchErrorKind::ServerError,
            retry_after: None,
            status: Some(status),
            detail: format!("upstream returned status {}", status),
        }
    }

    pub fn no_matching_asset(platform: Platform) -> Self {
        Self {
            kind: FetchErrorKind::NoMatchingAsset,
            retry_after: None,
            status: None,
            detail: format!("release has no asset for platform {}", platform),
        }
    }

    pub fn invalid_payload(detail: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::InvalidPayload,
            retry_after: None,
            status: None,
            detail: detail.into(),
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        self.kind == FetchErrorKind::RateLimited
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::network(format!("request timed out: {}", err))
        } else {
            FetchError::network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError::invalid_payload(err.to_string())
    }
}

/// Why a resolution did not produce an available update.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    /// Every configured source failed
    #[error("no update source available")]
    NoSourceAvailable,

    /// Every configured source was rate limited
    #[error("all update sources are rate limited")]
    RateLimited,

    /// Automatic updates are not offered on this platform
    #[error("updates are not supported on platform {0}")]
    PlatformUnsupported(Platform),
}

/// Errors raised while applying an update.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InstallError {
    /// The package could not be downloaded
    #[error("download failed: {0}")]
    DownloadFailed(String),

    /// Downloaded package did not match the published checksum
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    /// The platform installer refused the package
    #[error("installer rejected the package: {0}")]
    InstallRejected(String),

    /// Anything else reported by a collaborator
    #[error("update failed: {0}")]
    Unknown(String),
}

impl From<std::io::Error> for InstallError {
    fn from(err: std::io::Error) -> Self {
        InstallError::DownloadFailed(err.to_string())
    }
}

/// Errors from configuration, persistence, and setup.
#[derive(Debug, Error)]
pub enum UpdateError {
    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Version parsing error
    #[error("version parse error: {0}")]
    VersionParseError(String),

    /// HTTP client could not be constructed
    #[error("HTTP client error: {0}")]
    HttpError(String),

    /// JSON parsing error
    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<reqwest::Error> for UpdateError {
    fn from(err: reqwest::Error) -> Self {
        UpdateError::HttpError(err.to_string())
    }
}
