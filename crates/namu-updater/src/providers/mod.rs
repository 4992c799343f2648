//! Version sources.
//!
//! Each source asks one backend for the latest published build and
//! normalizes the answer into an [`UpdateCandidate`].

use async_trait::async_trait;

use crate::candidate::{SourceName, UpdateCandidate};
use crate::error::FetchError;
use crate::version::Version;

pub mod manifest;
pub mod push;
pub mod registry;

pub use manifest::{ManifestDocument, StaticManifestProvider};
pub use push::{DocumentFeed, DocumentStream, PollingDocumentFeed, PushChannelProvider};
pub use registry::PrimaryRegistryProvider;

/// A backend that can report the latest available version.
#[async_trait]
pub trait VersionSource: Send + Sync {
    /// Cache key and log label of this source.
    fn name(&self) -> SourceName;

    /// Fetch the newest version this source knows about.
    async fn fetch_latest(&self) -> Result<UpdateCandidate, FetchError>;
}

/// Parse a version reported by a backend.
///
/// In strict mode a malformed version makes the whole payload invalid.
pub(crate) fn parse_reported_version(raw: &str, strict: bool) -> Result<Version, FetchError> {
    if strict {
        Version::parse_strict(raw)
            .map_err(|e| FetchError::invalid_payload(format!("bad version {:?}: {}", raw, e)))
    } else {
        Ok(Version::parse(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchErrorKind;

    #[test]
    fn test_lenient_parse_accepts_garbage() {
        let version = parse_reported_version("v1.x.3", false).unwrap();
        assert_eq!(version.components(), &[1, 0, 3]);
    }

    #[test]
    fn test_strict_parse_rejects_garbage() {
        let err = parse_reported_version("1.x.3", true).unwrap_err();
        assert_eq!(err.kind, FetchErrorKind::InvalidPayload);
        assert!(parse_reported_version("v2.0.1", true).is_ok());
    }
}
