//! Package downloader.
//!
//! Streams a package to disk, reporting progress after every chunk. A
//! failed download removes its partial file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::candidate::UpdateCandidate;
use crate::config::NetworkConfig;
use crate::error::{InstallError, UpdateError};

/// Read timeout for streaming downloads in seconds.
const DEFAULT_READ_TIMEOUT_SECS: u64 = 60;

/// Downloads update packages into a staging directory.
pub struct PackageDownloader {
    /// HTTP client configured with timeouts.
    client: reqwest::Client,
    /// Where packages are written.
    dir: PathBuf,
}

impl PackageDownloader {
    /// Create a downloader using an existing client.
    pub fn new(client: reqwest::Client, dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            dir: dir.into(),
        }
    }

    /// Create a downloader with its own client built from `network`.
    ///
    /// Only the connection phase uses the attempt timeout; a large package
    /// is bounded by the read timeout between chunks instead.
    pub fn with_config(
        network: &NetworkConfig,
        dir: impl Into<PathBuf>,
    ) -> Result<Self, UpdateError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(network.attempt_timeout_seconds))
            .read_timeout(Duration::from_secs(DEFAULT_READ_TIMEOUT_SECS))
            .user_agent(&network.user_agent)
            .build()?;
        Ok(Self::new(client, dir))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Destination file for a candidate's package.
    pub fn package_path(&self, candidate: &UpdateCandidate) -> PathBuf {
        let extension = candidate
            .download_url()
            .and_then(|url| {
                let file_name = url.split(['?', '#']).next()?.rsplit('/').next()?;
                let file_name = file_name.to_ascii_lowercase();
                candidate
                    .platform()
                    .package_suffixes()
                    .iter()
                    .find(|suffix| file_name.ends_with(&suffix.to_ascii_lowercase()))
                    .copied()
            })
            .unwrap_or(".pkg");
        self.dir
            .join(format!("namustock-update-{}{}", candidate.version(), extension))
    }

    /// Download `url` to `dest`, calling `on_progress` after every chunk.
    ///
    /// Returns the number of bytes written.
    pub async fn download<F>(
        &self,
        url: &str,
        dest: &Path,
        mut on_progress: F,
    ) -> Result<u64, InstallError>
    where
        F: FnMut(DownloadProgress) + Send,
    {
        info!("Starting download: {} -> {:?}", url, dest);

        let result = self.stream_to_file(url, dest, &mut on_progress).await;
        if let Err(e) = &result {
            warn!("Download of {} failed: {}", url, e);
            self.cleanup(dest);
        }
        result
    }

    async fn stream_to_file<F>(
        &self,
        url: &str,
        dest: &Path,
        on_progress: &mut F,
    ) -> Result<u64, InstallError>
    where
        F: FnMut(DownloadProgress) + Send,
    {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| InstallError::DownloadFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(InstallError::DownloadFailed(format!(
                "server returned status {}",
                status.as_u16()
            )));
        }

        let total = response.content_length();
        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut downloaded = 0u64;

        // Report initial progress
        on_progress(DownloadProgress::new(downloaded, total));

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| InstallError::DownloadFailed(e.to_string()))?;
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
            on_progress(DownloadProgress::new(downloaded, total));
        }

        // Ensure all data is written to disk
        file.flush().await?;
        file.sync_all().await?;

        if let Some(expected) = total {
            if downloaded != expected {
                return Err(InstallError::DownloadFailed(format!(
                    "size mismatch: expected {} bytes, got {}",
                    expected, downloaded
                )));
            }
        }

        info!("Download complete: {} bytes", downloaded);
        Ok(downloaded)
    }

    /// Remove a downloaded or partial package.
    pub fn cleanup(&self, path: &Path) {
        match std::fs::remove_file(path) {
            Ok(()) => debug!("Removed {:?}", path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Could not remove {:?}: {}", path, e),
        }
    }
}

/// Download progress information.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadProgress {
    /// Bytes downloaded so far.
    pub downloaded: u64,
    /// Total bytes, when the server announced a length.
    pub total: Option<u64>,
}

impl DownloadProgress {
    pub fn new(downloaded: u64, total: Option<u64>) -> Self {
        Self { downloaded, total }
    }

    /// Whole percent complete, capped at 100. `None` when the total is unknown.
    pub fn percent(&self) -> Option<u8> {
        match self.total {
            Some(0) => Some(100),
            Some(total) => Some(((self.downloaded.min(total) * 100) / total) as u8),
            None => None,
        }
    }
}

impl std::fmt::Display for DownloadProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.total, self.percent()) {
            (Some(total), Some(percent)) => {
                write!(f, "{}/{} bytes ({}%)", self.downloaded, total, percent)
            }
            _ => write!(f, "{} bytes", self.downloaded),
        }
    }
}
