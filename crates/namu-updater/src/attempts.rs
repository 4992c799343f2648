//! Update attempt records.
//!
//! Every apply that reaches a terminal state produces one [`UpdateAttempt`]
//! and hands it to the configured [`AttemptSink`]s.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::candidate::{SourceName, UpdateCandidate};
use crate::error::UpdateError;
use crate::platform::Platform;
use crate::version::Version;

/// Outcome of one apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateAttempt {
    pub from_version: Version,
    pub to_version: Version,
    pub platform: Platform,
    pub source: SourceName,
    pub success: bool,
    /// Failure detail, absent on success
    pub error: Option<String>,
    pub attempted_at: DateTime<Utc>,
}

impl UpdateAttempt {
    pub fn succeeded(from_version: Version, candidate: &UpdateCandidate) -> Self {
        Self::new(from_version, candidate, None)
    }

    pub fn failed(
        from_version: Version,
        candidate: &UpdateCandidate,
        error: impl Into<String>,
    ) -> Self {
        Self::new(from_version, candidate, Some(error.into()))
    }

    fn new(from_version: Version, candidate: &UpdateCandidate, error: Option<String>) -> Self {
        Self {
            from_version,
            to_version: candidate.version().clone(),
            platform: candidate.platform(),
            source: candidate.source(),
            success: error.is_none(),
            error,
            attempted_at: Utc::now(),
        }
    }

    /// One JSON object per line.
    pub fn to_log_line(&self) -> Result<String, UpdateError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Destination for attempt records.
#[async_trait]
pub trait AttemptSink: Send + Sync {
    async fn record(&self, attempt: &UpdateAttempt) -> Result<(), UpdateError>;
}

/// Keeps the most recent attempts in memory.
#[derive(Debug)]
pub struct MemoryAttemptSink {
    attempts: RwLock<Vec<UpdateAttempt>>,
    max_attempts: usize,
}

impl MemoryAttemptSink {
    pub fn new(max_attempts: usize) -> Self {
        Self {
            attempts: RwLock::new(Vec::with_capacity(max_attempts)),
            max_attempts,
        }
    }

    pub async fn attempts(&self) -> Vec<UpdateAttempt> {
        self.attempts.read().await.clone()
    }
}

impl Default for MemoryAttemptSink {
    fn default() -> Self {
        Self::new(100)
    }
}

#[async_trait]
impl AttemptSink for MemoryAttemptSink {
    async fn record(&self, attempt: &UpdateAttempt) -> Result<(), UpdateError> {
        let mut attempts = self.attempts.write().await;
        if attempts.len() >= self.max_attempts {
            attempts.remove(0);
        }
        attempts.push(attempt.clone());
        Ok(())
    }
}

/// Appends attempts to a JSON-lines file.
#[derive(Debug, Clone)]
pub struct FileAttemptSink {
    path: PathBuf,
}

impl FileAttemptSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read back every recorded attempt, oldest first.
    pub async fn load(&self) -> Result<Vec<UpdateAttempt>, UpdateError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(UpdateError::from))
            .collect()
    }
}

#[async_trait]
impl AttemptSink for FileAttemptSink {
    async fn record(&self, attempt: &UpdateAttempt) -> Result<(), UpdateError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let line = attempt.to_log_line()?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.flush().await?;
        Ok(())
    }
}
