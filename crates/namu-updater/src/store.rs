//! Persistence of the last applied version.
//!
//! The running build knows its own version, but after an in-place web
//! reload or a package install the store is the only record of what was
//! actually applied. The installed version is the greater of the two.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::UpdateError;
use crate::version::Version;

/// Storage for the last applied version.
pub trait VersionStore: Send + Sync {
    /// The recorded version, if any.
    fn load(&self) -> Result<Option<Version>, UpdateError>;

    /// Record `version` as applied.
    fn save(&self, version: &Version) -> Result<(), UpdateError>;

    /// Forget the recorded version.
    fn clear(&self) -> Result<(), UpdateError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredVersion {
    version: Version,
    applied_at: DateTime<Utc>,
}

/// JSON file store.
#[derive(Debug, Clone)]
pub struct FileVersionStore {
    path: PathBuf,
}

impl FileVersionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl VersionStore for FileVersionStore {
    fn load(&self) -> Result<Option<Version>, UpdateError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)?;
        let stored: StoredVersion = serde_json::from_str(&content)?;
        Ok(Some(stored.version))
    }

    fn save(&self, version: &Version) -> Result<(), UpdateError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let stored = StoredVersion {
            version: version.clone(),
            applied_at: Utc::now(),
        };
        let content = serde_json::to_string_pretty(&stored)?;

        // Write then rename so a crash never leaves a truncated file.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!("Recorded applied version {} in {:?}", version, self.path);
        Ok(())
    }

    fn clear(&self) -> Result<(), UpdateError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process store, forgotten on exit.
#[derive(Debug, Default)]
pub struct MemoryVersionStore {
    version: Mutex<Option<Version>>,
}

impl MemoryVersionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VersionStore for MemoryVersionStore {
    fn load(&self) -> Result<Option<Version>, UpdateError> {
        Ok(self.version.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    fn save(&self, version: &Version) -> Result<(), UpdateError> {
        *self.version.lock().unwrap_or_else(|e| e.into_inner()) = Some(version.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), UpdateError> {
        *self.version.lock().unwrap_or_else(|e| e.into_inner()) = None;
        Ok(())
    }
}

/// Version the device is running, combining the build and the store.
pub struct InstalledVersion {
    build: Version,
    store: Arc<dyn VersionStore>,
}

impl InstalledVersion {
    pub fn new(build: Version, store: Arc<dyn VersionStore>) -> Self {
        Self { build, store }
    }

    pub fn build_version(&self) -> &Version {
        &self.build
    }

    /// The greater of the build version and the stored one.
    ///
    /// An unreadable store is logged and ignored.
    pub fn current(&self) -> Version {
        match self.store.load() {
            Ok(Some(stored)) if stored > self.build => stored,
            Ok(_) => self.build.clone(),
            Err(e) => {
                warn!("Could not read stored version: {}", e);
                self.build.clone()
            }
        }
    }

    /// Record a successfully applied version.
    pub fn record(&self, version: &Version) -> Result<(), UpdateError> {
        self.store.save(version)
    }

    /// The raw stored version, for rolling back a record.
    pub fn stored(&self) -> Result<Option<Version>, UpdateError> {
        self.store.load()
    }

    /// Put the store back to `previous`, as returned by [`Self::stored`].
    pub fn restore(&self, previous: Option<&Version>) -> Result<(), UpdateError> {
        match previous {
            Some(version) => self.store.save(version),
            None => self.store.clear(),
        }
    }
}
