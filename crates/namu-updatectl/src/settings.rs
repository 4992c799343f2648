//! Config file location and command-line overrides.

use std::path::{Path, PathBuf};

use anyhow::Context;
use namu_updater::{Platform, UpdaterConfig};

/// Default config path:
/// - Linux: `~/.config/namustock/updater.toml`
/// - macOS: `~/Library/Application Support/app.namustock.namustock/updater.toml`
/// - Windows: `%APPDATA%\namustock\namustock\config\updater.toml`
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("app", "namustock", "namustock")
        .map(|dirs| dirs.config_dir().join("updater.toml"))
}

/// Default location of the last-applied version file.
pub fn default_version_file() -> Option<PathBuf> {
    directories::ProjectDirs::from("app", "namustock", "namustock")
        .map(|dirs| dirs.data_dir().join("applied-version.json"))
}

/// Default location of the update attempt log.
pub fn default_attempt_log() -> Option<PathBuf> {
    directories::ProjectDirs::from("app", "namustock", "namustock")
        .map(|dirs| dirs.data_dir().join("update-attempts.jsonl"))
}

/// Resolve the config path from the flag or the platform default.
pub fn config_path(custom: Option<&Path>) -> anyhow::Result<PathBuf> {
    match custom {
        Some(path) => Ok(path.to_path_buf()),
        None => default_config_path().context("no home directory to place the config in"),
    }
}

/// Load the config at `path`, falling back to defaults when it is missing.
pub fn load(path: &Path) -> anyhow::Result<UpdaterConfig> {
    if !path.exists() {
        tracing::debug!("No config at {:?}, using defaults", path);
        let mut config = UpdaterConfig::default();
        config.storage.version_file = default_version_file();
        config.storage.attempt_log = default_attempt_log();
        return Ok(config);
    }
    UpdaterConfig::load_from_file(path)
        .with_context(|| format!("failed to load config from {}", path.display()))
}

/// Values given on the command line that win over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub platform: Option<Platform>,
    pub build_version: Option<String>,
    pub manifest_url: Option<String>,
    pub strict_versions: bool,
}

impl Overrides {
    pub fn apply(&self, mut config: UpdaterConfig) -> anyhow::Result<UpdaterConfig> {
        if let Some(platform) = self.platform {
            config.platform.current = Some(platform);
        }
        if let Some(version) = &self.build_version {
            config.versions.build_version = version.clone();
        }
        if let Some(url) = &self.manifest_url {
            config.manifest.url = Some(url.clone());
        }
        if self.strict_versions {
            config.versions.strict = true;
        }
        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}
