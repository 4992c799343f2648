//! Configuration structures for the update system.
//!
//! Every section has serde defaults so a partial TOML file is valid.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::UpdateError;
use crate::fetch::RetryPolicy;
use crate::platform::Platform;
use crate::version::Version;

/// Main updater configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdaterConfig {
    /// Minutes between background checks; unset disables polling
    #[serde(default)]
    pub poll_interval_minutes: Option<u64>,

    /// Release-hosting repository (primary registry)
    #[serde(default)]
    pub repository: RepositoryConfig,

    /// Static `version.json` fallback
    #[serde(default)]
    pub manifest: ManifestConfig,

    /// Push-channel document
    #[serde(default)]
    pub push: PushConfig,

    /// Retry and timeout settings
    #[serde(default)]
    pub network: NetworkConfig,

    /// Result cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Platform gating
    #[serde(default)]
    pub platform: PlatformConfig,

    /// Version handling
    #[serde(default)]
    pub versions: VersionConfig,

    /// Local files
    #[serde(default)]
    pub storage: StorageConfig,
}

impl UpdaterConfig {
    /// Load configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self, UpdateError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&content).map_err(|e| UpdateError::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save_to_file(&self, path: &Path) -> Result<(), UpdateError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| UpdateError::ConfigError(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check values that serde cannot.
    pub fn validate(&self) -> Result<(), UpdateError> {
        if self.repository.owner.trim().is_empty() || self.repository.name.trim().is_empty() {
            return Err(UpdateError::ConfigError(
                "repository owner and name must not be empty".to_string(),
            ));
        }
        if self.cache.ttl_seconds == 0 {
            return Err(UpdateError::ConfigError("cache ttl must be positive".to_string()));
        }
        if self.network.attempt_timeout_seconds == 0 {
            return Err(UpdateError::ConfigError(
                "attempt timeout must be positive".to_string(),
            ));
        }
        if self.platform.supported.is_empty() {
            return Err(UpdateError::ConfigError(
                "at least one platform must be supported".to_string(),
            ));
        }
        if self.push.feed_url.is_some() && self.push.feed_poll_seconds == 0 {
            return Err(UpdateError::ConfigError(
                "push feed poll interval must be positive".to_string(),
            ));
        }
        if let Some(0) = self.poll_interval_minutes {
            return Err(UpdateError::ConfigError(
                "poll interval must be positive when set".to_string(),
            ));
        }
        if self.versions.strict {
            Version::parse_strict(&self.versions.build_version)?;
        }
        Ok(())
    }

    /// Interval of the background check task, if enabled.
    pub fn poll_interval(&self) -> Option<Duration> {
        self.poll_interval_minutes.map(|m| Duration::from_secs(m * 60))
    }
}

/// Primary registry location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Repository owner
    #[serde(default = "default_owner")]
    pub owner: String,

    /// Repository name
    #[serde(default = "default_repo")]
    pub name: String,

    /// API base URL (overridable for enterprise hosts and tests)
    #[serde(default = "default_api_base")]
    pub api_base_url: String,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            owner: default_owner(),
            name: default_repo(),
            api_base_url: default_api_base(),
        }
    }
}

impl RepositoryConfig {
    /// URL of the latest release endpoint.
    pub fn latest_release_url(&self) -> String {
        format!(
            "{}/repos/{}/{}/releases/latest",
            self.api_base_url.trim_end_matches('/'),
            self.owner,
            self.name
        )
    }
}

/// Static manifest location.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManifestConfig {
    /// Full URL of `version.json`; unset disables the source
    #[serde(default)]
    pub url: Option<String>,
}

/// Push channel settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushConfig {
    /// Whether the push channel is started with the resolver
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Identifier of the watched document
    #[serde(default = "default_document_id")]
    pub document_id: String,

    /// Base URL polled for the document when no realtime feed is supplied
    #[serde(default)]
    pub feed_url: Option<String>,

    /// Seconds between polls of `feed_url`
    #[serde(default = "default_feed_poll")]
    pub feed_poll_seconds: u64,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            document_id: default_document_id(),
            feed_url: None,
            feed_poll_seconds: default_feed_poll(),
        }
    }
}

impl PushConfig {
    pub fn feed_poll_interval(&self) -> Duration {
        Duration::from_secs(self.feed_poll_seconds)
    }
}

/// Network configuration for source fetches and downloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Timeout for each individual attempt in seconds
    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_seconds: u64,

    /// Retries after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base backoff delay in milliseconds, doubled per attempt
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Longest rate-limit reset we are willing to sleep through, in seconds
    #[serde(default = "default_max_rate_limit_wait")]
    pub max_rate_limit_wait_seconds: u64,

    /// User agent sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            attempt_timeout_seconds: default_attempt_timeout(),
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_rate_limit_wait_seconds: default_max_rate_limit_wait(),
            user_agent: default_user_agent(),
        }
    }
}

impl NetworkConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_rate_limit_wait: Duration::from_secs(self.max_rate_limit_wait_seconds),
            attempt_timeout: Duration::from_secs(self.attempt_timeout_seconds),
        }
    }
}

/// Result cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Seconds a fetched candidate stays fresh
    #[serde(default = "default_ttl")]
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_ttl(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

/// Platform gating configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Platform of the running build; detected when unset
    #[serde(default)]
    pub current: Option<Platform>,

    /// Platforms eligible for automatic updates
    #[serde(default = "default_supported")]
    pub supported: Vec<Platform>,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            current: None,
            supported: default_supported(),
        }
    }
}

impl PlatformConfig {
    pub fn current(&self) -> Platform {
        self.current.unwrap_or_else(Platform::current)
    }

    pub fn is_supported(&self, platform: Platform) -> bool {
        self.supported.contains(&platform)
    }
}

/// Version handling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionConfig {
    /// Version compiled into the running build
    #[serde(default = "default_build_version")]
    pub build_version: String,

    /// Reject malformed version strings instead of coercing segments to 0
    #[serde(default)]
    pub strict: bool,
}

impl Default for VersionConfig {
    fn default() -> Self {
        Self {
            build_version: default_build_version(),
            strict: false,
        }
    }
}

impl VersionConfig {
    pub fn build_version(&self) -> Version {
        Version::parse(&self.build_version)
    }
}

/// Local storage locations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// File holding the last applied version (empty = in-memory only)
    #[serde(default)]
    pub version_file: Option<PathBuf>,

    /// Directory for staging downloaded packages (empty = default location)
    #[serde(default)]
    pub download_dir: Option<PathBuf>,

    /// JSON-lines file receiving one record per update attempt (empty = not kept)
    #[serde(default)]
    pub attempt_log: Option<PathBuf>,
}

impl StorageConfig {
    /// Get the download directory, using default if not specified.
    pub fn download_dir(&self) -> PathBuf {
        match &self.download_dir {
            Some(dir) => dir.clone(),
            None => std::env::temp_dir().join("namustock-updates"),
        }
    }
}

// Default value functions for serde
fn default_owner() -> String {
    "LautaroBravo08".to_string()
}

fn default_repo() -> String {
    "namustock-app".to_string()
}

fn default_api_base() -> String {
    "https://api.github.com".to_string()
}

fn default_document_id() -> String {
    "app-version".to_string()
}

fn default_feed_poll() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_attempt_timeout() -> u64 {
    15
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_rate_limit_wait() -> u64 {
    60
}

fn default_user_agent() -> String {
    format!("namu-updater/{}", env!("CARGO_PKG_VERSION"))
}

fn default_ttl() -> u64 {
    10 * 60
}

fn default_supported() -> Vec<Platform> {
    vec![Platform::Android]
}

fn default_build_version() -> String {
    "0.0.0".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = UpdaterConfig::default();
        assert_eq!(config.cache.ttl(), Duration::from_secs(600));
        assert_eq!(config.network.max_retries, 3);
        assert_eq!(config.platform.supported, vec![Platform::Android]);
        assert!(config.push.enabled);
        assert!(config.manifest.url.is_none());
        assert!(config.poll_interval().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_latest_release_url() {
        let repo = RepositoryConfig {
            owner: "acme".to_string(),
            name: "stock".to_string(),
            api_base_url: "http://localhost:9000/".to_string(),
        };
        assert_eq!(
            repo.latest_release_url(),
            "http://localhost:9000/repos/acme/stock/releases/latest"
        );
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: UpdaterConfig = toml::from_str(
            r#"
            poll_interval_minutes = 30

            [platform]
            current = "android"

            [manifest]
            url = "https://stock.example.com/version.json"
            "#,
        )
        .unwrap();

        assert_eq!(config.platform.current(), Platform::Android);
        assert_eq!(config.poll_interval(), Some(Duration::from_secs(1800)));
        assert_eq!(config.network.base_delay_ms, 1000);
        assert_eq!(
            config.manifest.url.as_deref(),
            Some("https://stock.example.com/version.json")
        );
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = UpdaterConfig::default();
        config.platform.supported.clear();
        assert!(config.validate().is_err());

        let mut config = UpdaterConfig::default();
        config.poll_interval_minutes = Some(0);
        assert!(config.validate().is_err());

        let mut config = UpdaterConfig::default();
        config.versions.strict = true;
        config.versions.build_version = "1.x".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load_roundtrip_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("updater.toml");

        let mut config = UpdaterConfig::default();
        config.versions.build_version = "1.0.77".to_string();
        config.save_to_file(&path).unwrap();

        let loaded = UpdaterConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.versions.build_version(), Version::parse("1.0.77"));
    }

    #[test]
    fn test_retry_policy_from_network_config() {
        let policy = NetworkConfig::default().retry_policy();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.base_delay, Duration::from_secs(1));
        assert_eq!(policy.attempt_timeout, Duration::from_secs(15));
    }
}
