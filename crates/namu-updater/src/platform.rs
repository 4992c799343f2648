//! Platform identification and package naming conventions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::UpdateError;

/// Platform family a build was delivered to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Android,
    Ios,
    Desktop,
    Web,
}

impl Platform {
    /// Package file suffixes recognised for this platform, most preferred first.
    ///
    /// Desktop suffixes follow the host OS. Web builds are served, not
    /// installed, so they have no package.
    pub fn package_suffixes(&self) -> &'static [&'static str] {
        match self {
            Self::Android => &[".apk"],
            Self::Ios => &[".ipa"],
            Self::Desktop => desktop_suffixes(),
            Self::Web => &[],
        }
    }

    /// Whether applying an update means installing a downloaded package.
    pub fn installs_package(&self) -> bool {
        !matches!(self, Self::Web)
    }

    /// Key used for this platform in manifest `downloads` maps.
    pub fn manifest_key(&self) -> &'static str {
        match self {
            Self::Android => "android",
            Self::Ios => "ios",
            Self::Desktop => "desktop",
            Self::Web => "web",
        }
    }

    /// Best guess for the platform this binary was compiled for.
    pub fn current() -> Self {
        if cfg!(target_os = "android") {
            Self::Android
        } else if cfg!(target_os = "ios") {
            Self::Ios
        } else if cfg!(target_arch = "wasm32") {
            Self::Web
        } else {
            Self::Desktop
        }
    }
}

fn desktop_suffixes() -> &'static [&'static str] {
    if cfg!(target_os = "windows") {
        &[".exe", ".msi"]
    } else if cfg!(target_os = "macos") {
        &[".dmg"]
    } else {
        &[".AppImage"]
    }
}

impl Default for Platform {
    fn default() -> Self {
        Self::current()
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.manifest_key())
    }
}

impl FromStr for Platform {
    type Err = UpdateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "android" => Ok(Self::Android),
            "ios" => Ok(Self::Ios),
            "desktop" | "windows" | "macos" | "linux" | "electron" => Ok(Self::Desktop),
            "web" => Ok(Self::Web),
            other => Err(UpdateError::ConfigError(format!("unknown platform: {}", other))),
        }
    }
}
