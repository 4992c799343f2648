//! Installation collaborators.
//!
//! The updater never installs anything itself. Native builds hand the
//! downloaded package to a [`PackageInstaller`]; web builds ask a
//! [`WebReloader`] to drop cached assets and reload.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::InstallError;

/// Platform package installer (Android package installer, desktop setup, ...).
#[async_trait]
pub trait PackageInstaller: Send + Sync {
    /// Install the package at `package`.
    async fn install(&self, package: &Path) -> Result<(), InstallError>;
}

/// Host hooks used to apply a web update.
#[async_trait]
pub trait WebReloader: Send + Sync {
    /// Drop locally cached assets so the reload fetches the new build.
    async fn invalidate_cache(&self) -> Result<(), InstallError>;

    /// Reload the application.
    async fn reload(&self) -> Result<(), InstallError>;
}

/// Installs a package by running an external program with the package path
/// as its last argument.
#[derive(Debug, Clone)]
pub struct CommandInstaller {
    program: PathBuf,
    args: Vec<OsString>,
}

impl CommandInstaller {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Arguments placed before the package path.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    fn run(&self, package: &Path) -> Result<(), InstallError> {
        debug!("Running {:?} {:?} {:?}", self.program, self.args, package);
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(package)
            .output()
            .map_err(|e| {
                InstallError::Unknown(format!("failed to run {}: {}", self.program.display(), e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(InstallError::InstallRejected(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                stderr.trim()
            )));
        }

        info!("Installer {} accepted {:?}", self.program.display(), package);
        Ok(())
    }
}

#[async_trait]
impl PackageInstaller for CommandInstaller {
    async fn install(&self, package: &Path) -> Result<(), InstallError> {
        let installer = self.clone();
        let package = package.to_path_buf();
        tokio::task::spawn_blocking(move || installer.run(&package))
            .await
            .map_err(|e| InstallError::Unknown(format!("installer task failed: {}", e)))?
    }
}
