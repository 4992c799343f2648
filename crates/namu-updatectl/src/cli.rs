//! CLI command definitions and argument parsing

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use futures_util::StreamExt;
use namu_updater::{
    ApplyState, CommandInstaller, DecisionReason, Platform, UpdateDecision, Updater,
    UpdaterConfig,
};

use crate::output::{
    format_apply_state, format_config, format_decision, format_event, OutputFormat,
};
use crate::settings::{self, Overrides};
use crate::ExitCode;

/// NamuStock updater CLI
#[derive(Parser, Debug)]
#[command(name = "namu-updatectl")]
#[command(version, about = "Check for, apply and watch NamuStock updates")]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format: table, json, quiet
    #[arg(long, default_value = "table", global = true)]
    pub output: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Config file path
    #[arg(long, global = true, env = "NAMU_UPDATER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Platform to resolve for (android, ios, desktop, web)
    #[arg(long, global = true)]
    pub platform: Option<Platform>,

    /// Version of the running build
    #[arg(long, global = true)]
    pub build_version: Option<String>,

    /// URL of the static version manifest
    #[arg(long, global = true)]
    pub manifest_url: Option<String>,

    /// Reject malformed version strings
    #[arg(long, global = true)]
    pub strict_versions: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check whether a newer version is available
    Check,
    /// Download and install the latest version
    Apply(ApplyArgs),
    /// Keep running and print update events until interrupted
    Watch,
    /// Manage the configuration file
    #[command(subcommand)]
    Config(ConfigCommands),
}

/// Arguments for the apply command
#[derive(Args, Debug)]
pub struct ApplyArgs {
    /// Program that installs the package; receives the package path last
    #[arg(long)]
    pub installer: PathBuf,

    /// Argument passed to the installer before the package path (repeatable)
    #[arg(long = "installer-arg", allow_hyphen_values = true)]
    pub installer_args: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration
    Show,
    /// Print the config file path
    Path,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            platform: self.platform,
            build_version: self.build_version.clone(),
            manifest_url: self.manifest_url.clone(),
            strict_versions: self.strict_versions,
        }
    }

    /// Load the config file and apply command-line overrides.
    pub fn resolve_config(&self) -> anyhow::Result<UpdaterConfig> {
        let path = settings::config_path(self.config.as_deref())?;
        self.overrides().apply(settings::load(&path)?)
    }

    /// Execute the CLI command
    pub async fn execute(self) -> anyhow::Result<ExitCode> {
        let output = self.output;
        match &self.command {
            Commands::Check => {
                let updater = Updater::builder(self.resolve_config()?).build()?;
                check(&updater, output).await
            }
            Commands::Apply(args) => {
                let installer = CommandInstaller::new(&args.installer)
                    .with_args(args.installer_args.iter().cloned());
                let updater = Updater::builder(self.resolve_config()?)
                    .installer(Arc::new(installer))
                    .build()?;
                apply(&updater, output).await
            }
            Commands::Watch => {
                let updater = Updater::builder(self.resolve_config()?).build()?;
                watch(&updater, output).await
            }
            Commands::Config(command) => self.config_command(command, output),
        }
    }

    fn config_command(
        &self,
        command: &ConfigCommands,
        output: OutputFormat,
    ) -> anyhow::Result<ExitCode> {
        let path = settings::config_path(self.config.as_deref())?;
        match command {
            ConfigCommands::Init { force } => {
                if path.exists() && !force {
                    eprintln!("Config already exists at {} (use --force)", path.display());
                    return Ok(ExitCode::InvalidInput);
                }
                let mut config = UpdaterConfig::default();
                config.storage.version_file = settings::default_version_file();
                config.storage.attempt_log = settings::default_attempt_log();
                config.save_to_file(&path)?;
                if output != OutputFormat::Quiet {
                    println!("Wrote {}", path.display());
                }
            }
            ConfigCommands::Show => {
                if let Some(text) = format_config(&self.resolve_config()?, output)? {
                    println!("{text}");
                }
            }
            ConfigCommands::Path => {
                if output != OutputFormat::Quiet {
                    println!("{}", path.display());
                }
            }
        }
        Ok(ExitCode::Success)
    }
}

fn exit_code_for(decision: &UpdateDecision) -> ExitCode {
    match decision.reason {
        DecisionReason::NoSourceAvailable | DecisionReason::RateLimited => {
            ExitCode::SourceUnavailable
        }
        _ => ExitCode::Success,
    }
}

async fn check(updater: &Updater, output: OutputFormat) -> anyhow::Result<ExitCode> {
    let decision = updater.check_manually().await;
    if let Some(text) = format_decision(&decision, output) {
        println!("{text}");
    }
    Ok(exit_code_for(&decision))
}

async fn apply(updater: &Updater, output: OutputFormat) -> anyhow::Result<ExitCode> {
    let decision = updater.check_manually().await;
    if let Some(text) = format_decision(&decision, output) {
        println!("{text}");
    }
    if !decision.available {
        return Ok(exit_code_for(&decision));
    }
    let Some(candidate) = decision.candidate else {
        return Ok(ExitCode::Success);
    };

    let mut progress = updater.apply(candidate);
    let mut last = ApplyState::Idle;
    while let Some(state) = progress.next().await {
        if let Some(text) = format_apply_state(&state, output) {
            println!("{text}");
        }
        last = state;
    }

    match last {
        ApplyState::Completed => Ok(ExitCode::Success),
        ApplyState::Error(detail) => {
            tracing::error!("Update failed: {}", detail);
            Ok(ExitCode::ApplyFailed)
        }
        other => {
            tracing::warn!("Apply ended in unexpected state {}", other);
            Ok(ExitCode::ApplyFailed)
        }
    }
}

async fn watch(updater: &Updater, output: OutputFormat) -> anyhow::Result<ExitCode> {
    let subscription = updater.subscribe(move |event| {
        if let Some(text) = format_event(event, output) {
            println!("{text}");
        }
    });

    updater.start();
    if let Some(decision) = updater.check_on_start().await {
        if let Some(text) = format_decision(&decision, output) {
            println!("{text}");
        }
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;

    updater.stop();
    updater.unsubscribe(subscription);
    Ok(ExitCode::Success)
}
