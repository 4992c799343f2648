//! NamuStock updater CLI
//!
//! Operator tool for checking, applying and watching updates with the
//! same pipeline the app embeds.

pub mod cli;
pub mod output;
pub mod settings;

pub use cli::{Cli, Commands};
pub use output::OutputFormat;

/// Process exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    /// Operation completed successfully (exit code 0)
    Success = 0,
    /// General error (exit code 1)
    GeneralError = 1,
    /// Invalid input provided (exit code 2)
    InvalidInput = 2,
    /// No version source answered (exit code 3)
    SourceUnavailable = 3,
    /// Applying the update failed (exit code 4)
    ApplyFailed = 4,
}

impl ExitCode {
    /// Convert to process exit code
    pub fn to_exit_code(self) -> std::process::ExitCode {
        std::process::ExitCode::from(self as u8)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ExitCode::Success => "SUCCESS",
            ExitCode::GeneralError => "GENERAL_ERROR",
            ExitCode::InvalidInput => "INVALID_INPUT",
            ExitCode::SourceUnavailable => "SOURCE_UNAVAILABLE",
            ExitCode::ApplyFailed => "APPLY_FAILED",
        }
    }
}
