//! FFU Controller - CLI for fleet firmware updates
//!
//! This crate provides a command-line interface for:
//! - Discovering devices on the network
//! - Running an update session and following its progress
//! - Listing and reading updater logs
//! - Writing and inspecting the controller configuration

pub mod cli;
pub mod config;
pub mod output;

pub use cli::Cli;
pub use config::{CliOverrides, Config};
pub use output::{JsonResponse, OutputFormat, OutputFormatter};

/// Exit codes for CLI operations
///
/// Exit codes provide machine-readable status for scripting and automation:
/// - 0: Success - operation completed successfully
/// - 1: General error - unspecified error occurred
/// - 2: Discovery failed - the discovery tool failed or printed nothing
/// - 3: Session busy - another update session is running
/// - 4: Session error - the updater could not be started or read
/// - 5: Invalid input - bad arguments or data provided
/// - 6: Update failures - the session finished but reported failures
/// - 7: Log not found - the requested log file does not exist
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Operation completed successfully (exit code 0)
    Success = 0,
    /// General error (exit code 1)
    GeneralError = 1,
    /// Discovery failed (exit code 2)
    DiscoveryFailed = 2,
    /// Session already running (exit code 3)
    SessionBusy = 3,
    /// Session ended in the error state (exit code 4)
    SessionError = 4,
    /// Invalid input provided (exit code 5)
    InvalidInput = 5,
    /// Updater reported failures (exit code 6)
    UpdateFailures = 6,
    /// Log file not found (exit code 7)
    LogNotFound = 7,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl ExitCode {
    /// Every exit code, in numeric order
    pub const ALL: [ExitCode; 8] = [
        ExitCode::Success,
        ExitCode::GeneralError,
        ExitCode::DiscoveryFailed,
        ExitCode::SessionBusy,
        ExitCode::SessionError,
        ExitCode::InvalidInput,
        ExitCode::UpdateFailures,
        ExitCode::LogNotFound,
    ];

    /// Convert to process exit code
    pub fn to_exit_code(self) -> std::process::ExitCode {
        std::process::ExitCode::from(self as u8)
    }

    /// Get the exit code name as a string
    pub fn name(&self) -> &'static str {
        match self {
            ExitCode::Success => "SUCCESS",
            ExitCode::GeneralError => "GENERAL_ERROR",
            ExitCode::DiscoveryFailed => "DISCOVERY_FAILED",
            ExitCode::SessionBusy => "SESSION_BUSY",
            ExitCode::SessionError => "SESSION_ERROR",
            ExitCode::InvalidInput => "INVALID_INPUT",
            ExitCode::UpdateFailures => "UPDATE_FAILURES",
            ExitCode::LogNotFound => "LOG_NOT_FOUND",
        }
    }

    /// Get a human-readable description of the exit code
    pub fn description(&self) -> &'static str {
        match self {
            ExitCode::Success => "Operation completed successfully",
            ExitCode::GeneralError => "An unspecified error occurred",
            ExitCode::DiscoveryFailed => "Device discovery failed",
            ExitCode::SessionBusy => "An update session is already running",
            ExitCode::SessionError => "The updater could not be started or read",
            ExitCode::InvalidInput => "Invalid arguments or data provided",
            ExitCode::UpdateFailures => "The updater reported failed updates",
            ExitCode::LogNotFound => "The requested log file does not exist",
        }
    }
}
