//! Error types for the fleet update core.

use std::process::ExitStatus;

use thiserror::Error;

/// Errors raised while running the external discovery tool.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The discovery executable could not be found
    #[error("discovery tool not found: {0}")]
    ToolMissing(String),

    /// The discovery executable exists but could not be started
    #[error("failed to start discovery tool: {0}")]
    Spawn(#[source] std::io::Error),

    /// The tool exited unsuccessfully before the timeout elapsed
    #[error("discovery tool exited with {status}: {stderr}")]
    ToolFailed { status: ExitStatus, stderr: String },

    /// The tool produced no output at all
    #[error("discovery tool produced no output")]
    NoOutput,

    /// Reading the tool's output failed
    #[error("IO error while reading discovery output: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors returned synchronously by [`crate::session::UpdateSession::start`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StartError {
    /// Another session is still updating
    #[error("update already in progress")]
    AlreadyInProgress,
}

/// Failures inside a running session.
///
/// These never reach the caller of `start`; the session records
/// `state = error` and broadcasts the message instead.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The updater process could not be spawned
    #[error("failed to spawn updater `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Creating the output pipe, reading it or waiting for the child failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An output reader task panicked or was cancelled
    #[error("output reader task failed: {0}")]
    ReaderFailed(String),
}

/// Errors from the log registry.
#[derive(Debug, Error)]
pub enum LogError {
    /// The requested log file does not exist
    #[error("log file not found: {0}")]
    NotFound(String),

    /// Reading the log directory or file failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    /// Failed to parse config file
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Failed to serialize config
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Invalid configuration value
    #[error("invalid configuration: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            StartError::AlreadyInProgress.to_string(),
            "update already in progress"
        );
        assert_eq!(
            LogError::NotFound("flash_logs_1.log".to_string()).to_string(),
            "log file not found: flash_logs_1.log"
        );
        assert_eq!(
            DiscoveryError::ToolMissing("avahi-browse".to_string()).to_string(),
            "discovery tool not found: avahi-browse"
        );
    }

    #[test]
    fn test_session_error_from_io() {
        let err: SessionError =
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed").into();
        assert!(matches!(err, SessionError::Io(_)));
        assert!(err.to_string().contains("pipe closed"));
    }
}
