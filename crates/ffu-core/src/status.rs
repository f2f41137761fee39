//! The shared status record describing the current (or last) session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of the update service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No session has run since startup
    #[default]
    Idle,
    /// Reserved for request layers that surface discovery as a state;
    /// the core itself never enters it
    Discovering,
    /// An updater process is running
    Updating,
    /// The updater process exited
    Completed,
    /// The updater could not be spawned or read
    Error,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Discovering => write!(f, "discovering"),
            SessionState::Updating => write!(f, "updating"),
            SessionState::Completed => write!(f, "completed"),
            SessionState::Error => write!(f, "error"),
        }
    }
}

/// Snapshot of session progress.
///
/// Invariants: `completed_devices <= total_devices` and
/// `upload_progress` stays within `[0, 100]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub state: SessionState,
    pub current_device: Option<String>,
    pub total_devices: u32,
    pub completed_devices: u32,
    pub successful_updates: u32,
    pub failed_updates: u32,
    pub skipped_updates: u32,
    pub upload_progress: f64,
    pub log_file: Option<String>,
    pub last_update: DateTime<Utc>,
}

impl Default for StatusRecord {
    fn default() -> Self {
        Self {
            state: SessionState::Idle,
            current_device: None,
            total_devices: 0,
            completed_devices: 0,
            successful_updates: 0,
            failed_updates: 0,
            skipped_updates: 0,
            upload_progress: 0.0,
            log_file: None,
            last_update: Utc::now(),
        }
    }
}

impl StatusRecord {
    /// Fresh record for a session over `total_devices` devices.
    pub fn for_session(total_devices: u32) -> Self {
        Self {
            state: SessionState::Updating,
            total_devices,
            ..Self::default()
        }
    }

    /// Record an update to the timestamp.
    pub fn touch(&mut self) {
        self.last_update = Utc::now();
    }

    pub fn set_progress(&mut self, percent: f64) {
        self.upload_progress = if percent.is_nan() {
            0.0
        } else {
            percent.clamp(0.0, 100.0)
        };
    }

    /// Count one more device as done, never exceeding `total_devices`.
    pub fn complete_device(&mut self) {
        if self.completed_devices < self.total_devices {
            self.completed_devices += 1;
        }
    }

    /// Freeze the record after the updater exited.
    pub fn finish(&mut self) {
        self.state = SessionState::Completed;
        self.upload_progress = 100.0;
        self.touch();
    }

    /// Freeze the record after a spawn or read failure.
    pub fn fail(&mut self) {
        self.state = SessionState::Error;
        self.touch();
    }
}
