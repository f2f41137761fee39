//! # ffu-core
//!
//! Orchestration core for fleet firmware updates.
//!
//! This crate handles:
//! - Device discovery through an external service browser
//! - Single-flight update sessions driving an external updater process
//! - Tolerant classification of the updater's streamed output
//! - Live fan-out of status snapshots to subscribers
//! - Listing and reading the updater's log files
//!
//! ## Scope
//!
//! The core does not validate build artifacts, speak the device firmware
//! protocol, or retry failed updates. It surfaces progress and failure
//! signals for a caller to act on.

pub mod broadcast;
pub mod config;
pub mod discovery;
pub mod error;
pub mod lines;
pub mod logs;
pub mod manager;
pub mod parser;
#[cfg(test)]
mod proptests;
pub mod session;
pub mod status;

// Re-export main types for convenience
pub use broadcast::{StatusBroadcaster, StatusEvent, SubscriberId, Subscription};
pub use config::{
    BroadcastConfig, DiscoveryConfig, FleetConfig, LogConfig, SessionDefaults, UpdateConfig,
    UpdateMode, UpdaterConfig,
};
pub use discovery::{parse_browse_output, Device, DeviceDiscovery};
pub use error::{ConfigError, DiscoveryError, LogError, SessionError, StartError};
pub use logs::LogRegistry;
pub use manager::FleetManager;
pub use parser::{LineClassifier, LineEvent, OutputParser};
pub use session::UpdateSession;
pub use status::{SessionState, StatusRecord};
