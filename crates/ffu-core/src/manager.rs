//! Fleet manager - the top-level service context.
//!
//! The FleetManager owns one instance of each component and is what request
//! layers hold on to:
//! - DeviceDiscovery for finding devices
//! - UpdateSession for the single in-flight update and its status record
//! - StatusBroadcaster for live status subscribers
//! - LogRegistry for historical updater logs
//!
//! Constructing several managers gives fully isolated instances.

use std::path::PathBuf;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::broadcast::{StatusBroadcaster, StatusEvent, SubscriberId, Subscription};
use crate::config::{FleetConfig, UpdateConfig};
use crate::discovery::{Device, DeviceDiscovery};
use crate::error::{DiscoveryError, LogError, StartError};
use crate::logs::LogRegistry;
use crate::parser::OutputParser;
use crate::session::UpdateSession;
use crate::status::StatusRecord;

/// Main entry point for discovering devices and running update sessions.
///
/// # Example
///
/// ```ignore
/// use ffu_core::{FleetConfig, FleetManager};
///
/// let manager = FleetManager::new(FleetConfig::default());
/// let devices = manager.discover().await?;
/// let handle = manager
///     .start_update(&devices, manager.default_update_config())
///     .await?;
/// handle.await?;
/// println!("{:?}", manager.status().await);
/// ```
pub struct FleetManager {
    config: FleetConfig,
    discovery: DeviceDiscovery,
    session: UpdateSession,
    broadcaster: StatusBroadcaster,
    logs: LogRegistry,
    /// Result of the last successful discovery
    devices: RwLock<Vec<Device>>,
}

impl FleetManager {
    pub fn new(config: FleetConfig) -> Self {
        let broadcaster = StatusBroadcaster::new(config.broadcast.subscriber_buffer);
        let session = UpdateSession::new(
            config.updater.clone(),
            OutputParser::new(&config.logs),
            broadcaster.clone(),
        );

        Self {
            discovery: DeviceDiscovery::new(config.discovery.clone()),
            logs: LogRegistry::new(config.logs.clone()),
            session,
            broadcaster,
            devices: RwLock::new(Vec::new()),
            config,
        }
    }

    pub fn config(&self) -> &FleetConfig {
        &self.config
    }

    /// Session parameters taken from the configured defaults.
    pub fn default_update_config(&self) -> UpdateConfig {
        self.config.defaults.to_update_config()
    }

    /// Discover devices, remembering the result and reporting progress to
    /// subscribers.
    pub async fn discover(&self) -> Result<Vec<Device>, DiscoveryError> {
        info!("Discovering devices...");
        self.announce("Discovering devices...").await;

        match self.discovery.discover().await {
            Ok(devices) => {
                *self.devices.write().await = devices.clone();
                self.announce(format!("Discovered {} devices", devices.len()))
                    .await;
                Ok(devices)
            }
            Err(e) => {
                error!("Error discovering devices: {}", e);
                self.announce(format!("Error discovering devices: {}", e))
                    .await;
                Err(e)
            }
        }
    }

    /// Devices found by the last successful discovery.
    pub async fn devices(&self) -> Vec<Device> {
        self.devices.read().await.clone()
    }

    /// Start an update session over `devices`.
    pub async fn start_update(
        &self,
        devices: &[Device],
        config: UpdateConfig,
    ) -> Result<JoinHandle<()>, StartError> {
        self.session.start(devices, config).await
    }

    pub async fn status(&self) -> StatusRecord {
        self.session.status().await
    }

    pub fn is_update_in_progress(&self) -> bool {
        self.session.is_in_progress()
    }

    pub fn subscribe(&self) -> Subscription {
        self.broadcaster.subscribe()
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.broadcaster.unsubscribe(id)
    }

    pub fn list_log_files(&self) -> Result<Vec<PathBuf>, LogError> {
        self.logs.list_log_files()
    }

    pub fn latest_log(&self) -> Result<Option<PathBuf>, LogError> {
        self.logs.latest_log()
    }

    pub fn read_log(&self, name: &str) -> Result<String, LogError> {
        self.logs.read_log(name)
    }

    async fn announce(&self, message: impl Into<String>) {
        let snapshot = self.session.status().await;
        self.broadcaster.publish(StatusEvent::new(message, snapshot));
    }
}

impl std::fmt::Debug for FleetManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FleetManager")
            .field("session", &self.session)
            .field("broadcaster", &self.broadcaster)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DiscoveryConfig;
    use crate::status::SessionState;

    fn manager_with_discovery(script: &str) -> FleetManager {
        FleetManager::new(FleetConfig {
            discovery: DiscoveryConfig {
                program: "sh".to_string(),
                args: vec!["-c".to_string(), script.to_string()],
                ..DiscoveryConfig::default()
            },
            ..FleetConfig::default()
        })
    }

    #[tokio::test]
    async fn test_discover_remembers_and_announces() {
        let manager = manager_with_discovery(
            "echo '=  wpan0 IPv6 ha-coap-1 _ot._udp local'; \
             echo '   hostname = [ha-coap-1.local]'; \
             echo '   address = [fd00::1]'",
        );
        let mut sub = manager.subscribe();

        let devices = manager.discover().await.unwrap();
        assert_eq!(devices, vec![Device::new("ha-coap-1", "fd00::1")]);
        assert_eq!(manager.devices().await, devices);

        assert_eq!(sub.recv().await.unwrap().message, "Discovering devices...");
        let done = sub.recv().await.unwrap();
        assert_eq!(done.message, "Discovered 1 devices");
        assert_eq!(done.status.state, SessionState::Idle);
    }

    #[tokio::test]
    async fn test_failed_discovery_keeps_previous_devices() {
        let manager = manager_with_discovery("exit 1");
        let mut sub = manager.subscribe();

        assert!(manager.discover().await.is_err());
        assert!(manager.devices().await.is_empty());

        sub.recv().await.unwrap();
        let failed = sub.recv().await.unwrap();
        assert!(failed.message.starts_with("Error discovering devices: "));
    }

    #[tokio::test]
    async fn test_unsubscribe() {
        let manager = FleetManager::new(FleetConfig::default());
        let sub = manager.subscribe();
        assert!(manager.unsubscribe(sub.id()));
        assert!(!manager.unsubscribe(sub.id()));
    }

    #[tokio::test]
    async fn test_fresh_manager_is_idle() {
        let manager = FleetManager::new(FleetConfig::default());
        assert_eq!(manager.status().await.state, SessionState::Idle);
        assert!(!manager.is_update_in_progress());
        assert_eq!(manager.default_update_config(), UpdateConfig::default());
    }
}
