//! Configuration structures for the fleet update core.
//!
//! `FleetConfig` describes how the external tools are invoked and where
//! their artifacts live. `UpdateConfig` is the per-session request and is
//! immutable once a session starts.
//!
//! # Example TOML
//!
//! ```toml
//! [updater]
//! program = "bash"
//! args = ["mcumgr-update-all.sh"]
//! working_dir = "../scripts"
//!
//! [discovery]
//! program = "avahi-browse"
//! args = ["-r", "_ot._udp"]
//! service_marker = "ha-coap"
//! family_marker = "IPv6"
//! address_prefix = "fd"
//! timeout_secs = 3
//! lookahead = 2
//!
//! [logs]
//! dir = "."
//! prefix = "flash_logs_"
//! extension = "log"
//!
//! [broadcast]
//! subscriber_buffer = 256
//!
//! [defaults]
//! build_dir = "../application/build"
//! update_mode = "confirm"
//! stall_timeout_secs = 300
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;

/// Top-level configuration for the fleet update service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FleetConfig {
    /// External updater invocation
    #[serde(default)]
    pub updater: UpdaterConfig,

    /// External discovery invocation and output markers
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Where the updater writes its log files
    #[serde(default)]
    pub logs: LogConfig,

    /// Live status fan-out
    #[serde(default)]
    pub broadcast: BroadcastConfig,

    /// Defaults used when a caller omits session parameters
    #[serde(default)]
    pub defaults: SessionDefaults,
}

impl FleetConfig {
    /// Load configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        debug!("Loaded fleet configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Override fields from `FFU_*` environment variables.
    pub fn apply_env(&mut self) {
        if let Ok(program) = std::env::var("FFU_UPDATER_PROGRAM") {
            self.updater.program = program;
        }
        if let Ok(dir) = std::env::var("FFU_UPDATER_DIR") {
            self.updater.working_dir = Some(PathBuf::from(dir));
        }
        if let Ok(program) = std::env::var("FFU_DISCOVERY_PROGRAM") {
            self.discovery.program = program;
        }
        if let Ok(secs) = std::env::var("FFU_DISCOVERY_TIMEOUT_SECS") {
            if let Ok(secs) = secs.parse::<u64>() {
                self.discovery.timeout_secs = secs;
            }
        }
        if let Ok(dir) = std::env::var("FFU_LOG_DIR") {
            self.logs.dir = PathBuf::from(dir);
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.updater.program.trim().is_empty() {
            return Err(ConfigError::Validation(
                "updater.program must not be empty".to_string(),
            ));
        }
        if self.discovery.program.trim().is_empty() {
            return Err(ConfigError::Validation(
                "discovery.program must not be empty".to_string(),
            ));
        }
        if self.discovery.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "discovery.timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.discovery.lookahead == 0 {
            return Err(ConfigError::Validation(
                "discovery.lookahead must be at least 1".to_string(),
            ));
        }
        if self.logs.prefix.is_empty() {
            return Err(ConfigError::Validation(
                "logs.prefix must not be empty".to_string(),
            ));
        }
        if self.broadcast.subscriber_buffer == 0 {
            return Err(ConfigError::Validation(
                "broadcast.subscriber_buffer must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// How the external updater process is launched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdaterConfig {
    /// Executable to run
    #[serde(default = "default_updater_program")]
    pub program: String,

    /// Arguments passed to the executable
    #[serde(default = "default_updater_args")]
    pub args: Vec<String>,

    /// Working directory for the process (None = inherit)
    #[serde(default = "default_updater_dir")]
    pub working_dir: Option<PathBuf>,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            program: default_updater_program(),
            args: default_updater_args(),
            working_dir: default_updater_dir(),
        }
    }
}

/// How the external discovery tool is launched and its output recognised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Executable to run
    #[serde(default = "default_discovery_program")]
    pub program: String,

    /// Arguments passed to the executable
    #[serde(default = "default_discovery_args")]
    pub args: Vec<String>,

    /// Substring identifying a device's service entry
    #[serde(default = "default_service_marker")]
    pub service_marker: String,

    /// Substring identifying the address family of an entry
    #[serde(default = "default_family_marker")]
    pub family_marker: String,

    /// Required prefix of a bracketed device address
    #[serde(default = "default_address_prefix")]
    pub address_prefix: String,

    /// How long the tool may run before it is stopped
    #[serde(default = "default_discovery_timeout")]
    pub timeout_secs: u64,

    /// Number of lines after an entry searched for its address
    #[serde(default = "default_lookahead")]
    pub lookahead: usize,
}

impl DiscoveryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            program: default_discovery_program(),
            args: default_discovery_args(),
            service_marker: default_service_marker(),
            family_marker: default_family_marker(),
            address_prefix: default_address_prefix(),
            timeout_secs: default_discovery_timeout(),
            lookahead: default_lookahead(),
        }
    }
}

/// Location and naming of updater log files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Directory scanned for log files
    #[serde(default = "default_log_dir")]
    pub dir: PathBuf,

    /// File name prefix
    #[serde(default = "default_log_prefix")]
    pub prefix: String,

    /// File extension without the dot
    #[serde(default = "default_log_extension")]
    pub extension: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
            prefix: default_log_prefix(),
            extension: default_log_extension(),
        }
    }
}

impl LogConfig {
    /// Whether `name` is a bare file name of the form `<prefix>*.<extension>`.
    pub fn is_log_name(&self, name: &str) -> bool {
        !name.contains(['/', '\\'])
            && name.starts_with(&self.prefix)
            && Path::new(name).extension().and_then(|e| e.to_str()) == Some(self.extension.as_str())
    }
}

/// Live status fan-out settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastConfig {
    /// Events buffered per subscriber before new events are dropped for it
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            subscriber_buffer: default_subscriber_buffer(),
        }
    }
}

/// Session parameters used when a request omits them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDefaults {
    #[serde(default = "default_build_dir")]
    pub build_dir: PathBuf,

    #[serde(default)]
    pub update_mode: UpdateMode,

    #[serde(default = "default_stall_timeout")]
    pub stall_timeout_secs: u64,
}

impl Default for SessionDefaults {
    fn default() -> Self {
        Self {
            build_dir: default_build_dir(),
            update_mode: UpdateMode::default(),
            stall_timeout_secs: default_stall_timeout(),
        }
    }
}

impl SessionDefaults {
    /// Build an update configuration from these defaults.
    pub fn to_update_config(&self) -> UpdateConfig {
        UpdateConfig {
            build_dir: self.build_dir.clone(),
            update_mode: self.update_mode,
            stall_timeout: Duration::from_secs(self.stall_timeout_secs),
        }
    }
}

/// Image handling requested from the updater.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateMode {
    /// Upload, test-boot and confirm the new image
    #[default]
    Confirm,
    /// Upload and mark the image for a test boot only
    Test,
    /// Upload even when the device already runs the same image
    Force,
}

impl UpdateMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateMode::Confirm => "confirm",
            UpdateMode::Test => "test",
            UpdateMode::Force => "force",
        }
    }
}

impl fmt::Display for UpdateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UpdateMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "confirm" => Ok(UpdateMode::Confirm),
            "test" => Ok(UpdateMode::Test),
            "force" => Ok(UpdateMode::Force),
            _ => Err(format!("unknown update mode: {s}")),
        }
    }
}

/// Parameters of a single update session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateConfig {
    /// Directory holding the firmware build output
    pub build_dir: PathBuf,

    /// Image handling mode
    pub update_mode: UpdateMode,

    /// Per-device inactivity bound, forwarded to the updater
    #[serde(with = "duration_secs")]
    pub stall_timeout: Duration,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        SessionDefaults::default().to_update_config()
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

fn default_updater_program() -> String {
    "bash".to_string()
}

fn default_updater_args() -> Vec<String> {
    vec!["mcumgr-update-all.sh".to_string()]
}

fn default_updater_dir() -> Option<PathBuf> {
    Some(PathBuf::from("../scripts"))
}

fn default_discovery_program() -> String {
    "avahi-browse".to_string()
}

fn default_discovery_args() -> Vec<String> {
    vec!["-r".to_string(), "_ot._udp".to_string()]
}

fn default_service_marker() -> String {
    "ha-coap".to_string()
}

fn default_family_marker() -> String {
    "IPv6".to_string()
}

fn default_address_prefix() -> String {
    "fd".to_string()
}

fn default_discovery_timeout() -> u64 {
    3
}

fn default_lookahead() -> usize {
    2
}

fn default_log_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_log_prefix() -> String {
    "flash_logs_".to_string()
}

fn default_log_extension() -> String {
    "log".to_string()
}

fn default_subscriber_buffer() -> usize {
    256
}

fn default_build_dir() -> PathBuf {
    PathBuf::from("../application/build")
}

fn default_stall_timeout() -> u64 {
    300
}
