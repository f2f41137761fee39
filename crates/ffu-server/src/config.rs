use ffu_core::FleetConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,

    // Discovery, updater, logs and session defaults
    #[serde(default)]
    pub fleet: FleetConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            fleet: FleetConfig::default(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 5000))
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("FFU_BIND_ADDR") {
            config.bind_addr = addr.parse()?;
        }

        config.fleet.apply_env();
        Ok(config)
    }

    pub fn from_toml(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ServerConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.fleet.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_binds_port_5000() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.port(), 5000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml_with_fleet_section() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("server.toml");
        std::fs::write(
            &path,
            r#"
bind_addr = "127.0.0.1:8081"

[fleet.updater]
program = "/opt/ffu/update.sh"
args = []

[fleet.discovery]
timeout_secs = 5
"#,
        )
        .unwrap();

        let config = ServerConfig::from_toml(&path).unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:8081".parse::<SocketAddr>().unwrap());
        assert_eq!(config.fleet.updater.program, "/opt/ffu/update.sh");
        assert!(config.fleet.updater.args.is_empty());
        assert_eq!(config.fleet.discovery.timeout_secs, 5);
        assert_eq!(config.fleet.discovery.program, "avahi-browse");
    }

    #[test]
    fn test_validate_rejects_bad_fleet_config() {
        let mut config = ServerConfig::default();
        config.fleet.discovery.timeout_secs = 0;
        assert!(config.validate().is_err());
    }
}
