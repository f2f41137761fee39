//! Device discovery through an external service browser.
//!
//! The browser (avahi-browse by default) runs for a bounded time and its
//! stdout is scanned as plain text. An entry line carries the service and
//! address-family markers with the device name in its fourth field; the
//! device's address appears in brackets on one of the following lines:
//!
//! ```text
//! =  wpan0 IPv6 ha-coap-4c1a     _ot._udp     local
//!    hostname = [ha-coap-4c1a.local]
//!    address = [fd11:22:0:0:3b2e:9f3d:1c0a:5e21]
//! ```

use std::collections::HashSet;
use std::net::Ipv6Addr;
use std::process::Stdio;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::config::DiscoveryConfig;
use crate::error::DiscoveryError;

static BRACKETED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]*)\]").expect("bracketed text pattern"));

/// A discovered, network-addressable device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub name: String,
    pub address: String,
    #[serde(default = "default_selected")]
    pub selected: bool,
}

impl Device {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            selected: true,
        }
    }
}

fn default_selected() -> bool {
    true
}

/// Runs the discovery tool and parses its output.
#[derive(Debug, Clone)]
pub struct DeviceDiscovery {
    config: DiscoveryConfig,
}

impl DeviceDiscovery {
    pub fn new(config: DiscoveryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Run the discovery tool and return the devices it reported.
    ///
    /// Blocks for at most the configured timeout. A run that is cut off by
    /// the timeout still succeeds with whatever it printed.
    pub async fn discover(&self) -> Result<Vec<Device>, DiscoveryError> {
        let output = self.run_tool().await?;
        let devices = parse_browse_output(&output, &self.config);
        info!("Discovered {} devices", devices.len());
        Ok(devices)
    }

    async fn run_tool(&self) -> Result<String, DiscoveryError> {
        debug!(program = %self.config.program, args = ?self.config.args, "running discovery tool");

        let mut child = Command::new(&self.config.program)
            .args(&self.config.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    DiscoveryError::ToolMissing(self.config.program.clone())
                }
                _ => DiscoveryError::Spawn(e),
            })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            DiscoveryError::Io(std::io::Error::other("discovery stdout was not captured"))
        })?;
        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut text = String::new();
                let _ = stderr.read_to_string(&mut text).await;
                text
            })
        });

        let deadline = Instant::now() + self.config.timeout();
        let mut lines = BufReader::new(stdout).lines();
        let mut output = String::new();
        let mut timed_out = false;

        loop {
            match timeout_at(deadline, lines.next_line()).await {
                Ok(Ok(Some(line))) => {
                    output.push_str(&line);
                    output.push('\n');
                }
                Ok(Ok(None)) => break,
                Ok(Err(e)) => return Err(DiscoveryError::Io(e)),
                Err(_) => {
                    timed_out = true;
                    break;
                }
            }
        }

        let status = if timed_out {
            None
        } else {
            match timeout_at(deadline, child.wait()).await {
                Ok(status) => Some(status?),
                Err(_) => {
                    timed_out = true;
                    None
                }
            }
        };

        if timed_out {
            debug!(bytes = output.len(), "discovery tool timed out, stopping it");
            if let Err(e) = child.kill().await {
                warn!("Failed to stop discovery tool: {}", e);
            }
        }

        if let Some(status) = status {
            if !status.success() {
                let stderr = match stderr_task {
                    Some(task) => task.await.unwrap_or_default(),
                    None => String::new(),
                };
                return Err(DiscoveryError::ToolFailed {
                    status,
                    stderr: stderr.trim().to_string(),
                });
            }
        } else if let Some(task) = stderr_task {
            task.abort();
        }

        if output.trim().is_empty() {
            return Err(DiscoveryError::NoOutput);
        }
        Ok(output)
    }
}

/// Extract devices from service browser output.
///
/// Devices are deduplicated by name; the first entry for a name wins even
/// when it yields no address. Entries with no matching address within the
/// lookahead window are dropped.
pub fn parse_browse_output(output: &str, config: &DiscoveryConfig) -> Vec<Device> {
    let lines: Vec<&str> = output.lines().collect();
    let mut seen = HashSet::new();
    let mut devices = Vec::new();

    for (i, line) in lines.iter().enumerate() {
        if !is_entry_line(line, config) {
            continue;
        }
        let Some(name) = line.split_whitespace().nth(3) else {
            continue;
        };
        if !seen.insert(name.to_string()) {
            continue;
        }

        let window = lines.iter().skip(i + 1).take(config.lookahead);
        match window
            .filter_map(|candidate| find_address(candidate, &config.address_prefix))
            .next()
        {
            Some(address) => devices.push(Device::new(name, address)),
            None => debug!(device = name, "no address found for discovered device"),
        }
    }

    devices
}

fn is_entry_line(line: &str, config: &DiscoveryConfig) -> bool {
    line.contains("= ")
        && line.contains(&config.service_marker)
        && line.contains(&config.family_marker)
}

fn find_address(line: &str, prefix: &str) -> Option<String> {
    BRACKETED_RE
        .captures_iter(line)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .find(|text| text.starts_with(prefix) && text.parse::<Ipv6Addr>().is_ok())
        .map(str::to_string)
}
