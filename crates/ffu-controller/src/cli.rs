//! CLI command definitions and argument parsing

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use ffu_core::{
    Device, FleetManager, LogError, SessionState, StatusEvent, UpdateConfig, UpdateMode,
};

use crate::config::Config;
use crate::output::{LogFileEntry, OutputFormat, OutputFormatter};
use crate::ExitCode;

/// FFU Controller CLI - fleet firmware updates
#[derive(Parser, Debug)]
#[command(name = "ffu-controller")]
#[command(version, about = "FFU Controller CLI - fleet firmware updates")]
#[command(after_help = exit_code_help())]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format: table, json or quiet (defaults to the config value)
    #[arg(long, global = true)]
    pub output: Option<OutputFormat>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Config file path
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// Whether the command writes a fresh config file instead of reading one
    pub fn is_config_init(&self) -> bool {
        matches!(
            self.command,
            Commands::Config(ConfigArgs {
                action: ConfigAction::Init { .. }
            })
        )
    }

    /// Execute the CLI command with a pre-loaded configuration
    pub async fn execute_with_config(self, config: Config) -> anyhow::Result<ExitCode> {
        let format = config.output.format.parse().unwrap_or_default();
        let formatter = OutputFormatter::new(format, config.output.verbose);

        match self.command {
            Commands::Config(args) => args.execute(self.config, &config, &formatter),
            Commands::Discover => discover(&FleetManager::new(config.fleet), &formatter).await,
            Commands::Update(args) => {
                let manager = FleetManager::new(config.fleet);
                args.execute(&manager, &formatter).await
            }
            Commands::Logs(args) => args.execute(&FleetManager::new(config.fleet), &formatter),
        }
    }
}

fn exit_code_help() -> String {
    let mut help = String::from("Exit codes:\n");
    for code in ExitCode::ALL {
        help.push_str(&format!("  {:>2}  {}\n", code as i32, code.description()));
    }
    help
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Discover devices on the network
    Discover,
    /// Update devices and follow the session until it ends
    Update(UpdateArgs),
    /// List and read updater logs
    Logs(LogsArgs),
    /// Create or inspect the controller configuration
    Config(ConfigArgs),
}

async fn discover(manager: &FleetManager, formatter: &OutputFormatter) -> anyhow::Result<ExitCode> {
    formatter.progress("Discovering devices...");
    match manager.discover().await {
        Ok(devices) => {
            let output = formatter.format_devices(&devices);
            if !output.is_empty() {
                println!("{output}");
            }
            Ok(ExitCode::Success)
        }
        Err(e) => {
            formatter.error(&format!("Discovery failed: {e}"));
            Ok(ExitCode::DiscoveryFailed)
        }
    }
}

/// Arguments for the update command
#[derive(Parser, Debug)]
pub struct UpdateArgs {
    /// Device address to update (repeatable)
    #[arg(
        long = "device",
        value_name = "ADDR",
        conflicts_with = "all",
        required_unless_present = "all"
    )]
    pub devices: Vec<String>,

    /// Discover devices first and update all of them
    #[arg(long)]
    pub all: bool,

    /// Firmware build directory
    #[arg(long)]
    pub build_dir: Option<PathBuf>,

    /// Update mode: confirm, test or force
    #[arg(long)]
    pub mode: Option<UpdateMode>,

    /// Per-device stall timeout forwarded to the updater
    #[arg(long, value_name = "SECS")]
    pub stall_timeout: Option<u64>,
}

impl UpdateArgs {
    pub async fn execute(
        self,
        manager: &FleetManager,
        formatter: &OutputFormatter,
    ) -> anyhow::Result<ExitCode> {
        let devices = if self.all {
            formatter.progress("Discovering devices...");
            match manager.discover().await {
                Ok(devices) => devices.into_iter().filter(|d| d.selected).collect(),
                Err(e) => {
                    formatter.error(&format!("Discovery failed: {e}"));
                    return Ok(ExitCode::DiscoveryFailed);
                }
            }
        } else {
            let mut devices = Vec::with_capacity(self.devices.len());
            for address in &self.devices {
                if address.parse::<IpAddr>().is_err() {
                    formatter.error(&format!("Invalid device address: {address}"));
                    return Ok(ExitCode::InvalidInput);
                }
                devices.push(Device::new(address.clone(), address.clone()));
            }
            devices
        };

        if devices.is_empty() {
            formatter.error("No devices to update");
            return Ok(ExitCode::InvalidInput);
        }

        let defaults = manager.default_update_config();
        let config = UpdateConfig {
            build_dir: self.build_dir.unwrap_or(defaults.build_dir),
            update_mode: self.mode.unwrap_or(defaults.update_mode),
            stall_timeout: self
                .stall_timeout
                .map(Duration::from_secs)
                .unwrap_or(defaults.stall_timeout),
        };
        formatter.progress(&format!(
            "Updating {} devices from {} ({} mode)",
            devices.len(),
            config.build_dir.display(),
            config.update_mode
        ));

        let mut subscription = manager.subscribe();
        let mut session = match manager.start_update(&devices, config).await {
            Ok(handle) => handle,
            Err(e) => {
                manager.unsubscribe(subscription.id());
                let message = formatter.format_error_with_code(&e, ExitCode::SessionBusy);
                if !message.is_empty() {
                    eprintln!("{message}");
                }
                return Ok(ExitCode::SessionBusy);
            }
        };

        loop {
            tokio::select! {
                biased;
                Some(event) = subscription.recv() => print_event(formatter, &event),
                joined = &mut session => {
                    joined.map_err(|e| anyhow::anyhow!("update session task failed: {e}"))?;
                    break;
                }
            }
        }
        while let Some(event) = subscription.try_recv() {
            print_event(formatter, &event);
        }
        manager.unsubscribe(subscription.id());

        let status = manager.status().await;
        let summary = formatter.format_status(&status);
        if !summary.is_empty() {
            println!("{summary}");
        }

        if status.state == SessionState::Error {
            formatter.error("Update session ended with an error");
            Ok(ExitCode::SessionError)
        } else if status.failed_updates > 0 {
            formatter.warning(&format!("{} device updates failed", status.failed_updates));
            Ok(ExitCode::UpdateFailures)
        } else {
            formatter.success(&format!("Updated {} devices", status.successful_updates));
            Ok(ExitCode::Success)
        }
    }
}

fn print_event(formatter: &OutputFormatter, event: &StatusEvent) {
    if let Some(line) = formatter.format_event(event) {
        println!("{line}");
    }
}

/// Arguments for the logs command
#[derive(Parser, Debug)]
pub struct LogsArgs {
    #[command(subcommand)]
    pub action: LogsAction,
}

/// Log actions
#[derive(Subcommand, Debug)]
pub enum LogsAction {
    /// List log files, newest first
    List,
    /// Print a log file (the newest when NAME is omitted)
    Show {
        /// Log file name
        name: Option<String>,
    },
}

impl LogsArgs {
    pub fn execute(
        self,
        manager: &FleetManager,
        formatter: &OutputFormatter,
    ) -> anyhow::Result<ExitCode> {
        match self.action {
            LogsAction::List => {
                let entries: Vec<LogFileEntry> = manager
                    .list_log_files()?
                    .iter()
                    .map(|path| LogFileEntry::from_path(path))
                    .collect();
                let output = formatter.format_log_files(&entries);
                if !output.is_empty() {
                    println!("{output}");
                }
                Ok(ExitCode::Success)
            }
            LogsAction::Show { name } => {
                let name = match name {
                    Some(name) => name,
                    None => match manager.latest_log()? {
                        Some(path) => path
                            .file_name()
                            .map(|n| n.to_string_lossy().into_owned())
                            .unwrap_or_default(),
                        None => {
                            formatter.error("No log files found");
                            return Ok(ExitCode::LogNotFound);
                        }
                    },
                };

                match manager.read_log(&name) {
                    Ok(contents) => {
                        let output = formatter.format_log(&name, &contents);
                        if !output.is_empty() {
                            print!("{output}");
                            if formatter.format() != OutputFormat::Table {
                                println!();
                            }
                        }
                        Ok(ExitCode::Success)
                    }
                    Err(LogError::NotFound(name)) => {
                        formatter.error(&format!("Log file not found: {name}"));
                        Ok(ExitCode::LogNotFound)
                    }
                    Err(e) => Err(e.into()),
                }
            }
        }
    }
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Config actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Write a commented sample config (to --config or the default location)
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration as TOML
    Show,
}

impl ConfigArgs {
    pub fn execute(
        self,
        path: Option<PathBuf>,
        config: &Config,
        formatter: &OutputFormatter,
    ) -> anyhow::Result<ExitCode> {
        match self.action {
            ConfigAction::Init { force } => {
                let Some(path) = path.or_else(Config::default_path) else {
                    formatter.error("No config directory available; pass --config");
                    return Ok(ExitCode::InvalidInput);
                };
                if path.exists() && !force {
                    formatter.error(&format!(
                        "{} already exists (use --force to overwrite)",
                        path.display()
                    ));
                    return Ok(ExitCode::InvalidInput);
                }

                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(&path, Config::sample_toml())?;
                formatter.success(&format!("Wrote {}", path.display()));
                Ok(ExitCode::Success)
            }
            ConfigAction::Show => {
                if !formatter.is_quiet() {
                    print!("{}", toml::to_string_pretty(config)?);
                }
                Ok(ExitCode::Success)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::TempDir;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("ffu-controller").chain(args.iter().copied()))
    }

    fn quiet_config(dir: &Path, updater_script: &str) -> Config {
        let mut config = Config::default();
        config.output.format = "quiet".to_string();
        config.fleet.updater.program = "sh".to_string();
        config.fleet.updater.args = vec!["-c".to_string(), updater_script.to_string()];
        config.fleet.updater.working_dir = None;
        config.fleet.logs.dir = dir.to_path_buf();
        config
    }

    #[test]
    fn test_parse_update_with_devices() {
        let cli = parse(&[
            "update",
            "--device",
            "fd00::1",
            "--device",
            "fd00::2",
            "--mode",
            "force",
            "--stall-timeout",
            "60",
            "--output",
            "json",
        ])
        .unwrap();

        assert_eq!(cli.output, Some(OutputFormat::Json));
        match cli.command {
            Commands::Update(args) => {
                assert_eq!(args.devices, vec!["fd00::1", "fd00::2"]);
                assert!(!args.all);
                assert_eq!(args.mode, Some(UpdateMode::Force));
                assert_eq!(args.stall_timeout, Some(60));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_update_requires_devices_or_all() {
        assert!(parse(&["update"]).is_err());
        assert!(parse(&["update", "--all", "--device", "fd00::1"]).is_err());
        assert!(parse(&["update", "--all"]).is_ok());
    }

    #[test]
    fn test_invalid_mode_is_rejected() {
        assert!(parse(&["update", "--all", "--mode", "yolo"]).is_err());
    }

    #[test]
    fn test_parse_logs_show() {
        let cli = parse(&["logs", "show", "flash_logs_1.log", "--verbose"]).unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Logs(LogsArgs {
                action: LogsAction::Show { name },
            }) => assert_eq!(name.as_deref(), Some("flash_logs_1.log")),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_help_lists_exit_codes() {
        let err = parse(&["--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
        let help = err.to_string();
        assert!(help.contains("Exit codes:"));
        for code in ExitCode::ALL {
            assert!(help.contains(code.description()), "{}", code.name());
        }
    }

    #[tokio::test]
    async fn test_config_init_writes_sample_once() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("controller.toml");
        let path_arg = path.to_str().unwrap();
        let config = quiet_config(temp.path(), "true");

        let cli = parse(&["config", "init", "--config", path_arg]).unwrap();
        assert!(cli.is_config_init());
        assert_eq!(cli.execute_with_config(config.clone()).await.unwrap(), ExitCode::Success);

        let written: Config = toml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(written.validate().is_ok());
        assert_eq!(written.fleet.logs.dir, PathBuf::from("../scripts"));

        let cli = parse(&["config", "init", "--config", path_arg]).unwrap();
        assert_eq!(cli.execute_with_config(config.clone()).await.unwrap(), ExitCode::InvalidInput);

        let cli = parse(&["config", "init", "--force", "--config", path_arg]).unwrap();
        assert_eq!(cli.execute_with_config(config).await.unwrap(), ExitCode::Success);
    }

    #[tokio::test]
    async fn test_config_show() {
        let temp = TempDir::new().unwrap();
        let cli = parse(&["config", "show"]).unwrap();
        assert!(!cli.is_config_init());
        let code = cli
            .execute_with_config(quiet_config(temp.path(), "true"))
            .await
            .unwrap();
        assert_eq!(code, ExitCode::Success);
    }

    #[tokio::test]
    async fn test_update_reports_failures_in_exit_code() {
        let temp = TempDir::new().unwrap();
        let config = quiet_config(temp.path(), "echo 'Failed to upload image to fd00::1'");
        let cli = parse(&["update", "--device", "fd00::1"]).unwrap();

        let code = cli.execute_with_config(config).await.unwrap();
        assert_eq!(code, ExitCode::UpdateFailures);
    }

    #[tokio::test]
    async fn test_update_success() {
        let temp = TempDir::new().unwrap();
        let config = quiet_config(temp.path(), "echo 'Upload completed successfully'");
        let cli = parse(&["update", "--device", "fd00::1"]).unwrap();

        assert_eq!(cli.execute_with_config(config).await.unwrap(), ExitCode::Success);
    }

    #[tokio::test]
    async fn test_update_with_missing_updater_is_session_error() {
        let temp = TempDir::new().unwrap();
        let mut config = quiet_config(temp.path(), "true");
        config.fleet.updater.program = "ffu-no-such-updater".to_string();
        let cli = parse(&["update", "--device", "fd00::1"]).unwrap();

        assert_eq!(cli.execute_with_config(config).await.unwrap(), ExitCode::SessionError);
    }

    #[tokio::test]
    async fn test_update_rejects_bad_address() {
        let temp = TempDir::new().unwrap();
        let config = quiet_config(temp.path(), "true");
        let cli = parse(&["update", "--device", "not-an-address"]).unwrap();

        assert_eq!(cli.execute_with_config(config).await.unwrap(), ExitCode::InvalidInput);
    }

    #[tokio::test]
    async fn test_logs_show_missing() {
        let temp = TempDir::new().unwrap();
        let config = quiet_config(temp.path(), "true");

        let cli = parse(&["logs", "show"]).unwrap();
        assert_eq!(cli.execute_with_config(config.clone()).await.unwrap(), ExitCode::LogNotFound);

        std::fs::write(temp.path().join("flash_logs_1.log"), "done\n").unwrap();
        let cli = parse(&["logs", "show"]).unwrap();
        assert_eq!(cli.execute_with_config(config.clone()).await.unwrap(), ExitCode::Success);

        let cli = parse(&["logs", "show", "flash_logs_2.log"]).unwrap();
        assert_eq!(cli.execute_with_config(config).await.unwrap(), ExitCode::LogNotFound);
    }

    #[tokio::test]
    async fn test_discover_failure_exit_code() {
        let temp = TempDir::new().unwrap();
        let mut config = quiet_config(temp.path(), "true");
        config.fleet.discovery.program = "ffu-no-such-browser".to_string();

        let cli = parse(&["discover"]).unwrap();
        assert_eq!(cli.execute_with_config(config).await.unwrap(), ExitCode::DiscoveryFailed);
    }
}
