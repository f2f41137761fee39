//! Output formatting for CLI results
//!
//! This module provides consistent output formatting across all CLI commands.
//! It supports three output formats:
//! - Table: Human-readable tables (default)
//! - JSON: Structured JSON for scripting and automation
//! - Quiet: Minimal output, exit codes only
//!
//! Live status lines are the exception to the JSON wrapper: while an update
//! runs, each status event is printed as one compact JSON object per line.

use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use comfy_table::{presets::UTF8_FULL, Table};
use ffu_core::{Device, StatusEvent, StatusRecord};
use serde::Serialize;

use crate::ExitCode;

/// Output format options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format for scripting
    Json,
    /// Minimal output - exit codes only
    Quiet,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            "quiet" => Ok(Self::Quiet),
            _ => Err(format!("Unknown output format: {s}")),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Table => write!(f, "table"),
            Self::Json => write!(f, "json"),
            Self::Quiet => write!(f, "quiet"),
        }
    }
}

/// Standard JSON response wrapper for consistent schema
#[derive(Serialize)]
pub struct JsonResponse<T: Serialize> {
    /// Whether the operation was successful
    pub success: bool,
    /// The response data (present on success)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Error message (present on failure)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// ISO 8601 timestamp
    pub timestamp: String,
    /// Command that was executed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

impl<T: Serialize> JsonResponse<T> {
    /// Create a successful response with command context
    pub fn success_with_command(data: T, command: &str) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: Utc::now().to_rfc3339(),
            command: Some(command.to_string()),
        }
    }
}

impl JsonResponse<()> {
    /// Create an error response
    pub fn error(message: &str) -> JsonResponse<()> {
        JsonResponse {
            success: false,
            data: None,
            error: Some(message.to_string()),
            timestamp: Utc::now().to_rfc3339(),
            command: None,
        }
    }
}

/// A log file with the metadata shown by `logs list`.
#[derive(Debug, Clone, Serialize)]
pub struct LogFileEntry {
    pub name: String,
    pub modified: Option<DateTime<Utc>>,
    pub size: Option<u64>,
}

impl LogFileEntry {
    /// Read metadata for `path`; missing metadata is left empty.
    pub fn from_path(path: &Path) -> Self {
        let metadata = std::fs::metadata(path).ok();
        Self {
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            modified: metadata
                .as_ref()
                .and_then(|m| m.modified().ok())
                .map(DateTime::<Utc>::from),
            size: metadata.map(|m| m.len()),
        }
    }
}

#[derive(Serialize)]
struct LogOutput<'a> {
    log_file: &'a str,
    logs: &'a str,
}

#[derive(Serialize)]
struct ErrorOutput {
    error: String,
    timestamp: String,
}

/// Formats output for different modes
pub struct OutputFormatter {
    format: OutputFormat,
    verbose: bool,
}

impl OutputFormatter {
    /// Create a new output formatter
    pub fn new(format: OutputFormat, verbose: bool) -> Self {
        Self { format, verbose }
    }

    /// Get the current output format
    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Check if quiet mode is enabled
    pub fn is_quiet(&self) -> bool {
        self.format == OutputFormat::Quiet
    }

    /// Format discovered devices
    pub fn format_devices(&self, devices: &[Device]) -> String {
        match self.format {
            OutputFormat::Table => self.devices_table(devices),
            OutputFormat::Json => self.to_json_response(&devices, "discover"),
            OutputFormat::Quiet => String::new(),
        }
    }

    /// Format a final session status
    pub fn format_status(&self, status: &StatusRecord) -> String {
        match self.format {
            OutputFormat::Table => self.status_table(status),
            OutputFormat::Json => self.to_json_response(status, "update"),
            OutputFormat::Quiet => String::new(),
        }
    }

    /// Format a live status event, if this format prints them
    pub fn format_event(&self, event: &StatusEvent) -> Option<String> {
        match self.format {
            OutputFormat::Table => {
                let status = &event.status;
                Some(format!(
                    "[{:>3}/{:<3} {:>5.1}%] {}",
                    status.completed_devices,
                    status.total_devices,
                    status.upload_progress,
                    event.message
                ))
            }
            OutputFormat::Json => serde_json::to_string(event).ok(),
            OutputFormat::Quiet => None,
        }
    }

    /// Format the log file listing
    pub fn format_log_files(&self, entries: &[LogFileEntry]) -> String {
        match self.format {
            OutputFormat::Table => self.log_files_table(entries),
            OutputFormat::Json => self.to_json_response(&entries, "logs list"),
            OutputFormat::Quiet => String::new(),
        }
    }

    /// Format log contents
    pub fn format_log(&self, name: &str, contents: &str) -> String {
        match self.format {
            OutputFormat::Table => contents.to_string(),
            OutputFormat::Json => self.to_json_response(
                &LogOutput {
                    log_file: name,
                    logs: contents,
                },
                "logs show",
            ),
            OutputFormat::Quiet => String::new(),
        }
    }

    /// Format error with exit code context
    pub fn format_error_with_code(&self, error: &dyn std::fmt::Display, code: ExitCode) -> String {
        match self.format {
            OutputFormat::Table => format!("Error: {error}"),
            OutputFormat::Json => {
                let response = JsonResponse::<()>::error(&error.to_string());
                let mut output = match serde_json::to_value(&response) {
                    Ok(value) => value,
                    Err(e) => return format!("{{\"error\": \"{e}\"}}"),
                };
                output["exit_code"] = serde_json::json!(code as i32);
                output["exit_code_name"] = serde_json::json!(code.name());
                output["exit_code_description"] = serde_json::json!(code.description());
                self.to_json(&output)
            }
            OutputFormat::Quiet => String::new(),
        }
    }

    /// Format progress message (only shown in verbose mode)
    pub fn progress(&self, message: &str) {
        if self.verbose && self.format == OutputFormat::Table {
            eprintln!("... {message}");
        }
    }

    /// Format success message
    pub fn success(&self, message: &str) {
        if self.format == OutputFormat::Table {
            println!("✓ {message}");
        }
    }

    /// Format error message
    pub fn error(&self, message: &str) {
        if self.format == OutputFormat::Table {
            eprintln!("✗ {message}");
        } else if self.format == OutputFormat::Json {
            println!(
                "{}",
                self.to_json(&ErrorOutput {
                    error: message.to_string(),
                    timestamp: Utc::now().to_rfc3339(),
                })
            );
        }
        // Quiet mode: no output, rely on exit code
    }

    /// Format warning message
    pub fn warning(&self, message: &str) {
        if self.format == OutputFormat::Table {
            eprintln!("⚠ {message}");
        }
    }

    fn to_json<T: Serialize + ?Sized>(&self, value: &T) -> String {
        serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
    }

    /// Format data with consistent JSON response wrapper
    fn to_json_response<T: Serialize + ?Sized>(&self, value: &T, command: &str) -> String {
        let response = JsonResponse::success_with_command(value, command);
        serde_json::to_string_pretty(&response).unwrap_or_else(|e| {
            self.to_json(&JsonResponse::<()>::error(&format!("Serialization error: {e}")))
        })
    }

    fn devices_table(&self, devices: &[Device]) -> String {
        if devices.is_empty() {
            return "No devices found".to_string();
        }

        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(vec!["Name", "Address"]);
        for device in devices {
            table.add_row(vec![device.name.clone(), device.address.clone()]);
        }
        table.to_string()
    }

    fn status_table(&self, status: &StatusRecord) -> String {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(vec!["Field", "Value"]);
        table.add_row(vec!["State".to_string(), status.state.to_string()]);
        table.add_row(vec![
            "Devices".to_string(),
            format!("{}/{}", status.completed_devices, status.total_devices),
        ]);
        table.add_row(vec!["Successful".to_string(), status.successful_updates.to_string()]);
        table.add_row(vec!["Failed".to_string(), status.failed_updates.to_string()]);
        table.add_row(vec!["Skipped".to_string(), status.skipped_updates.to_string()]);
        if self.verbose {
            table.add_row(vec![
                "Last device".to_string(),
                status.current_device.clone().unwrap_or_else(|| "-".to_string()),
            ]);
            table.add_row(vec![
                "Last update".to_string(),
                status.last_update.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            ]);
        }
        table.add_row(vec![
            "Log file".to_string(),
            status.log_file.clone().unwrap_or_else(|| "-".to_string()),
        ]);
        table.to_string()
    }

    fn log_files_table(&self, entries: &[LogFileEntry]) -> String {
        if entries.is_empty() {
            return "No log files found".to_string();
        }

        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(vec!["Name", "Modified", "Size"]);
        for entry in entries {
            table.add_row(vec![
                entry.name.clone(),
                entry
                    .modified
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "-".to_string()),
                entry
                    .size
                    .map(|s| format!("{s} B"))
                    .unwrap_or_else(|| "-".to_string()),
            ]);
        }
        table.to_string()
    }
}
