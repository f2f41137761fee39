use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use ffu_core::{
    Device, DiscoveryError, FleetManager, LogError, StartError, StatusRecord, UpdateConfig,
    UpdateMode,
};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{error, info};

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<FleetManager>,
    pub shutdown: tokio::sync::watch::Receiver<bool>,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("No devices selected")]
    NoDevices,

    #[error("No log files found")]
    NoLogFiles,

    #[error(transparent)]
    Start(#[from] StartError),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    Log(#[from] LogError),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NoDevices => StatusCode::BAD_REQUEST,
            ApiError::NoLogFiles | ApiError::Log(LogError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Start(StartError::AlreadyInProgress) => StatusCode::CONFLICT,
            ApiError::Discovery(_) => StatusCode::BAD_GATEWAY,
            ApiError::Log(LogError::Io(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody {
            success: false,
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DiscoverResponse {
    pub success: bool,
    pub devices: Vec<Device>,
}

#[derive(Debug, Deserialize)]
pub struct StartUpdateRequest {
    #[serde(default)]
    pub devices: Vec<Device>,
    pub build_dir: Option<PathBuf>,
    pub update_mode: Option<UpdateMode>,
    /// Seconds
    pub stall_timeout: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LogFilesResponse {
    pub success: bool,
    pub log_files: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub log_file: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LogsResponse {
    pub success: bool,
    pub logs: String,
    pub log_file: String,
}

// POST /api/discover
pub async fn post_discover(
    State(state): State<AppState>,
) -> Result<Json<DiscoverResponse>, ApiError> {
    let devices = state.manager.discover().await?;
    Ok(Json(DiscoverResponse {
        success: true,
        devices,
    }))
}

// POST /api/start_update
pub async fn post_start_update(
    State(state): State<AppState>,
    Json(request): Json<StartUpdateRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let devices: Vec<Device> = request.devices.into_iter().filter(|d| d.selected).collect();
    if devices.is_empty() {
        return Err(ApiError::NoDevices);
    }

    let defaults = state.manager.default_update_config();
    let config = UpdateConfig {
        build_dir: request.build_dir.unwrap_or(defaults.build_dir),
        update_mode: request.update_mode.unwrap_or(defaults.update_mode),
        stall_timeout: request
            .stall_timeout
            .map(Duration::from_secs)
            .unwrap_or(defaults.stall_timeout),
    };

    // The session runs detached; its progress is observed via status and /ws/status.
    let _session = state.manager.start_update(&devices, config).await?;
    info!("Update session started for {} devices", devices.len());

    Ok(Json(MessageResponse {
        success: true,
        message: "Update process started".to_string(),
    }))
}

// GET /api/update_status
pub async fn get_update_status(State(state): State<AppState>) -> Json<StatusRecord> {
    Json(state.manager.status().await)
}

// GET /api/devices
pub async fn get_devices(State(state): State<AppState>) -> Json<Vec<Device>> {
    Json(state.manager.devices().await)
}

// GET /api/log_files
pub async fn get_log_files(
    State(state): State<AppState>,
) -> Result<Json<LogFilesResponse>, ApiError> {
    let log_files = state
        .manager
        .list_log_files()
        .inspect_err(|e| error!("Error retrieving log files: {}", e))?
        .iter()
        .filter_map(|path| path.file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .collect();

    Ok(Json(LogFilesResponse {
        success: true,
        log_files,
    }))
}

// GET /api/logs?log_file=flash_logs_20240101_120000.log
pub async fn get_logs(
    State(state): State<AppState>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<LogsResponse>, ApiError> {
    let log_file = match query.log_file.filter(|name| !name.is_empty()) {
        Some(name) => name,
        None => state
            .manager
            .latest_log()?
            .and_then(|path| path.file_name().map(|n| n.to_string_lossy().into_owned()))
            .ok_or(ApiError::NoLogFiles)?,
    };

    let logs = state.manager.read_log(&log_file)?;
    Ok(Json(LogsResponse {
        success: true,
        logs,
        log_file,
    }))
}

// GET /health
pub async fn get_health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

#[cfg(test)]
mod tests {
    use super::*;
    use ffu_core::{FleetConfig, SessionState};
    use std::path::Path;
    use tempfile::TempDir;

    fn state_with(config: FleetConfig) -> AppState {
        let (_tx, shutdown) = tokio::sync::watch::channel(false);
        AppState {
            manager: Arc::new(FleetManager::new(config)),
            shutdown,
        }
    }

    fn config_in(dir: &Path, updater_script: &str) -> FleetConfig {
        let mut config = FleetConfig::default();
        config.updater.program = "sh".to_string();
        config.updater.args = vec!["-c".to_string(), updater_script.to_string()];
        config.updater.working_dir = None;
        config.logs.dir = dir.to_path_buf();
        config
    }

    fn device(name: &str, address: &str, selected: bool) -> Device {
        Device {
            name: name.to_string(),
            address: address.to_string(),
            selected,
        }
    }

    #[tokio::test]
    async fn test_start_update_rejects_empty_selection() {
        let temp = TempDir::new().unwrap();
        let state = state_with(config_in(temp.path(), "true"));

        let request = StartUpdateRequest {
            devices: vec![device("dev1", "fd00::1", false)],
            build_dir: None,
            update_mode: None,
            stall_timeout: None,
        };
        let err = post_start_update(State(state), Json(request)).await.unwrap_err();
        assert!(matches!(err, ApiError::NoDevices));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_start_update_conflicts_while_running() {
        let temp = TempDir::new().unwrap();
        let state = state_with(config_in(temp.path(), "sleep 1"));

        let request = || StartUpdateRequest {
            devices: vec![device("dev1", "fd00::1", true)],
            build_dir: Some("/nonexistent/build".into()),
            update_mode: Some(UpdateMode::Force),
            stall_timeout: Some(60),
        };

        let started = post_start_update(State(state.clone()), Json(request()))
            .await
            .unwrap();
        assert!(started.success);
        assert_eq!(started.message, "Update process started");

        let err = post_start_update(State(state.clone()), Json(request()))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);

        let status = get_update_status(State(state)).await;
        assert_eq!(status.state, SessionState::Updating);
        assert_eq!(status.total_devices, 1);
    }

    #[tokio::test]
    async fn test_logs_default_to_latest() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("flash_logs_1.log"), "first run\n").unwrap();
        let state = state_with(config_in(temp.path(), "true"));

        let files = get_log_files(State(state.clone())).await.unwrap();
        assert_eq!(files.log_files, vec!["flash_logs_1.log"]);

        let logs = get_logs(State(state.clone()), Query(LogsQuery { log_file: None }))
            .await
            .unwrap();
        assert_eq!(logs.log_file, "flash_logs_1.log");
        assert_eq!(logs.logs, "first run\n");

        let missing = get_logs(
            State(state),
            Query(LogsQuery {
                log_file: Some("flash_logs_9.log".to_string()),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_logs_refuse_non_log_files() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("ffu.toml"), "bind_addr = \"0.0.0.0:5000\"\n").unwrap();
        let state = state_with(config_in(temp.path(), "true"));

        let err = get_logs(
            State(state),
            Query(LogsQuery {
                log_file: Some("ffu.toml".to_string()),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_logs_without_any_files() {
        let temp = TempDir::new().unwrap();
        let state = state_with(config_in(temp.path(), "true"));

        let err = get_logs(State(state), Query(LogsQuery { log_file: None }))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NoLogFiles));
    }

    #[tokio::test]
    async fn test_discover_failure_is_bad_gateway() {
        let temp = TempDir::new().unwrap();
        let mut config = config_in(temp.path(), "true");
        config.discovery.program = "ffu-no-such-browser".to_string();
        let state = state_with(config);

        let err = post_discover(State(state.clone())).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
        assert!(get_devices(State(state)).await.is_empty());
    }
}
