use axum::{routing::get, routing::post, Router};
use ffu_core::FleetManager;
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::api::AppState;
use crate::config::ServerConfig;

pub struct FleetServer {
    config: ServerConfig,
    manager: Arc<FleetManager>,
    shutdown_tx: watch::Sender<bool>,
}

impl FleetServer {
    pub fn new(config: ServerConfig) -> anyhow::Result<Self> {
        config.validate()?;

        let manager = Arc::new(FleetManager::new(config.fleet.clone()));
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            config,
            manager,
            shutdown_tx,
        })
    }

    pub fn manager(&self) -> Arc<FleetManager> {
        Arc::clone(&self.manager)
    }

    pub fn router(&self) -> Router {
        let state = AppState {
            manager: Arc::clone(&self.manager),
            shutdown: self.shutdown_tx.subscribe(),
        };

        Router::new()
            .route("/api/discover", post(crate::api::post_discover))
            .route("/api/start_update", post(crate::api::post_start_update))
            .route("/api/update_status", get(crate::api::get_update_status))
            .route("/api/devices", get(crate::api::get_devices))
            .route("/api/log_files", get(crate::api::get_log_files))
            .route("/api/logs", get(crate::api::get_logs))
            .route("/ws/status", get(crate::ws::ws_status))
            .route("/health", get(crate::api::get_health))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    pub async fn start(&self) -> anyhow::Result<()> {
        let app = self.router();
        let shutdown_rx = self.shutdown_tx.subscribe();

        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;
        info!("ffu-server listening on {} (HTTP)", self.config.bind_addr);

        let shutdown_tx = self.shutdown_tx.clone();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                Self::shutdown_signal(shutdown_rx).await;
                // Tell open status sockets to close so the drain can finish.
                let _ = shutdown_tx.send(true);
            })
            .await?;

        info!("ffu-server stopped");
        Ok(())
    }

    async fn shutdown_signal(mut shutdown: watch::Receiver<bool>) {
        #[cfg(unix)]
        let mut sigterm = {
            use tokio::signal::unix::{signal, SignalKind};
            signal(SignalKind::terminate()).ok()
        };

        tokio::select! {
            _ = async {
                #[cfg(unix)]
                {
                    if let Some(ref mut sigterm) = sigterm {
                        sigterm.recv().await;
                    } else {
                        std::future::pending::<()>().await;
                    }
                }
                #[cfg(not(unix))]
                {
                    std::future::pending::<()>().await;
                }
            } => {
                info!("Received SIGTERM, starting graceful shutdown");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT, starting graceful shutdown");
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("Shutdown requested");
                }
            }
        }
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}
