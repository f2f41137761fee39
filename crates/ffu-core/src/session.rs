//! Single-flight update sessions.
//!
//! An [`UpdateSession`] owns the one canonical [`StatusRecord`] and at most
//! one running updater process. `start` flips an atomic in-progress flag,
//! resets the record and hands the process to a background worker task;
//! a second `start` while the flag is set is rejected outright.
//!
//! The child's stdout and stderr share a single pipe, so the worker sees
//! one stream in the order it was written. A blocking reader splits it
//! into lines; the worker runs each one through the [`OutputParser`] under
//! the status write lock and publishes the raw line with the resulting
//! snapshot. When the child exits
//! the record is frozen as `completed` (progress forced to 100); a spawn or
//! read failure freezes it as `error` instead. Either way the flag is
//! released last, by a drop guard, so a panicking worker cannot leave the
//! service wedged.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::process::Command;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::broadcast::{StatusBroadcaster, StatusEvent};
use crate::config::{UpdateConfig, UpdaterConfig};
use crate::discovery::Device;
use crate::error::{SessionError, StartError};
use crate::lines::pump_lines;
use crate::parser::OutputParser;
use crate::status::StatusRecord;

const LINE_BUFFER: usize = 256;

struct SessionInner {
    updater: UpdaterConfig,
    parser: OutputParser,
    broadcaster: StatusBroadcaster,
    status: RwLock<StatusRecord>,
    in_progress: AtomicBool,
}

/// Clears the in-progress flag when the worker finishes or unwinds.
struct InProgressGuard(Arc<SessionInner>);

impl Drop for InProgressGuard {
    fn drop(&mut self) {
        self.0.in_progress.store(false, Ordering::Release);
        debug!("update session slot released");
    }
}

/// The update session state machine. Clones share the same session.
#[derive(Clone)]
pub struct UpdateSession {
    inner: Arc<SessionInner>,
}

impl UpdateSession {
    pub fn new(updater: UpdaterConfig, parser: OutputParser, broadcaster: StatusBroadcaster) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                updater,
                parser,
                broadcaster,
                status: RwLock::new(StatusRecord::default()),
                in_progress: AtomicBool::new(false),
            }),
        }
    }

    /// Snapshot of the current (or last) session's status.
    pub async fn status(&self) -> StatusRecord {
        self.inner.status.read().await.clone()
    }

    pub fn is_in_progress(&self) -> bool {
        self.inner.in_progress.load(Ordering::Acquire)
    }

    pub fn broadcaster(&self) -> &StatusBroadcaster {
        &self.inner.broadcaster
    }

    /// Start updating `devices`.
    ///
    /// Returns [`StartError::AlreadyInProgress`] without touching anything
    /// if a session is running. Otherwise returns a handle to the worker;
    /// dropping the handle does not stop the session.
    pub async fn start(
        &self,
        devices: &[Device],
        config: UpdateConfig,
    ) -> Result<JoinHandle<()>, StartError> {
        if self
            .inner
            .in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("Update already in progress");
            return Err(StartError::AlreadyInProgress);
        }
        let guard = InProgressGuard(self.inner.clone());

        let total = u32::try_from(devices.len()).unwrap_or(u32::MAX);
        let snapshot = {
            let mut record = self.inner.status.write().await;
            *record = StatusRecord::for_session(total);
            record.clone()
        };

        let addresses = devices
            .iter()
            .map(|d| d.address.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        info!(
            devices = total,
            build_dir = ?config.build_dir,
            mode = %config.update_mode,
            "Starting update for {} devices",
            total
        );
        self.inner.broadcaster.publish(StatusEvent::new(
            format!("Starting update for {} devices", total),
            snapshot,
        ));

        let inner = self.inner.clone();
        Ok(tokio::spawn(async move {
            let result = run_updater(&inner, &addresses, &config).await;
            finish_session(&inner, result).await;
            drop(guard);
        }))
    }
}

impl std::fmt::Debug for UpdateSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateSession")
            .field("updater", &self.inner.updater)
            .field("in_progress", &self.is_in_progress())
            .finish()
    }
}

async fn run_updater(
    inner: &SessionInner,
    addresses: &str,
    config: &UpdateConfig,
) -> Result<(), SessionError> {
    // stdout and stderr share one pipe so lines arrive in the order written.
    let (reader, writer) = std::io::pipe()?;
    let stderr_writer = writer.try_clone()?;

    let mut command = Command::new(&inner.updater.program);
    command
        .args(&inner.updater.args)
        .env("BUILD_DIR", &config.build_dir)
        .env("DEVICE_ADDRESSES", addresses)
        .env("UPDATE_MODE", config.update_mode.as_str())
        .env("STALL_TIMEOUT", config.stall_timeout.as_secs().to_string())
        .env("NON_INTERACTIVE", "true")
        .stdin(Stdio::null())
        .stdout(writer)
        .stderr(stderr_writer)
        .kill_on_drop(true);
    if let Some(dir) = &inner.updater.working_dir {
        command.current_dir(dir);
    }

    let spawned = command.spawn();
    // The command holds our copies of the write end; EOF needs them closed.
    drop(command);
    let mut child = spawned.map_err(|source| SessionError::Spawn {
        program: inner.updater.program.clone(),
        source,
    })?;
    debug!(pid = ?child.id(), "updater spawned");

    let (tx, mut rx) = mpsc::channel(LINE_BUFFER);
    let pump = tokio::task::spawn_blocking(move || pump_lines(reader, tx));

    while let Some(line) = rx.recv().await {
        debug!(line = %line, "updater output");
        let snapshot = {
            let mut record = inner.status.write().await;
            inner.parser.classify(&line, &mut record);
            record.clone()
        };
        inner.broadcaster.publish(StatusEvent::new(line, snapshot));
    }

    pump.await
        .map_err(|e| SessionError::ReaderFailed(e.to_string()))??;

    let status = child.wait().await?;
    info!("Updater exited with {}", status);
    Ok(())
}

async fn finish_session(inner: &SessionInner, result: Result<(), SessionError>) {
    let (message, snapshot) = {
        let mut record = inner.status.write().await;
        match &result {
            Ok(()) => {
                record.finish();
                ("Update process completed".to_string(), record.clone())
            }
            Err(e) => {
                record.fail();
                (format!("Error during update: {}", e), record.clone())
            }
        }
    };

    match result {
        Ok(()) => info!(
            successful = snapshot.successful_updates,
            failed = snapshot.failed_updates,
            skipped = snapshot.skipped_updates,
            "Update process completed"
        ),
        Err(_) => error!("{}", message),
    }
    inner.broadcaster.publish(StatusEvent::new(message, snapshot));
}
