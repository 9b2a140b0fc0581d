//! Service control over the systemd D-Bus API.
//!
//! # Responsibilities
//! - Reload-or-restart a unit in "replace" mode
//! - Wait a bounded time for the job to finish
//!
//! # Design Decisions
//! - The JobRemoved subscription is opened before the request so the
//!   completion signal cannot be missed
//! - A timeout does not cancel the job; systemd keeps running it
//! - Connection, request, timeout and job failures are distinct errors

use async_trait::async_trait;
use futures_util::StreamExt;
use std::time::Duration;
use thiserror::Error;
use zbus::zvariant::{ObjectPath, OwnedObjectPath};
use zbus::{proxy, Connection};

const RELOAD_MODE: &str = "replace";

/// Job results treated as a successful reload.
const SUCCESS_RESULTS: [&str; 2] = ["done", "skipped"];

/// Outcome of a reload/restart request that did not complete successfully.
#[derive(Debug, Error)]
pub enum ServiceControlError {
    /// The control channel could not be established.
    #[error("failed to connect to systemd: {0}")]
    Connect(#[source] zbus::Error),

    /// systemd rejected the request.
    #[error("failed to reload or restart {unit}: {source}")]
    Request {
        unit: String,
        #[source]
        source: zbus::Error,
    },

    /// No completion signal arrived within the bound.
    #[error("timeout after {timeout:?} waiting for {unit} to restart")]
    Timeout { unit: String, timeout: Duration },

    /// The signal stream ended before the job finished.
    #[error("systemd connection closed while waiting for {unit}")]
    ChannelClosed { unit: String },

    /// The job finished with a result other than "done" or "skipped".
    #[error("restart job for {unit} finished with result '{result}'")]
    JobFailed { unit: String, result: String },
}

/// Result reported by systemd for a successful job: "done" or "skipped".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobResult(pub String);

/// Anything able to reload or restart a system service.
#[async_trait]
pub trait ServiceControl: Send + Sync {
    async fn reload_or_restart(
        &self,
        unit: &str,
        timeout: Duration,
    ) -> Result<JobResult, ServiceControlError>;
}

#[proxy(
    interface = "org.freedesktop.systemd1.Manager",
    default_service = "org.freedesktop.systemd1",
    default_path = "/org/freedesktop/systemd1"
)]
trait SystemdManager {
    fn subscribe(&self) -> zbus::Result<()>;

    fn reload_or_restart_unit(&self, name: &str, mode: &str) -> zbus::Result<OwnedObjectPath>;

    #[zbus(signal)]
    fn job_removed(
        &self,
        id: u32,
        job: ObjectPath<'_>,
        unit: &str,
        result: &str,
    ) -> zbus::Result<()>;
}

/// systemd controller on the system bus.
///
/// Opens a new bus connection per request.
#[derive(Debug, Default, Clone)]
pub struct SystemdController;

impl SystemdController {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ServiceControl for SystemdController {
    async fn reload_or_restart(
        &self,
        unit: &str,
        timeout: Duration,
    ) -> Result<JobResult, ServiceControlError> {
        let connection = Connection::system()
            .await
            .map_err(ServiceControlError::Connect)?;
        let manager = SystemdManagerProxy::new(&connection)
            .await
            .map_err(ServiceControlError::Connect)?;

        let request_error = |source| ServiceControlError::Request {
            unit: unit.to_string(),
            source,
        };

        let mut removed = manager.receive_job_removed().await.map_err(request_error)?;
        if let Err(e) = manager.subscribe().await {
            tracing::debug!(error = %e, "systemd Subscribe failed");
        }

        let job = manager
            .reload_or_restart_unit(unit, RELOAD_MODE)
            .await
            .map_err(request_error)?;
        tracing::debug!(unit, job = %job.as_str(), "Reload job queued");

        let wait_for_job = async {
            while let Some(signal) = removed.next().await {
                let Ok(args) = signal.args() else {
                    continue;
                };
                if args.job().as_str() == job.as_str() {
                    return Some(args.result().to_string());
                }
            }
            None
        };

        match tokio::time::timeout(timeout, wait_for_job).await {
            Ok(Some(result)) => job_outcome(unit, result),
            Ok(None) => Err(ServiceControlError::ChannelClosed {
                unit: unit.to_string(),
            }),
            Err(_) => Err(ServiceControlError::Timeout {
                unit: unit.to_string(),
                timeout,
            }),
        }
    }
}

/// Map a finished job's result string to success or `JobFailed`.
///
/// `skipped` means systemd had nothing to do for the unit.
fn job_outcome(unit: &str, result: String) -> Result<JobResult, ServiceControlError> {
    if SUCCESS_RESULTS.contains(&result.as_str()) {
        Ok(JobResult(result))
    } else {
        Err(ServiceControlError::JobFailed {
            unit: unit.to_string(),
            result,
        })
    }
}
