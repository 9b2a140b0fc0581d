//! Node runtime configuration state.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     initialize() → ensure dir (0755) → ensure file (marker only, 0644)
//!     → read file → backend.deserialize → resident state
//!
//! Candidate differs from resident:
//!     apply() → serialize → marker + body → overwrite file
//!     → candidate becomes resident → service.rs reload-or-restart
//!
//! Source object deleted:
//!     truncate() → marker only → reload-or-restart → resident reset
//! ```
//!
//! # Design Decisions
//! - The file is written before the resident state is swapped
//! - A failed reload does not roll the file back; file and service may diverge
//!   until the next change
//! - Full overwrite, no rename: a crash mid-write can leave a truncated file
//! - An existing file without the marker is rewritten with it at startup

pub mod service;

use std::fs::{self, DirBuilder, OpenOptions};
use std::io::Write;
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{Instrument, Span};

use crate::error::{AgentError, AgentResult};
use crate::observability::metrics;
use crate::runtime::RuntimeConfig;
use service::{JobResult, ServiceControl, ServiceControlError};

/// First line of every file owned by the agent.
pub const MANAGED_MARKER: &str = "# This configuration is managed by runtime-registries-config";

/// Default bound on waiting for a service reload to finish.
pub const DEFAULT_SERVICE_TIMEOUT: Duration = Duration::from_secs(2);

const DIR_MODE: u32 = 0o755;
const FILE_MODE: u32 = 0o644;

/// Owns the resident backend and the file/service lifecycle around it.
pub struct NodeConfig {
    resident: Box<dyn RuntimeConfig>,
    service: Arc<dyn ServiceControl>,
    service_timeout: Duration,
    span: Span,
}

impl NodeConfig {
    pub fn new(resident: Box<dyn RuntimeConfig>, service: Arc<dyn ServiceControl>) -> Self {
        let span = tracing::info_span!(
            "node_config",
            runtime = %resident.kind(),
            path = %resident.config_file_path().display(),
        );
        Self {
            resident,
            service,
            service_timeout: DEFAULT_SERVICE_TIMEOUT,
            span,
        }
    }

    pub fn with_service_timeout(mut self, timeout: Duration) -> Self {
        self.service_timeout = timeout;
        self
    }

    /// The currently applied backend state.
    pub fn resident(&self) -> &dyn RuntimeConfig {
        self.resident.as_ref()
    }

    pub fn config_path(&self) -> PathBuf {
        self.resident.config_file_path()
    }

    /// Ensure the directory and file exist, then load the file into the
    /// resident backend.
    ///
    /// # Errors
    /// Directory/file creation, read, or parse failures. All are fatal at
    /// startup.
    pub fn initialize(&mut self) -> AgentResult<()> {
        let _enter = self.span.enter();

        let dir = self.resident.config_dir().to_path_buf();
        if !dir.exists() {
            DirBuilder::new()
                .recursive(true)
                .mode(DIR_MODE)
                .create(&dir)
                .map_err(|e| AgentError::io(&dir, e))?;
            tracing::info!(dir = %dir.display(), "Created runtime config directory");
        }

        let path = self.config_path();
        if !path.exists() {
            write_file(&path, &render(""))?;
            tracing::info!("Created runtime config file");
        }

        let content = fs::read_to_string(&path).map_err(|e| AgentError::io(&path, e))?;
        self.resident.deserialize(&path, &content)?;
        if !content.starts_with(MANAGED_MARKER) {
            tracing::warn!("Runtime config file has no managed marker, rewriting it");
            write_file(&path, &render(&self.resident.serialize()?))?;
        }
        metrics::record_resident_mirrors(self.resident.mirror_count());

        tracing::info!(
            mirrors = self.resident.mirror_count(),
            "Node runtime config loaded"
        );
        Ok(())
    }

    /// Write `candidate` to disk, adopt it as resident, and reload the service.
    ///
    /// # Errors
    /// - Serialization or write failure: resident state is unchanged.
    /// - Reload failure: the file and resident state already reflect
    ///   `candidate`.
    pub async fn apply(&mut self, candidate: Box<dyn RuntimeConfig>) -> AgentResult<()> {
        let span = self.span.clone();
        async move {
            let path = self.config_path();
            let written = match candidate.serialize() {
                Ok(body) => write_file_async(&path, &render(&body)).await,
                Err(e) => Err(e),
            };
            if let Err(e) = written {
                metrics::record_apply("write_failed");
                return Err(e);
            }

            self.resident = candidate;
            metrics::record_resident_mirrors(self.resident.mirror_count());
            tracing::info!(
                mirrors = self.resident.mirror_count(),
                "Runtime config written"
            );

            match self.reload_service().await {
                Ok(_) => {
                    metrics::record_apply("applied");
                    Ok(())
                }
                Err(e) => {
                    metrics::record_apply("reload_failed");
                    Err(e.into())
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Reset the file to marker-only content, reload the service, and clear
    /// the resident backend.
    ///
    /// # Errors
    /// - Write failure: nothing else happens.
    /// - Reload failure: returned after the resident state is cleared.
    pub async fn truncate(&mut self) -> AgentResult<()> {
        let span = self.span.clone();
        async move {
            let path = self.config_path();
            write_file_async(&path, &render("")).await?;

            let reloaded = self.reload_service().await;
            self.resident.reset();
            metrics::record_resident_mirrors(0);
            tracing::info!("Runtime config truncated");

            reloaded.map(|_| ()).map_err(AgentError::from)
        }
        .instrument(span)
        .await
    }

    /// Ask the service controller to reload-or-restart the managed unit.
    pub async fn reload_service(&self) -> Result<JobResult, ServiceControlError> {
        let unit = self.resident.service_name();
        match self.service.reload_or_restart(unit, self.service_timeout).await {
            Ok(result) => {
                metrics::record_service_reload("ok");
                tracing::info!(unit, result = %result.0, "Service reloaded");
                Ok(result)
            }
            Err(e) => {
                let outcome = match e {
                    ServiceControlError::Timeout { .. } => "timeout",
                    ServiceControlError::Connect(_) | ServiceControlError::ChannelClosed { .. } => {
                        "connect"
                    }
                    _ => "failed",
                };
                metrics::record_service_reload(outcome);
                tracing::error!(unit, error = %e, "Service reload failed");
                Err(e)
            }
        }
    }
}

/// Marker line followed by the backend body.
fn render(body: &str) -> String {
    format!("{MANAGED_MARKER}\n{body}")
}

/// Overwrite `path` from a running reconcile without blocking the runtime.
async fn write_file_async(path: &Path, content: &str) -> AgentResult<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(FILE_MODE)
        .open(path)
        .await
        .map_err(|e| AgentError::io(path, e))?;
    file.write_all(content.as_bytes())
        .await
        .map_err(|e| AgentError::io(path, e))?;
    file.flush().await.map_err(|e| AgentError::io(path, e))
}

fn write_file(path: &Path, content: &str) -> AgentResult<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(FILE_MODE)
        .open(path)
        .map_err(|e| AgentError::io(path, e))?;
    file.write_all(content.as_bytes())
        .map_err(|e| AgentError::io(path, e))
}
