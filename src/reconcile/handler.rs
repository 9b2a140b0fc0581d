//! Lifecycle notification handling.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{Instrument, Span};

use crate::error::AgentResult;
use crate::lifecycle::ShutdownListener;
use crate::node::NodeConfig;
use crate::observability::metrics;
use crate::snapshot::Snapshot;
use crate::watch::{LifecycleEvent, SnapshotSource};

/// What a handled notification did to the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// A new config was written (the service reload was attempted).
    Applied,
    /// Candidate matched the resident config; nothing written.
    Unchanged,
    /// The file was reset to marker-only content.
    Reset,
}

/// Turns lifecycle notifications into node config changes.
///
/// Takes `&mut self` for every operation: one notification is handled at a
/// time, and the resident state has a single owner.
pub struct ConfigMapHandler {
    node: NodeConfig,
    source: Arc<dyn SnapshotSource>,
    span: Span,
}

impl ConfigMapHandler {
    pub fn new(node: NodeConfig, source: Arc<dyn SnapshotSource>) -> Self {
        Self {
            node,
            source,
            span: tracing::info_span!("reconcile"),
        }
    }

    pub fn node(&self) -> &NodeConfig {
        &self.node
    }

    /// Apply `snapshot` if it differs from the resident config.
    pub async fn on_add(&mut self, snapshot: &Snapshot) -> AgentResult<ReconcileOutcome> {
        let mut candidate = self.node.resident().empty_like();
        candidate.build_from_snapshot(snapshot.records())?;

        if self.node.resident().is_equal(candidate.as_ref()) {
            tracing::info!("No updates required");
            return Ok(ReconcileOutcome::Unchanged);
        }

        self.node.apply(candidate).await?;
        tracing::info!(mirrors = snapshot.len(), "New config has been applied");
        Ok(ReconcileOutcome::Applied)
    }

    /// Re-fetch the current snapshot and apply it if it changed since `old`.
    ///
    /// `old` is `None` when the previous object could not be decoded.
    pub async fn on_update(&mut self, old: Option<&Snapshot>) -> AgentResult<ReconcileOutcome> {
        let current = self.source.fetch().await?;
        if let Some(old) = old {
            if old.same_as(&current) {
                tracing::info!("Data is unchanged");
                return Ok(ReconcileOutcome::Unchanged);
            }
        }

        tracing::info!("Data has changed, applying");
        self.on_add(&current).await
    }

    /// Revert the node to an empty mirror list.
    pub async fn on_delete(&mut self) -> AgentResult<ReconcileOutcome> {
        self.node.truncate().await?;
        tracing::info!("Config reset successfully");
        Ok(ReconcileOutcome::Reset)
    }

    /// Handle one notification. Errors are logged and the notification is
    /// dropped; there is no retry.
    pub async fn handle(&mut self, event: LifecycleEvent) -> Option<ReconcileOutcome> {
        let kind = event.kind();
        metrics::record_event(kind);

        let span = tracing::info_span!(parent: &self.span, "event", kind);
        let result = async {
            match event {
                LifecycleEvent::Added(object) => {
                    tracing::info!(version = %object.resource_version(), "ConfigMap added");
                    let snapshot = self.source.fetch().await?;
                    self.on_add(&snapshot).await
                }
                LifecycleEvent::Modified { old, new } => {
                    tracing::info!(
                        old_version = %old.resource_version(),
                        new_version = %new.resource_version(),
                        "ConfigMap updated"
                    );
                    let previous = match self.source.decode(&old) {
                        Ok(snapshot) => Some(snapshot),
                        Err(e) => {
                            tracing::warn!(error = %e, "Previous ConfigMap data unreadable");
                            None
                        }
                    };
                    self.on_update(previous.as_ref()).await
                }
                LifecycleEvent::Deleted(_) => {
                    tracing::info!("ConfigMap deleted");
                    self.on_delete().await
                }
            }
        }
        .instrument(span)
        .await;

        match result {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                tracing::error!(kind, error = %e, "Failed to reconcile, dropping notification");
                None
            }
        }
    }

    /// Consume notifications until the channel closes or shutdown fires.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<LifecycleEvent>,
        mut shutdown: ShutdownListener,
    ) {
        tracing::info!("Reconciler started");
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => {
                        self.handle(event).await;
                    }
                    None => break,
                },
                _ = shutdown.wait() => {
                    tracing::info!("Reconciler received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}
