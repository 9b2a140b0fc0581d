//! List/watch loop for a single named ConfigMap.
//!
//! # Responsibilities
//! - List, diff against the local store, emit lifecycle notifications
//! - Watch from the list's resource version and translate events
//! - Resubscribe after every termination, backing off on failures
//!
//! # Design Decisions
//! - The store survives restarts, so a relist only emits real changes
//! - Notifications go through a bounded channel to a single consumer;
//!   the informer waits when the reconciler is busy
//! - ERROR events (e.g. 410 Gone) end the session and force a relist
//! - A clean close is reopened at once only after a live watch (an event
//!   arrived or half the watch timeout passed); early closes back off

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use super::client::{KubeClient, SourceError};
use super::types::{ConfigMap, Status, WatchEventType};
use crate::lifecycle::ShutdownListener;
use crate::observability::metrics;
use crate::resilience::Backoff;

/// Extra time allowed past the server-side watch timeout before the
/// connection is considered dead.
const IDLE_GRACE: Duration = Duration::from_secs(60);

/// Add/update/delete signal about the watched object.
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    Added(ConfigMap),
    Modified { old: ConfigMap, new: ConfigMap },
    Deleted(ConfigMap),
}

impl LifecycleEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            LifecycleEvent::Added(_) => "added",
            LifecycleEvent::Modified { .. } => "modified",
            LifecycleEvent::Deleted(_) => "deleted",
        }
    }
}

/// Last observed state of the watched object.
#[derive(Debug, Default)]
pub struct ObjectStore {
    current: Option<ConfigMap>,
}

impl ObjectStore {
    pub fn current(&self) -> Option<&ConfigMap> {
        self.current.as_ref()
    }

    /// Replace the store with a fresh list result.
    pub fn replace(&mut self, listed: Option<ConfigMap>) -> Option<LifecycleEvent> {
        match (self.current.take(), listed) {
            (None, Some(new)) => {
                self.current = Some(new.clone());
                Some(LifecycleEvent::Added(new))
            }
            (Some(old), Some(new)) => {
                self.current = Some(new.clone());
                (old.resource_version() != new.resource_version())
                    .then_some(LifecycleEvent::Modified { old, new })
            }
            (Some(old), None) => Some(LifecycleEvent::Deleted(old)),
            (None, None) => None,
        }
    }

    /// Apply one watch event.
    pub fn observe(&mut self, kind: WatchEventType, object: ConfigMap) -> Option<LifecycleEvent> {
        match kind {
            WatchEventType::Added | WatchEventType::Modified => self.replace(Some(object)),
            WatchEventType::Deleted => {
                self.current = None;
                Some(LifecycleEvent::Deleted(object))
            }
            WatchEventType::Bookmark | WatchEventType::Error => None,
        }
    }
}

/// What the informer watches and how it restarts.
#[derive(Debug, Clone)]
pub struct InformerConfig {
    pub namespace: String,
    pub name: String,
    pub watch_timeout: Duration,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

/// Why a list/watch session ended without an error.
#[derive(Debug, PartialEq, Eq)]
enum SessionEnd {
    /// The server closed the watch. `healthy` is false for a close that came
    /// before any event and before half the watch timeout.
    StreamClosed { healthy: bool },
    ReceiverGone,
}

pub struct Informer {
    client: Arc<KubeClient>,
    config: InformerConfig,
    store: ObjectStore,
    tx: mpsc::Sender<LifecycleEvent>,
}

impl Informer {
    pub fn new(
        client: Arc<KubeClient>,
        config: InformerConfig,
        tx: mpsc::Sender<LifecycleEvent>,
    ) -> Self {
        Self {
            client,
            config,
            store: ObjectStore::default(),
            tx,
        }
    }

    /// Run until shutdown or until the reconciler goes away.
    pub async fn run(mut self, mut shutdown: ShutdownListener) {
        let mut backoff = Backoff::new(self.config.backoff_base_ms, self.config.backoff_max_ms);

        loop {
            tracing::info!(
                namespace = %self.config.namespace,
                name = %self.config.name,
                "Starting ConfigMap watch"
            );

            let result = tokio::select! {
                result = self.session(&mut backoff) => result,
                _ = shutdown.wait() => {
                    tracing::info!("Informer received shutdown signal, exiting loop");
                    return;
                }
            };

            let delay = match result {
                Ok(SessionEnd::ReceiverGone) => {
                    tracing::info!("Reconciler stopped, informer exiting");
                    return;
                }
                Ok(SessionEnd::StreamClosed { healthy: true }) => {
                    tracing::debug!("Watch stream closed, resubscribing");
                    backoff.reset();
                    Duration::ZERO
                }
                Ok(SessionEnd::StreamClosed { healthy: false }) => {
                    let delay = backoff.next_delay();
                    tracing::warn!(
                        attempt = backoff.failures(),
                        delay = ?delay,
                        "Watch closed early without events, resubscribing after backoff"
                    );
                    delay
                }
                Err(e) => {
                    let delay = backoff.next_delay();
                    tracing::warn!(
                        error = %e,
                        attempt = backoff.failures(),
                        delay = ?delay,
                        "Watch failed, resubscribing after backoff"
                    );
                    delay
                }
            };
            metrics::record_watch_restart();

            if !delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown.wait() => {
                        tracing::info!("Informer received shutdown signal, exiting loop");
                        return;
                    }
                }
            }
        }
    }

    /// One list followed by one watch.
    ///
    /// `backoff` is reset as soon as the watch delivers a non-error event.
    async fn session(&mut self, backoff: &mut Backoff) -> Result<SessionEnd, SourceError> {
        let selector = format!("metadata.name={}", self.config.name);
        let list = self
            .client
            .list_config_maps(&self.config.namespace, &selector)
            .await?;

        let listed = list
            .items
            .into_iter()
            .find(|item| item.metadata.name == self.config.name);
        if let Some(event) = self.store.replace(listed) {
            if !self.emit(event).await {
                return Ok(SessionEnd::ReceiverGone);
            }
        }

        let mut stream = self
            .client
            .watch_config_maps(
                &self.config.namespace,
                &selector,
                &list.metadata.resource_version,
                self.config.watch_timeout,
            )
            .await?;
        let opened = Instant::now();
        let idle_limit = self.config.watch_timeout + IDLE_GRACE;
        let mut received = 0usize;

        loop {
            let next = tokio::time::timeout(idle_limit, stream.next_event())
                .await
                .map_err(|_| SourceError::Watch(format!("no data for {idle_limit:?}")))??;
            let Some(event) = next else {
                let healthy =
                    received > 0 || opened.elapsed() >= self.config.watch_timeout / 2;
                return Ok(SessionEnd::StreamClosed { healthy });
            };

            if event.kind == WatchEventType::Error {
                return Err(SourceError::Watch(describe_status(event.object)));
            }
            received += 1;
            backoff.reset();

            if event.kind == WatchEventType::Bookmark {
                continue;
            }
            let object: ConfigMap = serde_json::from_value(event.object)?;
            if object.metadata.name != self.config.name {
                continue;
            }
            if let Some(event) = self.store.observe(event.kind, object) {
                if !self.emit(event).await {
                    return Ok(SessionEnd::ReceiverGone);
                }
            }
        }
    }

    async fn emit(&self, event: LifecycleEvent) -> bool {
        tracing::debug!(kind = event.kind(), "Delivering lifecycle notification");
        self.tx.send(event).await.is_ok()
    }
}

/// Render the `Status` of an ERROR event, or the raw object when it has none.
fn describe_status(object: serde_json::Value) -> String {
    match serde_json::from_value::<Status>(object.clone()) {
        Ok(status) if status.code != 0 => {
            format!("{} {}: {}", status.code, status.reason, status.message)
        }
        _ => format!("error event with unrecognized status: {object}"),
    }
}
