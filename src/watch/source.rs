//! Snapshot source backed by a ConfigMap.

use async_trait::async_trait;
use std::sync::Arc;

use super::client::{KubeClient, SourceError};
use super::types::ConfigMap;
use crate::snapshot::Snapshot;

/// Where the reconciler reads the declared mirror list from.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Fetch the authoritative current snapshot.
    async fn fetch(&self) -> Result<Snapshot, SourceError>;

    /// Decode the snapshot carried by an object from a notification.
    fn decode(&self, object: &ConfigMap) -> Result<Snapshot, SourceError>;
}

/// Reads `data[key]` of one ConfigMap.
#[derive(Debug, Clone)]
pub struct ConfigMapSource {
    client: Arc<KubeClient>,
    namespace: String,
    name: String,
    key: String,
}

impl ConfigMapSource {
    pub fn new(
        client: Arc<KubeClient>,
        namespace: impl Into<String>,
        name: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            name: name.into(),
            key: key.into(),
        }
    }
}

#[async_trait]
impl SnapshotSource for ConfigMapSource {
    async fn fetch(&self) -> Result<Snapshot, SourceError> {
        let object = self.client.get_config_map(&self.namespace, &self.name).await?;
        self.decode(&object)
    }

    fn decode(&self, object: &ConfigMap) -> Result<Snapshot, SourceError> {
        decode_key(object, &self.key)
    }
}

/// Decode the YAML list stored under `key`.
pub fn decode_key(object: &ConfigMap, key: &str) -> Result<Snapshot, SourceError> {
    let text = object.value(key).ok_or_else(|| SourceError::MissingKey {
        name: object.metadata.name.clone(),
        key: key.to_string(),
    })?;
    Ok(Snapshot::parse(text)?)
}
