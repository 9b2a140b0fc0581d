//! Minimal Kubernetes API client for ConfigMaps.
//!
//! # Responsibilities
//! - GET a single ConfigMap
//! - LIST ConfigMaps matching a field selector
//! - Open a WATCH stream from a resource version

use reqwest::StatusCode;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use super::kubeconfig::{ClusterEndpoint, Credentials};
use super::stream::WatchStream;
use super::types::{ConfigMap, ConfigMapList};
use crate::snapshot::SnapshotError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors raised while reading the remote source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("API server returned {status} for {url}: {body}")]
    Status {
        url: String,
        status: StatusCode,
        body: String,
    },

    #[error("ConfigMap {namespace}/{name} not found")]
    NotFound { namespace: String, name: String },

    #[error("ConfigMap {name} does not contain key {key}")]
    MissingKey { name: String, key: String },

    #[error("malformed API response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error("kubeconfig error: {0}")]
    Kubeconfig(String),

    #[error("failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("watch failed: {0}")]
    Watch(String),

    #[error("watch stream read failed: {0}")]
    Stream(#[source] std::io::Error),
}

/// ConfigMap reader bound to one API server.
#[derive(Debug, Clone)]
pub struct KubeClient {
    http: reqwest::Client,
    base: Url,
    credentials: Credentials,
}

impl KubeClient {
    pub fn new(endpoint: ClusterEndpoint) -> Result<Self, SourceError> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(concat!("runtime-registries-config/", env!("CARGO_PKG_VERSION")));

        if let Some(pem) = &endpoint.ca_pem {
            let cert = reqwest::Certificate::from_pem(pem).map_err(|source| SourceError::Http {
                url: endpoint.server.to_string(),
                source,
            })?;
            builder = builder.add_root_certificate(cert);
        }
        if endpoint.insecure_skip_tls_verify {
            tracing::warn!(server = %endpoint.server, "TLS verification disabled for API server");
            builder = builder.danger_accept_invalid_certs(true);
        }

        let http = builder.build().map_err(|source| SourceError::Http {
            url: endpoint.server.to_string(),
            source,
        })?;

        Ok(Self {
            http,
            base: endpoint.server,
            credentials: endpoint.credentials,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// GET `/api/v1/namespaces/{namespace}/configmaps/{name}`.
    pub async fn get_config_map(&self, namespace: &str, name: &str) -> Result<ConfigMap, SourceError> {
        let url = self.url(&format!("api/v1/namespaces/{namespace}/configmaps/{name}"))?;
        let response = self.send(url.clone(), REQUEST_TIMEOUT).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(SourceError::NotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            });
        }
        let body = Self::success_body(url, response).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// LIST ConfigMaps in `namespace` matching `field_selector`.
    pub async fn list_config_maps(
        &self,
        namespace: &str,
        field_selector: &str,
    ) -> Result<ConfigMapList, SourceError> {
        let mut url = self.url(&format!("api/v1/namespaces/{namespace}/configmaps"))?;
        url.query_pairs_mut()
            .append_pair("fieldSelector", field_selector);
        let response = self.send(url.clone(), REQUEST_TIMEOUT).await?;
        let body = Self::success_body(url, response).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Open a WATCH starting after `resource_version`.
    ///
    /// The server closes the stream after `timeout`.
    pub async fn watch_config_maps(
        &self,
        namespace: &str,
        field_selector: &str,
        resource_version: &str,
        timeout: Duration,
    ) -> Result<WatchStream, SourceError> {
        let mut url = self.url(&format!("api/v1/namespaces/{namespace}/configmaps"))?;
        url.query_pairs_mut()
            .append_pair("watch", "true")
            .append_pair("fieldSelector", field_selector)
            .append_pair("resourceVersion", resource_version)
            .append_pair("allowWatchBookmarks", "true")
            .append_pair("timeoutSeconds", &timeout.as_secs().to_string());

        let mut request = self.http.get(url.clone());
        if let Some(token) = self.credentials.bearer().await? {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.map_err(|source| SourceError::Http {
            url: url.to_string(),
            source,
        })?;
        if !response.status().is_success() {
            let body = Self::success_body(url, response).await;
            return Err(body.err().unwrap_or_else(|| SourceError::Watch("unexpected status".into())));
        }
        Ok(WatchStream::new(response))
    }

    fn url(&self, path: &str) -> Result<Url, SourceError> {
        self.base
            .join(path)
            .map_err(|e| SourceError::Kubeconfig(format!("invalid API path '{path}': {e}")))
    }

    async fn send(&self, url: Url, timeout: Duration) -> Result<reqwest::Response, SourceError> {
        let mut request = self.http.get(url.clone()).timeout(timeout);
        if let Some(token) = self.credentials.bearer().await? {
            request = request.bearer_auth(token);
        }
        request.send().await.map_err(|source| SourceError::Http {
            url: url.to_string(),
            source,
        })
    }

    async fn success_body(url: Url, response: reqwest::Response) -> Result<Vec<u8>, SourceError> {
        let status = response.status();
        let bytes = response.bytes().await.map_err(|source| SourceError::Http {
            url: url.to_string(),
            source,
        })?;
        if !status.is_success() {
            return Err(SourceError::Status {
                url: url.to_string(),
                status,
                body: String::from_utf8_lossy(&bytes).trim().to_string(),
            });
        }
        Ok(bytes.to_vec())
    }
}
