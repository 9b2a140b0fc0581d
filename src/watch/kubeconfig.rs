//! API server endpoint discovery.
//!
//! # Responsibilities
//! - In-cluster: service host/port env vars, service-account token and CA
//! - Out-of-cluster: the current context of a kubeconfig file
//!
//! # Design Decisions
//! - Bearer tokens only; client-certificate users are rejected
//! - Token files are re-read on every request so rotated tokens are picked up
//! - Relative paths in a kubeconfig resolve against the file's directory

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

use super::client::SourceError;

const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

/// How requests authenticate to the API server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    None,
    Token(String),
    TokenFile(PathBuf),
}

impl Credentials {
    /// Current bearer token, if any. Token files are reread on every call
    /// so rotated service account tokens are picked up.
    pub async fn bearer(&self) -> Result<Option<String>, SourceError> {
        match self {
            Credentials::None => Ok(None),
            Credentials::Token(token) => Ok(Some(token.clone())),
            Credentials::TokenFile(path) => tokio::fs::read_to_string(path)
                .await
                .map(|t| Some(t.trim().to_string()))
                .map_err(|source| SourceError::Io {
                    path: path.clone(),
                    source,
                }),
        }
    }
}

/// Where and how to reach the API server.
#[derive(Debug, Clone)]
pub struct ClusterEndpoint {
    pub server: Url,
    pub ca_pem: Option<Vec<u8>>,
    pub insecure_skip_tls_verify: bool,
    pub credentials: Credentials,
}

impl ClusterEndpoint {
    /// Endpoint for a pod running inside the cluster.
    pub fn in_cluster() -> Result<Self, SourceError> {
        let host = std::env::var("KUBERNETES_SERVICE_HOST")
            .map_err(|_| SourceError::Kubeconfig("KUBERNETES_SERVICE_HOST is not set".into()))?;
        let port = std::env::var("KUBERNETES_SERVICE_PORT")
            .map_err(|_| SourceError::Kubeconfig("KUBERNETES_SERVICE_PORT is not set".into()))?;
        Self::in_cluster_from(&host, &port, Path::new(SERVICE_ACCOUNT_DIR))
    }

    pub(crate) fn in_cluster_from(
        host: &str,
        port: &str,
        account_dir: &Path,
    ) -> Result<Self, SourceError> {
        let host = if host.contains(':') {
            format!("[{host}]")
        } else {
            host.to_string()
        };
        let server = parse_server(&format!("https://{host}:{port}"))?;

        let ca_path = account_dir.join("ca.crt");
        let ca_pem = fs::read(&ca_path).map_err(|source| SourceError::Io {
            path: ca_path,
            source,
        })?;

        Ok(Self {
            server,
            ca_pem: Some(ca_pem),
            insecure_skip_tls_verify: false,
            credentials: Credentials::TokenFile(account_dir.join("token")),
        })
    }

    /// Endpoint from the current context of a kubeconfig file.
    pub fn from_kubeconfig(path: &Path) -> Result<Self, SourceError> {
        let text = fs::read_to_string(path).map_err(|source| SourceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_kubeconfig_str(&text, base_dir)
    }

    pub fn from_kubeconfig_str(text: &str, base_dir: &Path) -> Result<Self, SourceError> {
        let config: Kubeconfig = serde_yaml::from_str(text)
            .map_err(|e| SourceError::Kubeconfig(format!("malformed kubeconfig: {e}")))?;

        let context_name = config
            .current_context
            .as_deref()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| SourceError::Kubeconfig("no current-context set".into()))?;
        let context = config
            .contexts
            .iter()
            .find(|c| c.name == context_name)
            .map(|c| &c.context)
            .ok_or_else(|| SourceError::Kubeconfig(format!("context '{context_name}' not found")))?;
        let cluster = config
            .clusters
            .iter()
            .find(|c| c.name == context.cluster)
            .map(|c| &c.cluster)
            .ok_or_else(|| {
                SourceError::Kubeconfig(format!("cluster '{}' not found", context.cluster))
            })?;

        let ca_pem = match (&cluster.certificate_authority_data, &cluster.certificate_authority) {
            (Some(data), _) => Some(
                STANDARD
                    .decode(data.trim())
                    .map_err(|e| SourceError::Kubeconfig(format!("bad certificate-authority-data: {e}")))?,
            ),
            (None, Some(file)) => {
                let path = base_dir.join(file);
                Some(fs::read(&path).map_err(|source| SourceError::Io { path, source })?)
            }
            (None, None) => None,
        };

        let user = match &context.user {
            Some(name) => config.users.iter().find(|u| &u.name == name).map(|u| &u.user),
            None => None,
        };
        let credentials = match user {
            Some(User { token: Some(token), .. }) => Credentials::Token(token.clone()),
            Some(User { token_file: Some(file), .. }) => Credentials::TokenFile(base_dir.join(file)),
            Some(user) if user.uses_client_certificate() => {
                return Err(SourceError::Kubeconfig(
                    "client certificate authentication is not supported; use a token".into(),
                ))
            }
            _ => Credentials::None,
        };

        Ok(Self {
            server: parse_server(&cluster.server)?,
            ca_pem,
            insecure_skip_tls_verify: cluster.insecure_skip_tls_verify,
            credentials,
        })
    }

    /// Default kubeconfig location, `~/.kube/config`.
    pub fn default_kubeconfig_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".kube")
            .join("config")
    }
}

/// Parse the server URL and make sure joins keep its path.
fn parse_server(raw: &str) -> Result<Url, SourceError> {
    let mut url = Url::parse(raw)
        .map_err(|e| SourceError::Kubeconfig(format!("invalid server URL '{raw}': {e}")))?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct Kubeconfig {
    #[serde(default)]
    current_context: Option<String>,
    #[serde(default)]
    contexts: Vec<NamedContext>,
    #[serde(default)]
    clusters: Vec<NamedCluster>,
    #[serde(default)]
    users: Vec<NamedUser>,
}

#[derive(Debug, Deserialize)]
struct NamedContext {
    name: String,
    context: Context,
}

#[derive(Debug, Deserialize)]
struct Context {
    cluster: String,
    #[serde(default)]
    user: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NamedCluster {
    name: String,
    cluster: Cluster,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct Cluster {
    server: String,
    #[serde(default)]
    certificate_authority: Option<String>,
    #[serde(default)]
    certificate_authority_data: Option<String>,
    #[serde(default)]
    insecure_skip_tls_verify: bool,
}

#[derive(Debug, Deserialize)]
struct NamedUser {
    name: String,
    #[serde(default)]
    user: User,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct User {
    #[serde(default)]
    token: Option<String>,
    #[serde(default, rename = "tokenFile")]
    token_file: Option<String>,
    #[serde(default)]
    client_certificate: Option<String>,
    #[serde(default)]
    client_certificate_data: Option<String>,
}

impl User {
    fn uses_client_certificate(&self) -> bool {
        self.client_certificate.is_some() || self.client_certificate_data.is_some()
    }
}
