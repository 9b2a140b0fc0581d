//! Shared utilities for integration testing.

#![allow(dead_code)]

use async_trait::async_trait;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use runtime_registries_config::node::service::{JobResult, ServiceControl, ServiceControlError};
use runtime_registries_config::node::NodeConfig;
use runtime_registries_config::runtime::{self, RuntimeSettings};
use runtime_registries_config::snapshot::{ConfigRecord, Snapshot};
use runtime_registries_config::watch::source::decode_key;
use runtime_registries_config::watch::types::{ConfigMap, ObjectMeta};
use runtime_registries_config::watch::{SnapshotSource, SourceError};

pub const DATA_KEY: &str = "registries";

/// How the fake service controller answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadBehavior {
    Done,
    Timeout,
    Failed,
}

/// Service controller that records calls instead of talking to systemd.
#[derive(Debug)]
pub struct RecordingService {
    calls: AtomicUsize,
    units: Mutex<Vec<String>>,
    behavior: Mutex<ReloadBehavior>,
}

impl RecordingService {
    pub fn new(behavior: ReloadBehavior) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            units: Mutex::new(Vec::new()),
            behavior: Mutex::new(behavior),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn units(&self) -> Vec<String> {
        self.units.lock().unwrap().clone()
    }

    pub fn set_behavior(&self, behavior: ReloadBehavior) {
        *self.behavior.lock().unwrap() = behavior;
    }
}

#[async_trait]
impl ServiceControl for RecordingService {
    async fn reload_or_restart(
        &self,
        unit: &str,
        timeout: Duration,
    ) -> Result<JobResult, ServiceControlError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.units.lock().unwrap().push(unit.to_string());

        let behavior = *self.behavior.lock().unwrap();
        match behavior {
            ReloadBehavior::Done => Ok(JobResult("done".into())),
            ReloadBehavior::Timeout => Err(ServiceControlError::Timeout {
                unit: unit.to_string(),
                timeout,
            }),
            ReloadBehavior::Failed => Err(ServiceControlError::JobFailed {
                unit: unit.to_string(),
                result: "failed".into(),
            }),
        }
    }
}

/// Snapshot source backed by an in-memory value.
#[derive(Debug)]
pub struct StaticSource {
    snapshot: Mutex<Option<Snapshot>>,
    fetches: AtomicUsize,
}

impl StaticSource {
    pub fn new(snapshot: Snapshot) -> Arc<Self> {
        Arc::new(Self {
            snapshot: Mutex::new(Some(snapshot)),
            fetches: AtomicUsize::new(0),
        })
    }

    /// Replace the served snapshot; `None` makes fetches fail as not found.
    pub fn set(&self, snapshot: Option<Snapshot>) {
        *self.snapshot.lock().unwrap() = snapshot;
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotSource for StaticSource {
    async fn fetch(&self) -> Result<Snapshot, SourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.snapshot
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| SourceError::NotFound {
                namespace: "default".into(),
                name: "runtime-registry-config".into(),
            })
    }

    fn decode(&self, object: &ConfigMap) -> Result<Snapshot, SourceError> {
        decode_key(object, DATA_KEY)
    }
}

pub fn snapshot(records: &[(&str, &str, bool)]) -> Snapshot {
    Snapshot::new(
        records
            .iter()
            .map(|(original, mirror, insecure)| ConfigRecord::new(*original, *mirror, *insecure))
            .collect(),
    )
    .unwrap()
}

/// ConfigMap whose data key holds `yaml`.
pub fn config_map(resource_version: &str, yaml: &str) -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            name: "runtime-registry-config".into(),
            namespace: "default".into(),
            resource_version: resource_version.into(),
        },
        data: Some([(DATA_KEY.to_string(), yaml.to_string())].into_iter().collect()),
    }
}

/// An initialized cri-o node config rooted under `root`.
pub fn node_config(root: &Path, service: Arc<RecordingService>) -> NodeConfig {
    let settings = RuntimeSettings {
        config_dir: Some(root.join("crio.conf.d")),
        config_file_name: None,
    };
    let backend = runtime::resolve("cri-o", &settings).unwrap();
    let mut node = NodeConfig::new(backend, service);
    node.initialize().unwrap();
    node
}

/// Start a mock API server answering each request by its path and query.
///
/// Returns the bound address.
pub async fn start_programmable_backend<F>(f: F) -> SocketAddr
where
    F: Fn(&str) -> (u16, String) + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let target = read_request_target(&mut socket).await;
                        let (status, body) = f(&target);
                        let status_text = match status {
                            200 => "200 OK",
                            403 => "403 Forbidden",
                            404 => "404 Not Found",
                            500 => "500 Internal Server Error",
                            _ => "200 OK",
                        };

                        let response_str = format!(
                            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Read request headers and return the request target, e.g.
/// `/api/v1/namespaces/default/configmaps/x`.
async fn read_request_target(socket: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
    let head = String::from_utf8_lossy(&buf);
    head.lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or_default()
        .to_string()
}

/// Kubeconfig pointing at a plain-HTTP mock server with a static token.
pub fn kubeconfig_for(addr: SocketAddr) -> String {
    format!(
        r#"apiVersion: v1
kind: Config
current-context: test
clusters:
- name: mock
  cluster:
    server: http://{addr}
contexts:
- name: test
  context:
    cluster: mock
    user: agent
users:
- name: agent
  user:
    token: test-token
"#
    )
}
