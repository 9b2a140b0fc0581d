//! Agent settings from command-line flags and environment variables.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::observability::logging::LogFormat;
use crate::runtime::RuntimeSettings;
use crate::watch::InformerConfig;

/// Keeps a container runtime's registry mirrors in sync with a ConfigMap.
#[derive(Debug, Clone, Parser)]
#[command(name = "runtime-registries-config", version, about, long_about = None)]
pub struct Settings {
    /// Container runtime backend.
    #[arg(long = "runtime", env = "CRI", default_value = "cri-o")]
    pub runtime: String,

    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// `pretty` or `json`.
    #[arg(long, env = "LOG_FORMAT", default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// Directory holding the runtime config file (backend default if unset).
    #[arg(long, env = "NODE_CONFIG_PATH")]
    pub node_config_path: Option<PathBuf>,

    /// Runtime config file name (backend default if unset).
    #[arg(long, env = "NODE_CONFIG_NAME")]
    pub node_config_name: Option<String>,

    #[arg(long, env = "CM_NAME", default_value = "runtime-registry-config")]
    pub configmap_name: String,

    /// ConfigMap data key holding the mirror list.
    #[arg(long, env = "CM_DATA_KEY", default_value = "registries")]
    pub configmap_key: String,

    #[arg(long, env = "NAMESPACE", default_value = "default")]
    pub namespace: String,

    /// Use the pod's service account instead of a kubeconfig.
    #[arg(long, env = "IN_CLUSTER", default_value_t = true, action = clap::ArgAction::Set)]
    pub in_cluster: bool,

    /// Kubeconfig used when not running in-cluster (default `~/.kube/config`).
    #[arg(long, env = "KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,

    /// Seconds to wait for a service reload to finish.
    #[arg(long, env = "SERVICE_RESTART_TIMEOUT", default_value_t = 2)]
    pub service_timeout_secs: u64,

    /// Server-side timeout of one watch request, in seconds.
    #[arg(long, env = "WATCH_TIMEOUT", default_value_t = 300)]
    pub watch_timeout_secs: u64,

    #[arg(long, env = "WATCH_BACKOFF_BASE_MS", default_value_t = 500)]
    pub backoff_base_ms: u64,

    #[arg(long, env = "WATCH_BACKOFF_MAX_MS", default_value_t = 30_000)]
    pub backoff_max_ms: u64,

    /// Prometheus exporter address; disabled if unset.
    #[arg(long, env = "METRICS_ADDRESS")]
    pub metrics_address: Option<SocketAddr>,
}

impl Settings {
    pub fn runtime_settings(&self) -> RuntimeSettings {
        RuntimeSettings {
            config_dir: self.node_config_path.clone(),
            config_file_name: self.node_config_name.clone(),
        }
    }

    pub fn informer_config(&self) -> InformerConfig {
        InformerConfig {
            namespace: self.namespace.clone(),
            name: self.configmap_name.clone(),
            watch_timeout: Duration::from_secs(self.watch_timeout_secs),
            backoff_base_ms: self.backoff_base_ms,
            backoff_max_ms: self.backoff_max_ms,
        }
    }

    pub fn service_timeout(&self) -> Duration {
        Duration::from_secs(self.service_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::try_parse_from(["runtime-registries-config"]).unwrap();
        assert_eq!(settings.configmap_key, "registries");
        assert_eq!(settings.service_timeout(), Duration::from_secs(2));
        assert_eq!(settings.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_flags_override() {
        let settings = Settings::try_parse_from([
            "runtime-registries-config",
            "--runtime",
            "cri-o",
            "--in-cluster",
            "false",
            "--node-config-path",
            "/tmp/crio.d",
            "--log-format",
            "json",
            "--metrics-address",
            "127.0.0.1:9100",
        ])
        .unwrap();
        assert!(!settings.in_cluster);
        assert_eq!(settings.log_format, LogFormat::Json);
        assert_eq!(
            settings.runtime_settings().config_dir,
            Some(PathBuf::from("/tmp/crio.d"))
        );
        assert!(settings.metrics_address.is_some());
    }
}
