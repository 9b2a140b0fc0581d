//! runtime-registries-config node agent.
//!
//! # Architecture Overview
//!
//! ```text
//!   ┌──────────────────────────────────────────────────────────────────┐
//!   │                         NODE AGENT                               │
//!   │                                                                  │
//!   │  ┌──────────┐  LifecycleEvent  ┌────────────┐   ┌─────────────┐  │
//!   │  │ informer │ ───── mpsc ────▶ │ reconciler │──▶│ node config │──┼──▶ runtime config file
//!   │  │ (watch)  │                  │  (handler) │   │  (resident) │  │
//!   │  └────▲─────┘                  └─────┬──────┘   └──────┬──────┘  │
//!   │       │                              │ fetch           │ reload  │
//!   └───────┼──────────────────────────────┼─────────────────┼─────────┘
//!           │ list / watch                 │ get             ▼
//!      Kubernetes API  ◀───────────────────┘           systemd (D-Bus)
//! ```
//!
//! # Startup
//! settings → logging → validation → metrics (optional) → backend resolve
//! → node initialize → cluster client → informer + reconciler tasks.
//! Any startup failure exits non-zero.

use clap::Parser;
use std::sync::Arc;
use tokio::sync::mpsc;

use runtime_registries_config::config::{validate_settings, Settings};
use runtime_registries_config::lifecycle::{signals, Shutdown};
use runtime_registries_config::node::service::SystemdController;
use runtime_registries_config::node::NodeConfig;
use runtime_registries_config::observability::{logging, metrics};
use runtime_registries_config::reconcile::ConfigMapHandler;
use runtime_registries_config::runtime;
use runtime_registries_config::watch::{
    ClusterEndpoint, ConfigMapSource, Informer, KubeClient,
};

const EVENT_QUEUE_DEPTH: usize = 16;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::parse();
    logging::init_logging(&settings.log_level, settings.log_format);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "runtime-registries-config starting");

    if let Err(errors) = validate_settings(&settings) {
        for error in &errors {
            tracing::error!(error = %error, "Invalid setting");
        }
        return Err(format!("{} invalid setting(s)", errors.len()).into());
    }

    tracing::info!(
        runtime = %settings.runtime,
        namespace = %settings.namespace,
        configmap = %settings.configmap_name,
        key = %settings.configmap_key,
        in_cluster = settings.in_cluster,
        "Configuration loaded"
    );

    if let Some(addr) = settings.metrics_address {
        metrics::init_metrics(addr);
    }

    let backend = runtime::resolve(&settings.runtime, &settings.runtime_settings())?;
    let mut node = NodeConfig::new(backend, Arc::new(SystemdController::new()))
        .with_service_timeout(settings.service_timeout());
    node.initialize()?;

    let endpoint = if settings.in_cluster {
        ClusterEndpoint::in_cluster()?
    } else {
        let path = settings
            .kubeconfig
            .clone()
            .unwrap_or_else(ClusterEndpoint::default_kubeconfig_path);
        ClusterEndpoint::from_kubeconfig(&path)?
    };
    let client = Arc::new(KubeClient::new(endpoint)?);
    tracing::info!(server = %client.base_url(), "Cluster client ready");

    let source = Arc::new(ConfigMapSource::new(
        Arc::clone(&client),
        settings.namespace.clone(),
        settings.configmap_name.clone(),
        settings.configmap_key.clone(),
    ));
    let handler = ConfigMapHandler::new(node, source);

    let shutdown = Shutdown::new();
    let (tx, rx) = mpsc::channel(EVENT_QUEUE_DEPTH);

    let informer = Informer::new(client, settings.informer_config(), tx);
    let informer_task = tokio::spawn(informer.run(shutdown.subscribe()));
    let reconciler_task = tokio::spawn(handler.run(rx, shutdown.subscribe()));

    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = signals::shutdown_on_signal(signal_shutdown).await {
            tracing::error!(error = %e, "Failed to install signal handlers");
        }
    });

    let (informer_result, reconciler_result) = tokio::join!(informer_task, reconciler_task);
    if let Err(e) = informer_result {
        tracing::error!(error = %e, "Informer task panicked");
    }
    if let Err(e) = reconciler_result {
        tracing::error!(error = %e, "Reconciler task panicked");
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
