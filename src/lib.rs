//! Node agent keeping a container runtime's registry mirrors in sync with a
//! Kubernetes ConfigMap.

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod node;
pub mod observability;
pub mod reconcile;
pub mod resilience;
pub mod runtime;
pub mod snapshot;
pub mod watch;

pub use config::Settings;
pub use error::{AgentError, AgentResult};
pub use lifecycle::Shutdown;
pub use node::NodeConfig;
pub use reconcile::{ConfigMapHandler, ReconcileOutcome};
pub use runtime::{resolve, RuntimeConfig};
pub use snapshot::{ConfigRecord, Snapshot};
