//! Remote source: ConfigMap access and change notifications.
//!
//! # Data Flow
//! ```text
//! kubeconfig.rs (in-cluster or kubeconfig endpoint)
//!     → client.rs (GET / LIST / WATCH over HTTPS)
//!     → informer.rs (store + lifecycle notifications) → mpsc → reconciler
//!     → source.rs (authoritative snapshot fetch for the reconciler)
//! ```
//!
//! # Design Decisions
//! - One informer task per process; it never touches node state
//! - Only a single named object is watched (field selector on name)

pub mod client;
pub mod informer;
pub mod kubeconfig;
pub mod source;
pub mod stream;
pub mod types;

pub use client::{KubeClient, SourceError};
pub use informer::{Informer, InformerConfig, LifecycleEvent, ObjectStore};
pub use kubeconfig::{ClusterEndpoint, Credentials};
pub use source::{ConfigMapSource, SnapshotSource};
pub use types::ConfigMap;
