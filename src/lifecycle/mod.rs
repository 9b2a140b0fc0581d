//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Settings → resolve backend → initialize node config
//!     → build API client → spawn informer + reconciler
//!
//! Shutdown (shutdown.rs, signals.rs):
//!     SIGTERM/SIGINT → sticky stop flag → informer and reconciler exit → process exits
//! ```
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - An in-flight reconcile finishes before the reconciler observes shutdown

pub mod shutdown;
pub mod signals;

pub use shutdown::{Shutdown, ShutdownListener};
