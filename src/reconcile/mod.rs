//! Reconciliation of declared mirrors onto the node.
//!
//! # Data Flow
//! ```text
//! LifecycleEvent (from watch::informer)
//!     Added    → fetch snapshot → on_add
//!     Modified → decode old, fetch current → unchanged? stop : on_add
//!     Deleted  → on_delete → node truncate
//!
//! on_add:
//!     resident.empty_like() → build_from_snapshot → is_equal(resident)?
//!     → different: node.apply(candidate)
//! ```
//!
//! # Design Decisions
//! - At most once: failed notifications are dropped, not requeued
//! - Recovery relies on later notifications or the informer's relist
//! - Sequential: a single task owns the handler and the node state

pub mod handler;

pub use handler::{ConfigMapHandler, ReconcileOutcome};
