//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Watch stream fails or closes early without events:
//!     → backoff.rs (exponential delay with jitter)
//!     → resubscribe
//! Service reload:
//!     → bounded wait (node::service), no retry
//! ```
//!
//! # Design Decisions
//! - Every external call has a deadline or a bounded retry delay
//! - Failure counter resets once a watch delivers an event

pub mod backoff;

pub use backoff::Backoff;
