//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! flags / environment variables
//!     → settings.rs (clap parse, defaults)
//!     → validation.rs (semantic checks)
//!     → Settings (immutable for the process lifetime)
//! ```
//!
//! # Design Decisions
//! - Environment variable names are kept stable for DaemonSet manifests
//! - Backend file locations default per runtime; flags only override

pub mod settings;
pub mod validation;

pub use settings::Settings;
pub use validation::{validate_settings, ValidationError};
