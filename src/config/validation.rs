//! Settings validation.
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Pure function: Settings → Result<(), Vec<ValidationError>>
//! - Runtime key resolution is left to `runtime::resolve`

use thiserror::Error;

use super::settings::Settings;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("backoff base ({base_ms}ms) exceeds backoff max ({max_ms}ms)")]
    BackoffRange { base_ms: u64, max_ms: u64 },
}

pub fn validate_settings(settings: &Settings) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let required = [
        ("configmap name", &settings.configmap_name),
        ("configmap key", &settings.configmap_key),
        ("namespace", &settings.namespace),
    ];
    for (field, value) in required {
        if value.trim().is_empty() {
            errors.push(ValidationError::Empty(field));
        }
    }
    if settings.node_config_name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        errors.push(ValidationError::Empty("node config name"));
    }

    if settings.service_timeout_secs == 0 {
        errors.push(ValidationError::Zero("service restart timeout"));
    }
    if settings.watch_timeout_secs == 0 {
        errors.push(ValidationError::Zero("watch timeout"));
    }
    if settings.backoff_base_ms == 0 {
        errors.push(ValidationError::Zero("watch backoff base"));
    }
    if settings.backoff_base_ms > settings.backoff_max_ms {
        errors.push(ValidationError::BackoffRange {
            base_ms: settings.backoff_base_ms,
            max_ms: settings.backoff_max_ms,
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
