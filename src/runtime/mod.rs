//! Container runtime configuration backends.
//!
//! # Responsibilities
//! - Build a runtime's declarative mirror config from a snapshot
//! - Serialize/deserialize the runtime-native file format
//! - Compare two backend states independent of ordering
//! - Resolve a backend from its string key
//!
//! # Design Decisions
//! - One trait, one variant per runtime; the reconciler only sees the trait
//! - Mismatched variants compare as "not equal", never as an error
//! - Identity (directory, file name, service) is fixed at construction

pub mod crio;

use std::any::Any;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{AgentError, AgentResult};
use crate::snapshot::ConfigRecord;

pub use crio::{CrioConfig, RegistryMirror};

/// Capability set every runtime backend provides.
pub trait RuntimeConfig: Send + Sync + fmt::Debug {
    /// Which backend variant this is.
    fn kind(&self) -> RuntimeKind;

    /// Replace the mirror list with a 1:1 mapping of `records`.
    fn build_from_snapshot(&mut self, records: &[ConfigRecord]) -> AgentResult<()>;

    /// Render the mirror list in the runtime's native format.
    fn serialize(&self) -> AgentResult<String>;

    /// Populate state from file content read from `path`.
    fn deserialize(&mut self, path: &Path, content: &str) -> AgentResult<()>;

    /// Order-independent equality; false for a different variant.
    fn is_equal(&self, other: &dyn RuntimeConfig) -> bool;

    /// Clear the mirror list.
    fn reset(&mut self);

    fn mirror_count(&self) -> usize;

    /// A fresh, empty backend of the same variant and identity.
    fn empty_like(&self) -> Box<dyn RuntimeConfig>;

    fn config_dir(&self) -> &Path;

    fn config_file_name(&self) -> &str;

    fn service_name(&self) -> &str;

    fn as_any(&self) -> &dyn Any;

    /// Full path of the managed config file.
    fn config_file_path(&self) -> PathBuf {
        self.config_dir().join(self.config_file_name())
    }
}

/// Known backend variants, keyed by runtime name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeKind {
    Crio,
}

impl RuntimeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuntimeKind::Crio => "cri-o",
        }
    }
}

impl fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuntimeKind {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cri-o" => Ok(RuntimeKind::Crio),
            other => Err(AgentError::UnsupportedRuntime(other.to_string())),
        }
    }
}

/// Per-node overrides for the backend's file location.
#[derive(Debug, Clone, Default)]
pub struct RuntimeSettings {
    pub config_dir: Option<PathBuf>,
    pub config_file_name: Option<String>,
}

/// Resolve a backend key to a fresh, empty backend.
pub fn resolve(key: &str, settings: &RuntimeSettings) -> AgentResult<Box<dyn RuntimeConfig>> {
    let kind: RuntimeKind = key.parse()?;
    let backend: Box<dyn RuntimeConfig> = match kind {
        RuntimeKind::Crio => Box::new(CrioConfig::new(settings)),
    };

    tracing::debug!(
        runtime = %kind,
        path = %backend.config_file_path().display(),
        service = backend.service_name(),
        "Runtime backend resolved"
    );
    Ok(backend)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_crio() {
        let backend = resolve("cri-o", &RuntimeSettings::default()).unwrap();
        assert_eq!(backend.kind(), RuntimeKind::Crio);
        assert_eq!(backend.mirror_count(), 0);
    }

    #[test]
    fn test_resolve_unknown() {
        let err = resolve("containerd", &RuntimeSettings::default()).unwrap_err();
        assert!(matches!(err, AgentError::UnsupportedRuntime(ref key) if key == "containerd"));
    }

    #[test]
    fn test_only_canonical_key_resolves() {
        for key in ["crio", "CRI-O", " cri-o", ""] {
            let err = resolve(key, &RuntimeSettings::default()).unwrap_err();
            assert!(matches!(err, AgentError::UnsupportedRuntime(_)), "{key:?} resolved");
        }
    }

    #[test]
    fn test_settings_override_location() {
        let settings = RuntimeSettings {
            config_dir: Some(PathBuf::from("/tmp/crio.d")),
            config_file_name: Some("10-mirrors.conf".into()),
        };
        let backend = resolve("cri-o", &settings).unwrap();
        assert_eq!(backend.config_file_path(), PathBuf::from("/tmp/crio.d/10-mirrors.conf"));
    }

    /// Second variant used only to exercise cross-variant comparison.
    #[derive(Debug, Default)]
    struct NullConfig;

    impl RuntimeConfig for NullConfig {
        fn kind(&self) -> RuntimeKind {
            RuntimeKind::Crio
        }
        fn build_from_snapshot(&mut self, _: &[ConfigRecord]) -> AgentResult<()> {
            Ok(())
        }
        fn serialize(&self) -> AgentResult<String> {
            Ok(String::new())
        }
        fn deserialize(&mut self, _: &Path, _: &str) -> AgentResult<()> {
            Ok(())
        }
        fn is_equal(&self, other: &dyn RuntimeConfig) -> bool {
            other.as_any().is::<NullConfig>()
        }
        fn reset(&mut self) {}
        fn mirror_count(&self) -> usize {
            0
        }
        fn empty_like(&self) -> Box<dyn RuntimeConfig> {
            Box::new(NullConfig)
        }
        fn config_dir(&self) -> &Path {
            Path::new("/tmp")
        }
        fn config_file_name(&self) -> &str {
            "null.conf"
        }
        fn service_name(&self) -> &str {
            "null.service"
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn test_mismatched_variants_are_not_equal() {
        let crio = resolve("cri-o", &RuntimeSettings::default()).unwrap();
        let other = NullConfig;

        // Both empty, still different variants.
        assert!(!crio.is_equal(&other));
        assert!(!other.is_equal(crio.as_ref()));
        assert!(other.is_equal(&NullConfig));
    }
}
