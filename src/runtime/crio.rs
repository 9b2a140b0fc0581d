//! CRI-O backend.
//!
//! Writes a `containers-registries.conf` style drop-in:
//! ```text
//! [[registry]]
//! prefix = "docker.io"
//! location = "mirror.local"
//! insecure = false
//! ```

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::path::{Path, PathBuf};

use super::{RuntimeConfig, RuntimeKind, RuntimeSettings};
use crate::error::{AgentError, AgentResult};
use crate::snapshot::{self, ConfigRecord, SortKey};

const SERVICE_NAME: &str = "crio.service";
const DEFAULT_CONFIG_DIR: &str = "/etc/crio/crio.conf.d";
const DEFAULT_CONFIG_FILE_NAME: &str = "99-registries.conf";

/// One `[[registry]]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryMirror {
    pub prefix: String,
    pub location: String,
    #[serde(default)]
    pub insecure: bool,
}

impl From<&ConfigRecord> for RegistryMirror {
    fn from(record: &ConfigRecord) -> Self {
        Self {
            prefix: record.original.clone(),
            location: record.mirror.clone(),
            insecure: record.insecure,
        }
    }
}

impl SortKey for RegistryMirror {
    fn sort_key(&self) -> &str {
        &self.prefix
    }
}

/// On-disk document shape. Only the mirror list is owned by the agent.
#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistriesDocument {
    #[serde(default, rename = "registry", skip_serializing_if = "Vec::is_empty")]
    registries: Vec<RegistryMirror>,
}

/// CRI-O registry mirror configuration.
#[derive(Debug, Clone)]
pub struct CrioConfig {
    mirrors: Vec<RegistryMirror>,
    config_dir: PathBuf,
    config_file_name: String,
}

impl CrioConfig {
    pub fn new(settings: &RuntimeSettings) -> Self {
        Self {
            mirrors: Vec::new(),
            config_dir: settings
                .config_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_DIR)),
            config_file_name: settings
                .config_file_name
                .clone()
                .unwrap_or_else(|| DEFAULT_CONFIG_FILE_NAME.to_string()),
        }
    }

    pub fn mirrors(&self) -> &[RegistryMirror] {
        &self.mirrors
    }
}

impl RuntimeConfig for CrioConfig {
    fn kind(&self) -> RuntimeKind {
        RuntimeKind::Crio
    }

    fn build_from_snapshot(&mut self, records: &[ConfigRecord]) -> AgentResult<()> {
        self.mirrors = records.iter().map(RegistryMirror::from).collect();
        Ok(())
    }

    fn serialize(&self) -> AgentResult<String> {
        let document = RegistriesDocument {
            registries: self.mirrors.clone(),
        };
        Ok(toml::to_string(&document)?)
    }

    fn deserialize(&mut self, path: &Path, content: &str) -> AgentResult<()> {
        let document: RegistriesDocument =
            toml::from_str(content).map_err(|source| AgentError::RuntimeConfigParse {
                path: path.to_path_buf(),
                source,
            })?;
        self.mirrors = document.registries;
        Ok(())
    }

    fn is_equal(&self, other: &dyn RuntimeConfig) -> bool {
        match other.as_any().downcast_ref::<CrioConfig>() {
            Some(other) => snapshot::equal(&self.mirrors, &other.mirrors),
            None => {
                tracing::warn!(
                    resident = %self.kind(),
                    candidate = %other.kind(),
                    "Cannot compare runtime configs of different variants"
                );
                false
            }
        }
    }

    fn reset(&mut self) {
        self.mirrors.clear();
    }

    fn mirror_count(&self) -> usize {
        self.mirrors.len()
    }

    fn empty_like(&self) -> Box<dyn RuntimeConfig> {
        Box::new(Self {
            mirrors: Vec::new(),
            config_dir: self.config_dir.clone(),
            config_file_name: self.config_file_name.clone(),
        })
    }

    fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    fn config_file_name(&self) -> &str {
        &self.config_file_name
    }

    fn service_name(&self) -> &str {
        SERVICE_NAME
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
