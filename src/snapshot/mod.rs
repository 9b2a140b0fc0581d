//! Registry mirror snapshots.
//!
//! # Data Flow
//! ```text
//! ConfigMap data[key] (YAML list)
//!     → Snapshot::parse (decode, reject duplicate originals)
//!     → diff.rs (order-independent equality)
//!     → runtime backend build
//! ```
//!
//! # Design Decisions
//! - Snapshots are ephemeral: built on every fetch, never persisted
//! - Ordering carries no meaning; equality sorts by `original`
//! - Duplicate `original` entries are rejected at decode time

pub mod diff;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

pub use diff::{equal, SortKey};

/// One mirror mapping: requests for `original` are redirected to `mirror`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConfigRecord {
    pub original: String,
    pub mirror: String,
    #[serde(default)]
    pub insecure: bool,
}

impl ConfigRecord {
    pub fn new(original: impl Into<String>, mirror: impl Into<String>, insecure: bool) -> Self {
        Self {
            original: original.into(),
            mirror: mirror.into(),
            insecure,
        }
    }
}

impl SortKey for ConfigRecord {
    fn sort_key(&self) -> &str {
        &self.original
    }
}

/// Errors raised while decoding a snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("malformed snapshot: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("duplicate registry '{0}' in snapshot")]
    DuplicateOriginal(String),
}

/// The remote source's mirror list at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    records: Vec<ConfigRecord>,
}

impl Snapshot {
    /// Build a snapshot, rejecting duplicate `original` entries.
    pub fn new(records: Vec<ConfigRecord>) -> Result<Self, SnapshotError> {
        let mut seen = HashSet::with_capacity(records.len());
        for record in &records {
            if !seen.insert(record.original.as_str()) {
                return Err(SnapshotError::DuplicateOriginal(record.original.clone()));
            }
        }
        Ok(Self { records })
    }

    /// Decode the YAML list stored in the source object.
    ///
    /// An empty or null document decodes to an empty snapshot.
    pub fn parse(text: &str) -> Result<Self, SnapshotError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let records: Option<Vec<ConfigRecord>> = serde_yaml::from_str(text)?;
        Self::new(records.unwrap_or_default())
    }

    pub fn records(&self) -> &[ConfigRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Order-independent comparison with another snapshot.
    pub fn same_as(&self, other: &Snapshot) -> bool {
        equal(&self.records, &other.records)
    }
}
