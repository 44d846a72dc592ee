//! Provenance descriptors attached to written artifacts.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Provenance information attached to every report artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RunProvenance {
    /// Hash of the configuration used to produce the data.
    pub config_hash: String,
    /// Deterministic seed used by the seeded stages.
    pub seed: u64,
    /// ISO-8601 timestamp recording when the artifact was generated.
    pub created_at: String,
    /// Version map for all tools involved in the run.
    pub tool_versions: BTreeMap<String, String>,
}

impl RunProvenance {
    /// Provenance stamped with the calling crate's name and version.
    pub fn new(
        config_hash: impl Into<String>,
        seed: u64,
        created_at: impl Into<String>,
        tool: &str,
        version: &str,
    ) -> Self {
        let mut tool_versions = BTreeMap::new();
        tool_versions.insert(tool.to_string(), version.to_string());
        Self {
            config_hash: config_hash.into(),
            seed,
            created_at: created_at.into(),
            tool_versions,
        }
    }
}
