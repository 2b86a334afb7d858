//! Candidate-relative delta between two model-keyed snapshots.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::extract::ModelKeyedConfig;

/// One model block the candidate adds or changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DeltaEntry {
    /// Opening line of the block, used verbatim as the model identity.
    pub model_key: String,
    /// Full fragment text of the block in the candidate snapshot.
    pub fragment: String,
}

/// Ordered list of added or changed model blocks.
///
/// Order follows the candidate's first-seen key order and a key appears
/// at most once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ConfigDelta {
    entries: Vec<DeltaEntry>,
}

impl ConfigDelta {
    pub fn entries(&self) -> &[DeltaEntry] {
        &self.entries
    }

    pub fn model_keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.model_key.as_str())
    }

    pub fn fragments(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.fragment.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Computes what `candidate` adds or changes relative to `base`.
///
/// Fragments are compared as exact text. Keys that only exist in `base`
/// are never reported.
pub fn diff(base: &ModelKeyedConfig, candidate: &ModelKeyedConfig) -> ConfigDelta {
    let entries = candidate
        .iter()
        .filter(|(key, fragment)| base.get(key) != Some(*fragment))
        .map(|(key, fragment)| DeltaEntry {
            model_key: key.to_string(),
            fragment: fragment.to_string(),
        })
        .collect();
    ConfigDelta { entries }
}
