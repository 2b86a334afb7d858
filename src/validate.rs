//! Equivalence check between the CLI and NETCONF show-config snapshots.

use indexmap::IndexSet;
use once_cell::sync::Lazy;
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::delta::ConfigDelta;

/// Index of the banner/timestamp line dropped before comparison.
pub const VOLATILE_LINE_INDEX: usize = 2;

/// Namespaces that always differ spuriously between the two runs.
pub const DEFAULT_NOISE_NAMESPACES: &[&str] = &[
    "http://cisco.com/ns/yang/Cisco-IOS-XR-aaa-lib-cfg",
    "http://tail-f.com/ns/aaa/1.1",
];

static XMLNS: Lazy<Regex> = Lazy::new(|| match Regex::new(r#"xmlns="([^"]+)""#) {
    Ok(re) => re,
    Err(err) => panic!("invalid XMLNS regex: {err}"),
});

/// PASS/FAIL outcome used by every stage and by the validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum StageStatus {
    Pass,
    Fail,
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageStatus::Pass => f.write_str("PASS"),
            StageStatus::Fail => f.write_str("FAIL"),
        }
    }
}

/// Raw multi-line show-config text captured after a mutation stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseSnapshot {
    text: String,
}

impl ResponseSnapshot {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Snapshot lines without the volatile line at `volatile_index`.
    ///
    /// Snapshots too short to have that line are returned whole.
    pub fn stable_lines(&self, volatile_index: usize) -> Vec<&str> {
        self.text
            .lines()
            .enumerate()
            .filter(|(idx, _)| *idx != volatile_index)
            .map(|(_, line)| line)
            .collect()
    }

    /// SHA-256 of the stable lines, hex encoded.
    pub fn fingerprint(&self, volatile_index: usize) -> String {
        let mut hasher = Sha256::new();
        for line in self.stable_lines(volatile_index) {
            hasher.update(line.as_bytes());
            hasher.update(b"\n");
        }
        hasher
            .finalize()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }
}

/// Which snapshot a mismatched line was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MismatchSide {
    OnlyInCli,
    OnlyInNetconf,
}

/// A line present in exactly one of the two snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct Mismatch {
    pub side: MismatchSide,
    pub line: String,
}

/// Result of one equivalence check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct EquivalenceReport {
    pub status: StageStatus,
    pub mismatches: Vec<Mismatch>,
    /// YANG namespaces exercised by the configuration change.
    pub yang_models: Vec<String>,
}

/// Equivalence validator with its volatile-line and noise-namespace policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validator {
    volatile_line: usize,
    noise_namespaces: Vec<String>,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(
            VOLATILE_LINE_INDEX,
            DEFAULT_NOISE_NAMESPACES.iter().map(|s| s.to_string()).collect(),
        )
    }
}

impl Validator {
    pub fn new(volatile_line: usize, noise_namespaces: Vec<String>) -> Self {
        Self {
            volatile_line,
            noise_namespaces,
        }
    }

    pub fn volatile_line(&self) -> usize {
        self.volatile_line
    }

    /// Compares the CLI and NETCONF snapshots and lists the models in `delta`.
    pub fn validate(
        &self,
        cli: &ResponseSnapshot,
        netconf: &ResponseSnapshot,
        delta: &ConfigDelta,
    ) -> EquivalenceReport {
        let mismatches = symmetric_difference(
            &cli.stable_lines(self.volatile_line),
            &netconf.stable_lines(self.volatile_line),
        );
        let status = if mismatches.is_empty() {
            StageStatus::Pass
        } else {
            StageStatus::Fail
        };
        EquivalenceReport {
            status,
            mismatches,
            yang_models: self.exercised_models(delta.model_keys()),
        }
    }

    /// Namespaces of the given model keys, minus the noise namespaces.
    pub fn exercised_models<'a>(&self, keys: impl Iterator<Item = &'a str>) -> Vec<String> {
        let mut models = IndexSet::new();
        for key in keys {
            let namespace = model_namespace(key);
            if self.noise_namespaces.iter().any(|n| n == namespace) {
                continue;
            }
            models.insert(namespace.to_string());
        }
        models.into_iter().collect()
    }
}

/// Namespace declared by a model key line, or the trimmed key if it has none.
pub fn model_namespace(key: &str) -> &str {
    XMLNS
        .captures(key)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or_else(|| key.trim())
}

/// Lines of `cli` missing from `netconf`, then lines of `netconf` missing from `cli`.
///
/// Both sides are treated as insertion-ordered sets, so duplicates and
/// line order inside a side do not matter.
pub fn symmetric_difference(cli: &[&str], netconf: &[&str]) -> Vec<Mismatch> {
    let cli_set: IndexSet<&str> = cli.iter().copied().collect();
    let netconf_set: IndexSet<&str> = netconf.iter().copied().collect();

    let only_cli = cli_set.difference(&netconf_set).map(|line| Mismatch {
        side: MismatchSide::OnlyInCli,
        line: line.to_string(),
    });
    let only_netconf = netconf_set.difference(&cli_set).map(|line| Mismatch {
        side: MismatchSide::OnlyInNetconf,
        line: line.to_string(),
    });
    only_cli.chain(only_netconf).collect()
}
