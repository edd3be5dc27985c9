//! The rule test manifest.
//!
//! A manifest is a YAML list of rule tests:
//!
//! ```yaml
//! - name: count_lines
//!   target: results/counts.txt
//! - name: align
//!   target: mapped/a.bam
//!   data_path: align/data
//!   expected_path: align/expected
//!   deploy: [conda]
//! ```
//!
//! Relative paths resolve against the manifest's directory. Fixture paths
//! default to `<name>/data` and `<name>/expected` next to the manifest.

use crate::core::{DeployMode, RuleTestCase};
use anyhow::{bail, Context, Result};
use itertools::Itertools;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

const DATA_DIR: &str = "data";
const EXPECTED_DIR: &str = "expected";

/// A parsed manifest, not yet turned into test cases.
#[derive(Debug, Clone)]
pub struct Manifest {
    base_dir: PathBuf,
    entries: Vec<ManifestEntry>,
}

/// A single rule test as written in the manifest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ManifestEntry {
    pub name: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_path: Option<PathBuf>,
    /// Overrides the globally configured deployment modes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deploy: Option<Vec<DeployMode>>,
}

impl Manifest {
    /// Reads and parses a manifest file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Self::parse(&content, base_dir)
            .with_context(|| format!("Invalid manifest: {}", path.display()))
    }

    /// Parses manifest content; relative paths resolve against `base_dir`.
    pub fn parse(content: &str, base_dir: impl Into<PathBuf>) -> Result<Self> {
        let entries: Vec<ManifestEntry> =
            serde_yml::from_str(content).context("Failed to parse YAML")?;

        let mut names = HashSet::new();
        for entry in &entries {
            if entry.name.trim().is_empty() {
                bail!("rule test with target '{}' has an empty name", entry.target);
            }
            if entry.target.trim().is_empty() {
                bail!("rule test '{}' has an empty target", entry.name);
            }
            if !names.insert(entry.name.as_str()) {
                bail!("duplicate rule test '{}'", entry.name);
            }
        }

        Ok(Self {
            base_dir: base_dir.into(),
            entries,
        })
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    /// Builds the test cases. Entries without `deploy` get `default_deploy`.
    pub fn cases(&self, default_deploy: &BTreeSet<DeployMode>) -> Vec<RuleTestCase> {
        self.entries
            .iter()
            .map(|entry| {
                let rule_dir = self.base_dir.join(&entry.name);
                let data_path = entry
                    .data_path
                    .as_ref()
                    .map(|p| self.base_dir.join(p))
                    .unwrap_or_else(|| rule_dir.join(DATA_DIR));
                let expected_path = entry
                    .expected_path
                    .as_ref()
                    .map(|p| self.base_dir.join(p))
                    .unwrap_or_else(|| rule_dir.join(EXPECTED_DIR));
                let modes = match &entry.deploy {
                    Some(modes) => modes.iter().copied().collect(),
                    None => default_deploy.clone(),
                };
                RuleTestCase::new(&entry.name, &entry.target, data_path, expected_path)
                    .with_deploy_modes(modes)
            })
            .collect()
    }
}

/// Keeps only the cases named in `names`, in manifest order. An empty filter
/// keeps everything; a name without a case is an error.
pub fn select(cases: Vec<RuleTestCase>, names: &[String]) -> Result<Vec<RuleTestCase>> {
    if names.is_empty() {
        return Ok(cases);
    }

    let known: HashSet<&str> = cases.iter().map(|c| c.name.as_str()).collect();
    let unknown: Vec<&String> = names
        .iter()
        .filter(|n| !known.contains(n.as_str()))
        .collect();
    if !unknown.is_empty() {
        bail!("unknown rule test(s): {}", unknown.iter().join(", "));
    }

    let wanted: HashSet<&str> = names.iter().map(String::as_str).collect();
    let selected: Vec<RuleTestCase> = cases
        .into_iter()
        .filter(|c| wanted.contains(c.name.as_str()))
        .collect();
    debug!("Selected {} rule test(s)", selected.len());
    Ok(selected)
}
