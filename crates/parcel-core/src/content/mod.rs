//! Package archives and the content model read out of them.

mod reader;

pub use reader::{ArchiveContentReader, DESCRIPTOR_JSON, DESCRIPTOR_TOML};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::model::{FileRef, PlanNode};

/// A package archive held in memory.
#[derive(Debug, Clone)]
pub struct PackageArchive {
    /// Original file name, when known.
    pub file_name: Option<String>,
    pub bytes: Vec<u8>,
}

impl PackageArchive {
    pub fn new(file_name: Option<String>, bytes: Vec<u8>) -> Self {
        Self { file_name, bytes }
    }
}

/// Everything a package declares, as read from its descriptor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackageContent {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub keywords: Vec<KeywordDefinition>,
    #[serde(default)]
    pub plans: Vec<PlanDefinition>,
    #[serde(default)]
    pub schedules: Vec<ScheduleDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordDefinition {
    pub name: String,
    #[serde(default = "default_keyword_kind")]
    pub kind: String,
    /// File inside the archive implementing the keyword.
    #[serde(default)]
    pub file: Option<FileRef>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

fn default_keyword_kind() -> String {
    "script".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanDefinition {
    pub name: String,
    pub root: PlanNode,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleDefinition {
    pub name: String,
    pub cron: String,
    #[serde(default)]
    pub cron_exclusions: Vec<String>,
    /// Name of the plan to run. Resolved at staging time.
    #[serde(default)]
    pub plan_name: Option<String>,
    #[serde(default)]
    pub assertion_plan_name: Option<String>,
    /// Defaults to active when omitted.
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub execution_parameters: BTreeMap<String, String>,
}

/// Turns a package archive into a [`PackageContent`].
pub trait ContentReader: Send + Sync {
    /// Read the package descriptor.
    ///
    /// Returns `Ok(None)` when the archive carries no descriptor, and an error
    /// when the archive or the descriptor is malformed.
    fn read(&self, archive: &PackageArchive) -> anyhow::Result<Option<PackageContent>>;

    /// Read a single file referenced from a keyword or plan definition.
    fn read_entry(&self, archive: &PackageArchive, path: &str) -> anyhow::Result<Vec<u8>>;
}
