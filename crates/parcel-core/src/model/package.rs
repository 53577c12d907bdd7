//! The deployed package record.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::{BlobId, PackageId, PackageStatus};

/// A deployed package.
///
/// The id is preserved across updates; everything else is replaced by the
/// committed version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Package {
    pub id: PackageId,
    pub name: String,
    /// Version declared by the package descriptor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Version label given at deploy time; part of the name when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activation_expression: Option<String>,
    /// Original file name of the archive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_blob: Option<BlobId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub library_blob: Option<BlobId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<PackageStatus>,
    #[serde(default)]
    pub plan_attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub keyword_attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub token_selection: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl Package {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: PackageId::new(),
            name: name.into(),
            version: None,
            version_name: None,
            activation_expression: None,
            file_name: None,
            archive_blob: None,
            library_blob: None,
            status: None,
            plan_attributes: BTreeMap::new(),
            keyword_attributes: BTreeMap::new(),
            token_selection: BTreeMap::new(),
            updated_by: None,
            updated_at: chrono::Utc::now(),
        }
    }

    /// Whether this package references `blob` as archive or library.
    pub fn links_blob(&self, blob: &BlobId) -> bool {
        self.archive_blob.as_ref() == Some(blob) || self.library_blob.as_ref() == Some(blob)
    }

    /// Archive and library blobs referenced by this package.
    pub fn linked_blobs(&self) -> Vec<BlobId> {
        self.archive_blob
            .iter()
            .chain(self.library_blob.iter())
            .cloned()
            .collect()
    }

    pub fn is_live(&self) -> bool {
        self.status.is_none()
    }

    /// Short `'name'(id)` form used in logs and error messages.
    pub fn log_repr(&self) -> String {
        format!("'{}'({})", self.name, self.id)
    }
}
