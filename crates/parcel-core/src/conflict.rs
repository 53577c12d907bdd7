//! Detection of packages sharing the same blob or mutable origin.

use std::sync::Arc;

use crate::error::Result;
use crate::source::ArtifactProvider;
use crate::store::PackageStore;
use crate::types::{BlobId, PackageId};

/// Packages already using the origins of a deployment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConflictingPackages {
    /// Packages linked to the blob behind the package archive origin.
    pub same_origin: Vec<PackageId>,
    /// Packages linked to the blob behind the library origin.
    pub same_library: Vec<PackageId>,
}

impl ConflictingPackages {
    pub fn is_empty(&self) -> bool {
        self.same_origin.is_empty() && self.same_library.is_empty()
    }

    /// All conflicting ids, deduplicated, in first-seen order.
    pub fn all(&self) -> Vec<PackageId> {
        let mut all: Vec<PackageId> = Vec::new();
        for id in self.same_origin.iter().chain(&self.same_library) {
            if !all.contains(id) {
                all.push(id.clone());
            }
        }
        all
    }
}

#[derive(Clone)]
pub struct ConflictDetector {
    packages: Arc<dyn PackageStore>,
}

impl ConflictDetector {
    pub fn new(packages: Arc<dyn PackageStore>) -> Self {
        Self { packages }
    }

    /// Ids of packages whose archive or library is `blob`, minus `exclude`.
    pub fn find_linked_packages(&self, blob: &BlobId, exclude: &[PackageId]) -> Result<Vec<PackageId>> {
        let mut ids: Vec<PackageId> = self
            .packages
            .find_by_blob(blob)?
            .into_iter()
            .map(|package| package.id)
            .filter(|id| !exclude.contains(id))
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    /// Packages already linked to the mutable, identifiable origins of
    /// `archive` and `library`. Immutable or anonymous origins never conflict.
    pub fn find_conflicts(
        &self,
        archive: &ArtifactProvider,
        library: &ArtifactProvider,
        exclude: &[PackageId],
    ) -> Result<ConflictingPackages> {
        Ok(ConflictingPackages {
            same_origin: self.linked_to_mutable_origin(archive, exclude)?,
            same_library: self.linked_to_mutable_origin(library, exclude)?,
        })
    }

    fn linked_to_mutable_origin(
        &self,
        provider: &ArtifactProvider,
        exclude: &[PackageId],
    ) -> Result<Vec<PackageId>> {
        if !(provider.can_lookup_resources() && provider.is_modifiable_resource()) {
            return Ok(Vec::new());
        }
        match provider.existing_blob() {
            Some(blob) => self.find_linked_packages(&blob.id, exclude),
            None => Ok(Vec::new()),
        }
    }
}

impl std::fmt::Debug for ConflictDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConflictDetector").finish_non_exhaustive()
    }
}
