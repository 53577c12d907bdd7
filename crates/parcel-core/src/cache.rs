//! Resolution of provider bytes to stored blobs.
//!
//! Identifiable origins are cached: at most one blob exists per
//! `(origin, type)` and later deployments link to it instead of uploading
//! again. Mutable (snapshot) origins keep their blob id while the content is
//! refreshed in place.

use std::sync::Arc;

use tracing::{debug, info};

use crate::access::AccessPolicy;
use crate::conflict::ConflictDetector;
use crate::error::{DeployError, Result};
use crate::model::Package;
use crate::source::ArtifactProvider;
use crate::store::{Blob, BlobStore, NewBlob, PackageStore};
use crate::types::{BlobType, PackageId};

/// Caller consent for touching existing blobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkPolicy {
    /// Link to an existing blob with the same origin instead of failing.
    pub allow_reuse: bool,
    /// Overwrite a snapshot blob when the provider found newer content.
    pub allow_update_content: bool,
}

impl Default for LinkPolicy {
    fn default() -> Self {
        Self {
            allow_reuse: true,
            allow_update_content: true,
        }
    }
}

/// Outcome of [`ArtifactCacheManager::resolve_and_link_blob`].
#[derive(Debug, Clone)]
pub struct LinkedBlob {
    pub blob: Blob,
    /// The blob was created by this call.
    pub created: bool,
    /// An existing blob had its content rewritten by this call.
    pub refreshed: bool,
    /// Other packages linked to a refreshed blob.
    pub linked_packages: Vec<PackageId>,
}

#[derive(Clone)]
pub struct ArtifactCacheManager {
    blobs: Arc<dyn BlobStore>,
    packages: Arc<dyn PackageStore>,
    detector: ConflictDetector,
}

impl ArtifactCacheManager {
    pub fn new(blobs: Arc<dyn BlobStore>, packages: Arc<dyn PackageStore>) -> Self {
        let detector = ConflictDetector::new(Arc::clone(&packages));
        Self {
            blobs,
            packages,
            detector,
        }
    }

    /// Find or create the blob holding `provider`'s bytes and link it to
    /// `package` (the caller records the returned id on the package).
    ///
    /// Returns `None` when the provider has no bytes.
    pub fn resolve_and_link_blob(
        &self,
        provider: &ArtifactProvider,
        blob_type: BlobType,
        package: &Package,
        policy: LinkPolicy,
        access: &dyn AccessPolicy,
    ) -> Result<Option<LinkedBlob>> {
        let Some(bytes) = provider.bytes() else {
            return Ok(None);
        };

        let existing = if provider.can_lookup_resources() {
            provider.existing_blob()
        } else {
            None
        };

        let Some(existing) = existing else {
            let blob = self.blobs.create(
                NewBlob::new(blob_type, self.blob_name(provider, package), bytes.to_vec())
                    .with_file_name(provider.file_name())
                    .with_origin(provider.origin(), provider.origin_timestamp()),
            )?;
            info!(blob_id = %blob.id, package = %package.name, blob_type = %blob_type, "Created blob");
            return Ok(Some(LinkedBlob {
                blob,
                created: true,
                refreshed: false,
                linked_packages: Vec::new(),
            }));
        };

        if !policy.allow_reuse {
            return Err(DeployError::BlobReuseRejected {
                blob_name: existing.name.clone(),
                blob_id: existing.id.clone(),
            });
        }

        let needs_update = provider.restores_missing_content()
            || (provider.is_modifiable_resource()
                && provider.has_new_content()
                && policy.allow_update_content);
        if !needs_update {
            debug!(blob_id = %existing.id, package = %package.name, "Reusing existing blob");
            return Ok(Some(LinkedBlob {
                blob: existing.clone(),
                created: false,
                refreshed: false,
                linked_packages: Vec::new(),
            }));
        }

        access.check_blob_write(existing).map_err(|err| {
            DeployError::Access(format!(
                "The existing blob {} for file {} referenced by the provided package cannot be modified in the current context: {}",
                existing.id,
                provider.file_name().unwrap_or_default(),
                err
            ))
        })?;

        let linked_packages = self
            .detector
            .find_linked_packages(&existing.id, std::slice::from_ref(&package.id))?;
        for linked_id in &linked_packages {
            if let Some(linked) = self.packages.get(linked_id)? {
                access.check_package_write(&linked).map_err(|err| {
                    DeployError::Access(format!(
                        "You're not allowed to edit the linked package {}: {}",
                        linked.log_repr(),
                        err
                    ))
                })?;
            }
        }

        let blob = self
            .blobs
            .overwrite_content(&existing.id, bytes.to_vec(), provider.origin_timestamp())?;
        info!(
            blob_id = %blob.id,
            package = %package.name,
            linked = linked_packages.len(),
            "Existing blob content refreshed"
        );
        Ok(Some(LinkedBlob {
            blob,
            created: false,
            refreshed: true,
            linked_packages,
        }))
    }

    fn blob_name(&self, provider: &ArtifactProvider, package: &Package) -> String {
        provider
            .file_name()
            .unwrap_or_else(|| package.name.clone())
    }
}

impl std::fmt::Debug for ArtifactCacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactCacheManager").finish_non_exhaustive()
    }
}
