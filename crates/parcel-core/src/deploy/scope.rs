//! Cleanup scope for blobs created during a deployment attempt.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::store::BlobStore;
use crate::types::BlobId;

/// Owns the live-store blobs created while a deployment is in flight.
///
/// Dropping the scope deletes them. A successful commit calls
/// [`DeploymentScope::detach`] so they stay.
pub struct DeploymentScope {
    blobs: Arc<dyn BlobStore>,
    created: Vec<BlobId>,
    detached: bool,
}

impl DeploymentScope {
    pub fn new(blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            blobs,
            created: Vec::new(),
            detached: false,
        }
    }

    pub fn track(&mut self, id: BlobId) {
        if !self.created.contains(&id) {
            self.created.push(id);
        }
    }

    pub fn contains(&self, id: &BlobId) -> bool {
        self.created.contains(id)
    }

    pub fn created(&self) -> &[BlobId] {
        &self.created
    }

    /// Keep every tracked blob.
    pub fn detach(mut self) {
        self.detached = true;
    }
}

impl Drop for DeploymentScope {
    fn drop(&mut self) {
        if self.detached {
            return;
        }
        for id in self.created.drain(..) {
            match self.blobs.delete(&id) {
                Ok(_) => debug!(blob_id = %id, "Removed blob of failed deployment"),
                Err(err) => warn!(blob_id = %id, error = %err, "Failed to remove blob of failed deployment"),
            }
        }
    }
}

impl std::fmt::Debug for DeploymentScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeploymentScope")
            .field("created", &self.created)
            .field("detached", &self.detached)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::NewBlob;
    use crate::store::memory::MemoryBlobStore;
    use crate::types::BlobType;

    fn blob(store: &MemoryBlobStore) -> BlobId {
        store
            .create(NewBlob::new(BlobType::PackageArchive, "a", b"x".to_vec()))
            .unwrap()
            .id
    }

    #[test]
    fn dropped_scope_deletes_tracked_blobs_only() {
        let store = Arc::new(MemoryBlobStore::default());
        let untracked = blob(&store);
        {
            let mut scope = DeploymentScope::new(store.clone());
            scope.track(blob(&store));
            scope.track(blob(&store));
        }
        assert_eq!(store.list().unwrap().len(), 1);
        assert!(store.get(&untracked).unwrap().is_some());
    }

    #[test]
    fn detached_scope_keeps_blobs() {
        let store = Arc::new(MemoryBlobStore::default());
        let mut scope = DeploymentScope::new(store.clone());
        scope.track(blob(&store));
        scope.detach();
        assert_eq!(store.len(), 1);
    }
}
