//! In-process stores backed by `parking_lot` locks.

use parking_lot::RwLock;
use std::collections::BTreeMap;

use super::{Blob, BlobStore, EntityStore, NewBlob, PackageStore, content_hash};
use crate::model::{OwnedEntity, Package};
use crate::types::{BlobId, BlobType, EntityId, PackageId};

struct StoredBlob {
    blob: Blob,
    content: Option<Vec<u8>>,
}

#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<BTreeMap<BlobId, StoredBlob>>,
}

impl MemoryBlobStore {
    /// Drop the content of a blob while keeping its metadata, as happens when
    /// the backing storage loses a file.
    pub fn discard_content(&self, id: &BlobId) -> bool {
        match self.blobs.write().get_mut(id) {
            Some(stored) => {
                stored.content = None;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }
}

impl BlobStore for MemoryBlobStore {
    fn get(&self, id: &BlobId) -> anyhow::Result<Option<Blob>> {
        Ok(self.blobs.read().get(id).map(|stored| stored.blob.clone()))
    }

    fn content(&self, id: &BlobId) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self
            .blobs
            .read()
            .get(id)
            .and_then(|stored| stored.content.clone()))
    }

    fn find_by_origin(&self, origin: &str, blob_type: BlobType) -> anyhow::Result<Option<Blob>> {
        Ok(self
            .blobs
            .read()
            .values()
            .find(|stored| {
                stored.blob.blob_type == blob_type && stored.blob.origin.as_deref() == Some(origin)
            })
            .map(|stored| stored.blob.clone()))
    }

    fn find_by_owner(&self, owner: &PackageId) -> anyhow::Result<Vec<Blob>> {
        Ok(self
            .blobs
            .read()
            .values()
            .filter(|stored| stored.blob.owner.as_ref() == Some(owner))
            .map(|stored| stored.blob.clone())
            .collect())
    }

    fn list(&self) -> anyhow::Result<Vec<Blob>> {
        Ok(self
            .blobs
            .read()
            .values()
            .map(|stored| stored.blob.clone())
            .collect())
    }

    fn create(&self, blob: NewBlob) -> anyhow::Result<Blob> {
        let (blob, content) = blob.into_blob(BlobId::new());
        self.blobs.write().insert(
            blob.id.clone(),
            StoredBlob {
                blob: blob.clone(),
                content: Some(content),
            },
        );
        Ok(blob)
    }

    fn import(&self, blob: &Blob, content: Vec<u8>) -> anyhow::Result<()> {
        self.blobs.write().insert(
            blob.id.clone(),
            StoredBlob {
                blob: blob.clone(),
                content: Some(content),
            },
        );
        Ok(())
    }

    fn overwrite_content(
        &self,
        id: &BlobId,
        content: Vec<u8>,
        origin_timestamp: Option<i64>,
    ) -> anyhow::Result<Blob> {
        let mut blobs = self.blobs.write();
        let stored = blobs
            .get_mut(id)
            .ok_or_else(|| anyhow::anyhow!("Blob {} not found", id))?;
        stored.blob.content_hash = content_hash(&content);
        stored.blob.size = content.len() as u64;
        stored.blob.origin_timestamp = origin_timestamp;
        stored.blob.updated_at = chrono::Utc::now();
        stored.content = Some(content);
        Ok(stored.blob.clone())
    }

    fn delete(&self, id: &BlobId) -> anyhow::Result<bool> {
        Ok(self.blobs.write().remove(id).is_some())
    }
}

pub struct MemoryEntityStore<E> {
    entities: RwLock<BTreeMap<EntityId, E>>,
}

impl<E> Default for MemoryEntityStore<E> {
    fn default() -> Self {
        Self {
            entities: RwLock::new(BTreeMap::new()),
        }
    }
}

impl<E: OwnedEntity> MemoryEntityStore<E> {
    pub fn all(&self) -> Vec<E> {
        self.entities.read().values().cloned().collect()
    }
}

impl<E: OwnedEntity> EntityStore<E> for MemoryEntityStore<E> {
    fn get(&self, id: &EntityId) -> anyhow::Result<Option<E>> {
        Ok(self.entities.read().get(id).cloned())
    }

    fn find_by_owner(&self, owner: &PackageId) -> anyhow::Result<Vec<E>> {
        Ok(self
            .entities
            .read()
            .values()
            .filter(|entity| entity.owner() == Some(owner))
            .cloned()
            .collect())
    }

    fn find_by_name(&self, name: &str) -> anyhow::Result<Vec<E>> {
        Ok(self
            .entities
            .read()
            .values()
            .filter(|entity| entity.name() == name)
            .cloned()
            .collect())
    }

    fn save(&self, entity: E) -> anyhow::Result<()> {
        self.entities.write().insert(entity.id().clone(), entity);
        Ok(())
    }

    fn delete(&self, id: &EntityId) -> anyhow::Result<bool> {
        Ok(self.entities.write().remove(id).is_some())
    }
}

#[derive(Default)]
pub struct MemoryPackageStore {
    packages: RwLock<BTreeMap<PackageId, Package>>,
}

impl PackageStore for MemoryPackageStore {
    fn get(&self, id: &PackageId) -> anyhow::Result<Option<Package>> {
        Ok(self.packages.read().get(id).cloned())
    }

    fn find_by_name(&self, name: &str) -> anyhow::Result<Option<Package>> {
        Ok(self
            .packages
            .read()
            .values()
            .find(|package| package.name == name)
            .cloned())
    }

    fn list(&self) -> anyhow::Result<Vec<Package>> {
        Ok(self.packages.read().values().cloned().collect())
    }

    fn save(&self, package: Package) -> anyhow::Result<()> {
        self.packages.write().insert(package.id.clone(), package);
        Ok(())
    }

    fn delete(&self, id: &PackageId) -> anyhow::Result<bool> {
        Ok(self.packages.write().remove(id).is_some())
    }

    fn find_by_blob(&self, blob: &BlobId) -> anyhow::Result<Vec<Package>> {
        Ok(self
            .packages
            .read()
            .values()
            .filter(|package| package.links_blob(blob))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Keyword;

    #[test]
    fn origin_lookup_is_scoped_by_type() {
        let store = MemoryBlobStore::default();
        let created = store
            .create(
                NewBlob::new(BlobType::PackageLibrary, "lib", b"x".to_vec())
                    .with_origin(Some("mvn:g:a:1".to_string()), Some(5)),
            )
            .unwrap();

        let found = store
            .find_by_origin("mvn:g:a:1", BlobType::PackageLibrary)
            .unwrap();
        assert_eq!(found.map(|b| b.id), Some(created.id));
        assert!(store
            .find_by_origin("mvn:g:a:1", BlobType::PackageArchive)
            .unwrap()
            .is_none());
    }

    #[test]
    fn overwrite_updates_hash_and_timestamp() {
        let store = MemoryBlobStore::default();
        let blob = store
            .create(NewBlob::new(BlobType::PackageArchive, "a", b"v1".to_vec()))
            .unwrap();

        let updated = store
            .overwrite_content(&blob.id, b"v2".to_vec(), Some(99))
            .unwrap();

        assert_eq!(updated.id, blob.id);
        assert_ne!(updated.content_hash, blob.content_hash);
        assert_eq!(updated.origin_timestamp, Some(99));
        assert_eq!(store.content(&blob.id).unwrap().unwrap(), b"v2");
    }

    #[test]
    fn discarded_content_reads_as_missing() {
        let store = MemoryBlobStore::default();
        let blob = store
            .create(NewBlob::new(BlobType::PackageArchive, "a", b"v1".to_vec()))
            .unwrap();
        assert!(store.discard_content(&blob.id));
        assert!(store.get(&blob.id).unwrap().is_some());
        assert!(store.content(&blob.id).unwrap().is_none());
    }

    #[test]
    fn entity_store_filters_by_owner_and_name() {
        let store = MemoryEntityStore::<Keyword>::default();
        let owner = PackageId::from("p");
        let mut owned = Keyword::new("K1", "script");
        owned.owner = Some(owner.clone());
        store.save(owned.clone()).unwrap();
        store.save(Keyword::new("K1", "script")).unwrap();

        assert_eq!(store.find_by_owner(&owner).unwrap(), vec![owned.clone()]);
        assert_eq!(store.find_by_name("K1").unwrap().len(), 2);
        assert!(store.delete(&owned.id).unwrap());
        assert!(!store.delete(&owned.id).unwrap());
    }
}
