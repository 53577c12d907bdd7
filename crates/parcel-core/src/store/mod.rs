//! Storage contracts for packages, owned entities and blobs.
//!
//! The engine only talks to these traits. [`memory`] holds the reference
//! in-process implementation; [`fs`] keeps blobs in a directory and backs the
//! per-deployment staging area.

pub mod fs;
pub mod memory;

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::model::{Keyword, OwnedEntity, Package, Plan, Schedule};
use crate::types::{BlobId, BlobType, EntityId, PackageId};

/// Metadata of a stored blob. Content is fetched separately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blob {
    pub id: BlobId,
    pub blob_type: BlobType,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    /// Canonical origin string. Uploads have none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    /// Remote timestamp (millis) of the content currently stored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_timestamp: Option<i64>,
    /// Package that owns this blob exclusively, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<PackageId>,
    /// blake3 hex digest of the content.
    pub content_hash: String,
    pub size: u64,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// A blob about to be created.
#[derive(Debug, Clone)]
pub struct NewBlob {
    pub blob_type: BlobType,
    pub name: String,
    pub file_name: Option<String>,
    pub origin: Option<String>,
    pub origin_timestamp: Option<i64>,
    pub owner: Option<PackageId>,
    pub content: Vec<u8>,
}

impl NewBlob {
    pub fn new(blob_type: BlobType, name: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            blob_type,
            name: name.into(),
            file_name: None,
            origin: None,
            origin_timestamp: None,
            owner: None,
            content,
        }
    }

    pub fn with_file_name(mut self, file_name: Option<String>) -> Self {
        self.file_name = file_name;
        self
    }

    pub fn with_origin(mut self, origin: Option<String>, timestamp: Option<i64>) -> Self {
        self.origin = origin;
        self.origin_timestamp = timestamp;
        self
    }

    pub fn with_owner(mut self, owner: PackageId) -> Self {
        self.owner = Some(owner);
        self
    }

    /// Materialize the metadata record for this blob under `id`.
    pub fn into_blob(self, id: BlobId) -> (Blob, Vec<u8>) {
        let now = chrono::Utc::now();
        let blob = Blob {
            id,
            blob_type: self.blob_type,
            name: self.name,
            file_name: self.file_name,
            origin: self.origin,
            origin_timestamp: self.origin_timestamp,
            owner: self.owner,
            content_hash: content_hash(&self.content),
            size: self.content.len() as u64,
            created_at: now,
            updated_at: now,
        };
        (blob, self.content)
    }
}

/// blake3 hex digest used as [`Blob::content_hash`].
pub fn content_hash(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

/// Content-addressable binary store.
pub trait BlobStore: Send + Sync {
    fn get(&self, id: &BlobId) -> anyhow::Result<Option<Blob>>;

    /// Content bytes, or `None` when the blob or its content is missing.
    fn content(&self, id: &BlobId) -> anyhow::Result<Option<Vec<u8>>>;

    fn find_by_origin(&self, origin: &str, blob_type: BlobType) -> anyhow::Result<Option<Blob>>;

    fn find_by_owner(&self, owner: &PackageId) -> anyhow::Result<Vec<Blob>>;

    fn list(&self) -> anyhow::Result<Vec<Blob>>;

    fn create(&self, blob: NewBlob) -> anyhow::Result<Blob>;

    /// Store a copy of `blob` preserving its id and metadata.
    fn import(&self, blob: &Blob, content: Vec<u8>) -> anyhow::Result<()>;

    /// Replace the content of an existing blob in place.
    fn overwrite_content(
        &self,
        id: &BlobId,
        content: Vec<u8>,
        origin_timestamp: Option<i64>,
    ) -> anyhow::Result<Blob>;

    /// Returns whether a blob was removed.
    fn delete(&self, id: &BlobId) -> anyhow::Result<bool>;
}

/// Store for one kind of package-owned entity.
pub trait EntityStore<E: OwnedEntity>: Send + Sync {
    fn get(&self, id: &EntityId) -> anyhow::Result<Option<E>>;
    fn find_by_owner(&self, owner: &PackageId) -> anyhow::Result<Vec<E>>;
    fn find_by_name(&self, name: &str) -> anyhow::Result<Vec<E>>;
    fn save(&self, entity: E) -> anyhow::Result<()>;
    fn delete(&self, id: &EntityId) -> anyhow::Result<bool>;
}

pub trait PackageStore: Send + Sync {
    fn get(&self, id: &PackageId) -> anyhow::Result<Option<Package>>;
    fn find_by_name(&self, name: &str) -> anyhow::Result<Option<Package>>;
    fn list(&self) -> anyhow::Result<Vec<Package>>;
    fn save(&self, package: Package) -> anyhow::Result<()>;
    fn delete(&self, id: &PackageId) -> anyhow::Result<bool>;
    /// Packages whose archive or library reference equals `blob`.
    fn find_by_blob(&self, blob: &BlobId) -> anyhow::Result<Vec<Package>>;
}

/// The live stores the engine reads from and commits into.
#[derive(Clone)]
pub struct Stores {
    pub packages: Arc<dyn PackageStore>,
    pub keywords: Arc<dyn EntityStore<Keyword>>,
    pub plans: Arc<dyn EntityStore<Plan>>,
    pub schedules: Arc<dyn EntityStore<Schedule>>,
    pub blobs: Arc<dyn BlobStore>,
}

impl Stores {
    /// Fresh in-memory stores.
    pub fn in_memory() -> Self {
        Self {
            packages: Arc::new(memory::MemoryPackageStore::default()),
            keywords: Arc::new(memory::MemoryEntityStore::<Keyword>::default()),
            plans: Arc::new(memory::MemoryEntityStore::<Plan>::default()),
            schedules: Arc::new(memory::MemoryEntityStore::<Schedule>::default()),
            blobs: Arc::new(memory::MemoryBlobStore::default()),
        }
    }

    pub fn with_blobs(mut self, blobs: Arc<dyn BlobStore>) -> Self {
        self.blobs = blobs;
        self
    }
}

impl std::fmt::Debug for Stores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stores").finish_non_exhaustive()
    }
}
