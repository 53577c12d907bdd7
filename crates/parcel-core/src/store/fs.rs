//! Directory-backed blob store.
//!
//! Layout: `<root>/<blob id>/meta.json` next to `<root>/<blob id>/content`.

use std::path::{Path, PathBuf};

use anyhow::Context;

use super::{Blob, BlobStore, NewBlob, content_hash};
use crate::types::{BlobId, BlobType, PackageId};

const META_FILE: &str = "meta.json";
const CONTENT_FILE: &str = "content";

#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Open (and create if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create blob directory: {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_dir(&self, id: &BlobId) -> PathBuf {
        self.root.join(id.as_str())
    }

    fn read_meta(&self, dir: &Path) -> anyhow::Result<Option<Blob>> {
        let path = dir.join(META_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = std::fs::read(&path)
            .with_context(|| format!("Failed to read blob metadata: {}", path.display()))?;
        let blob = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse blob metadata: {}", path.display()))?;
        Ok(Some(blob))
    }

    fn write(&self, blob: &Blob, content: Option<&[u8]>) -> anyhow::Result<()> {
        let dir = self.blob_dir(&blob.id);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create blob directory: {}", dir.display()))?;
        if let Some(content) = content {
            let path = dir.join(CONTENT_FILE);
            std::fs::write(&path, content)
                .with_context(|| format!("Failed to write blob content: {}", path.display()))?;
        }
        let meta = serde_json::to_vec_pretty(blob).context("Failed to serialize blob metadata")?;
        let path = dir.join(META_FILE);
        std::fs::write(&path, meta)
            .with_context(|| format!("Failed to write blob metadata: {}", path.display()))?;
        Ok(())
    }
}

impl BlobStore for FsBlobStore {
    fn get(&self, id: &BlobId) -> anyhow::Result<Option<Blob>> {
        self.read_meta(&self.blob_dir(id))
    }

    fn content(&self, id: &BlobId) -> anyhow::Result<Option<Vec<u8>>> {
        let path = self.blob_dir(id).join(CONTENT_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = std::fs::read(&path)
            .with_context(|| format!("Failed to read blob content: {}", path.display()))?;
        Ok(Some(bytes))
    }

    fn find_by_origin(&self, origin: &str, blob_type: BlobType) -> anyhow::Result<Option<Blob>> {
        Ok(self
            .list()?
            .into_iter()
            .find(|blob| blob.blob_type == blob_type && blob.origin.as_deref() == Some(origin)))
    }

    fn find_by_owner(&self, owner: &PackageId) -> anyhow::Result<Vec<Blob>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|blob| blob.owner.as_ref() == Some(owner))
            .collect())
    }

    fn list(&self) -> anyhow::Result<Vec<Blob>> {
        let entries = std::fs::read_dir(&self.root)
            .with_context(|| format!("Failed to read directory: {}", self.root.display()))?;

        let mut blobs = Vec::new();
        for entry in entries {
            let entry = entry.with_context(|| {
                format!("Failed to read directory entry: {}", self.root.display())
            })?;
            if !entry.path().is_dir() {
                continue;
            }
            if let Some(blob) = self.read_meta(&entry.path())? {
                blobs.push(blob);
            }
        }
        blobs.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(blobs)
    }

    fn create(&self, blob: NewBlob) -> anyhow::Result<Blob> {
        let (blob, content) = blob.into_blob(BlobId::new());
        self.write(&blob, Some(&content))?;
        Ok(blob)
    }

    fn import(&self, blob: &Blob, content: Vec<u8>) -> anyhow::Result<()> {
        self.write(blob, Some(&content))
    }

    fn overwrite_content(
        &self,
        id: &BlobId,
        content: Vec<u8>,
        origin_timestamp: Option<i64>,
    ) -> anyhow::Result<Blob> {
        let mut blob = self
            .get(id)?
            .ok_or_else(|| anyhow::anyhow!("Blob {} not found", id))?;
        blob.content_hash = content_hash(&content);
        blob.size = content.len() as u64;
        blob.origin_timestamp = origin_timestamp;
        blob.updated_at = chrono::Utc::now();
        self.write(&blob, Some(&content))?;
        Ok(blob)
    }

    fn delete(&self, id: &BlobId) -> anyhow::Result<bool> {
        let dir = self.blob_dir(id);
        if !dir.exists() {
            return Ok(false);
        }
        std::fs::remove_dir_all(&dir)
            .with_context(|| format!("Failed to remove blob directory: {}", dir.display()))?;
        Ok(true)
    }
}
