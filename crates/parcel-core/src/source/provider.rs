//! Where package and library bytes come from.

use tracing::{debug, warn};

use super::client::{ArtifactClient, DownloadedArtifact};
use super::MavenCoordinate;
use crate::content::PackageArchive;
use crate::error::{DeployError, Result};
use crate::store::{Blob, BlobStore};
use crate::types::{BlobId, BlobType};

const STORED_BLOB_ORIGIN_PREFIX: &str = "blob:";

/// An unresolved package or library source, as given by the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum PackageSource {
    /// Bytes uploaded with the request.
    Upload {
        file_name: Option<String>,
        bytes: Vec<u8>,
    },
    /// A blob already present in the live store.
    StoredBlob(BlobId),
    /// An artifact in a remote repository.
    Remote(MavenCoordinate),
}

impl PackageSource {
    pub fn upload(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self::Upload {
            file_name: Some(file_name.into()),
            bytes,
        }
    }

    pub fn stored(id: impl Into<BlobId>) -> Self {
        Self::StoredBlob(id.into())
    }

    pub fn remote(coordinate: MavenCoordinate) -> Self {
        Self::Remote(coordinate)
    }

    /// Parse a `mvn:` short-form coordinate into a remote source.
    pub fn parse_remote(raw: &str) -> anyhow::Result<Self> {
        Ok(Self::Remote(MavenCoordinate::parse(raw)?))
    }
}

#[derive(Debug, Clone)]
pub struct UploadedArtifact {
    pub file_name: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct StoredArtifact {
    pub blob: Blob,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct RemoteArtifact {
    pub coordinate: MavenCoordinate,
    /// Blob already stored for this coordinate, if any.
    pub existing: Option<Blob>,
    pub file_name: String,
    pub bytes: Vec<u8>,
    /// Timestamp of `bytes` as reported by the repository.
    pub timestamp: Option<i64>,
    /// A freshness check found newer bytes than the stored blob.
    pub newer: bool,
    /// The stored blob had lost its content and it was downloaded again.
    pub content_missing: bool,
}

/// A resolved source: bytes are available and the matching stored blob, if
/// any, has been looked up.
#[derive(Debug, Clone)]
pub enum ArtifactProvider {
    None,
    Upload(UploadedArtifact),
    StoredBlob(StoredArtifact),
    Remote(RemoteArtifact),
}

impl ArtifactProvider {
    /// Resolve `source` for blobs of `blob_type`.
    ///
    /// Remote sources hit the repository here: an existing snapshot blob costs
    /// a metadata check and a download only when newer; an existing release
    /// blob is reused; anything else is downloaded.
    pub fn resolve(
        source: Option<&PackageSource>,
        blob_type: BlobType,
        blobs: &dyn BlobStore,
        client: Option<&dyn ArtifactClient>,
    ) -> Result<Self> {
        match source {
            None => Ok(Self::None),
            Some(PackageSource::Upload { file_name, bytes }) => Ok(Self::Upload(UploadedArtifact {
                file_name: file_name.clone(),
                bytes: bytes.clone(),
            })),
            Some(PackageSource::StoredBlob(id)) => Self::resolve_stored(id, blobs),
            Some(PackageSource::Remote(coordinate)) => {
                let client = client.ok_or_else(|| DeployError::Reading {
                    message: format!("No artifact client configured to resolve {}", coordinate),
                    source: None,
                })?;
                Self::resolve_remote(coordinate, blob_type, blobs, client)
            }
        }
    }

    fn resolve_stored(id: &BlobId, blobs: &dyn BlobStore) -> Result<Self> {
        let blob = blobs
            .get(id)
            .map_err(|err| DeployError::reading(format!("Unable to load blob {}", id), err))?
            .ok_or_else(|| DeployError::Reading {
                message: format!("Blob {} not found", id),
                source: None,
            })?;
        let bytes = blobs
            .content(id)
            .map_err(|err| DeployError::reading(format!("Unable to load blob {}", id), err))?
            .ok_or_else(|| DeployError::Reading {
                message: format!("Content of blob {} is missing", id),
                source: None,
            })?;
        Ok(Self::StoredBlob(StoredArtifact { blob, bytes }))
    }

    fn resolve_remote(
        coordinate: &MavenCoordinate,
        blob_type: BlobType,
        blobs: &dyn BlobStore,
        client: &dyn ArtifactClient,
    ) -> Result<Self> {
        let origin = coordinate.to_string();
        let reading = |err: anyhow::Error| {
            DeployError::reading(format!("Unable to resolve artifact {}", origin), err)
        };

        let existing = blobs.find_by_origin(&origin, blob_type).map_err(reading)?;
        let Some(existing) = existing else {
            let downloaded = client.download(coordinate, None).map_err(reading)?;
            return Ok(Self::remote_download(coordinate, None, downloaded, false, false));
        };

        let stored = blobs.content(&existing.id).map_err(reading)?;
        let Some(stored) = stored else {
            warn!(blob_id = %existing.id, origin = %origin, "Stored artifact content is missing, downloading it again");
            let downloaded = client.download(coordinate, None).map_err(reading)?;
            return Ok(Self::remote_download(coordinate, Some(existing), downloaded, true, true));
        };

        if coordinate.is_snapshot() {
            let metadata = client
                .fetch_metadata(coordinate, existing.origin_timestamp)
                .map_err(reading)?;
            let is_newer = match metadata {
                Some(metadata) => metadata.is_newer,
                None => {
                    warn!(origin = %origin, "No snapshot metadata, treating remote content as new");
                    true
                }
            };
            if is_newer {
                debug!(origin = %origin, "New snapshot version found, downloading it");
                let downloaded = client
                    .download(coordinate, existing.origin_timestamp)
                    .map_err(reading)?;
                return Ok(Self::remote_download(coordinate, Some(existing), downloaded, true, false));
            }
            debug!(origin = %origin, "Latest snapshot version already stored, reusing it");
        }

        Ok(Self::Remote(RemoteArtifact {
            coordinate: coordinate.clone(),
            file_name: existing
                .file_name
                .clone()
                .unwrap_or_else(|| coordinate.file_name()),
            timestamp: existing.origin_timestamp,
            existing: Some(existing),
            bytes: stored,
            newer: false,
            content_missing: false,
        }))
    }

    fn remote_download(
        coordinate: &MavenCoordinate,
        existing: Option<Blob>,
        downloaded: DownloadedArtifact,
        newer: bool,
        content_missing: bool,
    ) -> Self {
        Self::Remote(RemoteArtifact {
            coordinate: coordinate.clone(),
            existing,
            file_name: downloaded.file_name,
            bytes: downloaded.bytes,
            timestamp: downloaded.metadata.map(|metadata| metadata.timestamp),
            newer,
            content_missing,
        })
    }

    /// The same origin served from its stored blob, ignoring newer remote
    /// bytes. `None` unless newer bytes were downloaded over stored content.
    pub fn pinned_to_stored(&self, blobs: &dyn BlobStore) -> Result<Option<Self>> {
        let Self::Remote(remote) = self else {
            return Ok(None);
        };
        if !remote.newer || remote.content_missing {
            return Ok(None);
        }
        let Some(existing) = remote.existing.as_ref() else {
            return Ok(None);
        };
        let stored = blobs.content(&existing.id).map_err(|err| {
            DeployError::reading(format!("Unable to load blob {}", existing.id), err)
        })?;
        let Some(stored) = stored else {
            return Ok(None);
        };
        Ok(Some(Self::Remote(RemoteArtifact {
            coordinate: remote.coordinate.clone(),
            file_name: existing
                .file_name
                .clone()
                .unwrap_or_else(|| remote.coordinate.file_name()),
            timestamp: existing.origin_timestamp,
            existing: Some(existing.clone()),
            bytes: stored,
            newer: false,
            content_missing: false,
        })))
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }

    pub fn as_remote(&self) -> Option<&RemoteArtifact> {
        match self {
            Self::Remote(remote) => Some(remote),
            _ => None,
        }
    }

    /// Canonical origin string, usable as a cache key.
    pub fn origin(&self) -> Option<String> {
        match self {
            Self::None | Self::Upload(_) => None,
            Self::StoredBlob(stored) => {
                Some(format!("{}{}", STORED_BLOB_ORIGIN_PREFIX, stored.blob.id))
            }
            Self::Remote(remote) => Some(remote.coordinate.to_string()),
        }
    }

    /// A snapshot origin whose remote content moved past the stored blob.
    /// Only such origins change the packages already linked to them.
    pub fn is_modifiable_resource(&self) -> bool {
        match self {
            Self::Remote(remote) => remote.coordinate.is_snapshot() && remote.newer,
            _ => false,
        }
    }

    pub fn has_new_content(&self) -> bool {
        match self {
            Self::Remote(remote) => remote.newer || remote.content_missing,
            _ => false,
        }
    }

    /// The stored blob lost its content and the provider downloaded it again.
    pub fn restores_missing_content(&self) -> bool {
        match self {
            Self::Remote(remote) => remote.content_missing,
            _ => false,
        }
    }

    pub fn can_lookup_resources(&self) -> bool {
        self.origin().is_some()
    }

    /// Stored blob matching this provider's origin, found at resolution.
    pub fn existing_blob(&self) -> Option<&Blob> {
        match self {
            Self::StoredBlob(stored) => Some(&stored.blob),
            Self::Remote(remote) => remote.existing.as_ref(),
            Self::None | Self::Upload(_) => None,
        }
    }

    pub fn bytes(&self) -> Option<&[u8]> {
        match self {
            Self::None => None,
            Self::Upload(upload) => Some(&upload.bytes),
            Self::StoredBlob(stored) => Some(&stored.bytes),
            Self::Remote(remote) => Some(&remote.bytes),
        }
    }

    pub fn file_name(&self) -> Option<String> {
        match self {
            Self::None => None,
            Self::Upload(upload) => upload.file_name.clone(),
            Self::StoredBlob(stored) => stored
                .blob
                .file_name
                .clone()
                .or_else(|| Some(stored.blob.name.clone())),
            Self::Remote(remote) => Some(remote.file_name.clone()),
        }
    }

    /// Remote timestamp of the resolved bytes.
    pub fn origin_timestamp(&self) -> Option<i64> {
        match self {
            Self::Remote(remote) => remote.timestamp,
            Self::StoredBlob(stored) => stored.blob.origin_timestamp,
            Self::None | Self::Upload(_) => None,
        }
    }

    pub fn archive(&self) -> Option<PackageArchive> {
        self.bytes()
            .map(|bytes| PackageArchive::new(self.file_name(), bytes.to_vec()))
    }

    /// Human readable description used in messages.
    pub fn describe(&self) -> String {
        match self {
            Self::None => "none".to_string(),
            Self::Upload(upload) => format!(
                "upload '{}'",
                upload.file_name.as_deref().unwrap_or("unnamed")
            ),
            Self::StoredBlob(stored) => format!("stored blob {}", stored.blob.id),
            Self::Remote(remote) => remote.coordinate.to_string(),
        }
    }
}
