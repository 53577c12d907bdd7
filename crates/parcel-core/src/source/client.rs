//! Remote artifact repository client contract.

use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use anyhow::Context;

use super::MavenCoordinate;

/// Freshness information for a snapshot artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotMetadata {
    /// Whether the remote artifact is newer than the known timestamp.
    pub is_newer: bool,
    /// Remote timestamp in milliseconds since the epoch.
    pub timestamp: i64,
}

#[derive(Debug, Clone)]
pub struct DownloadedArtifact {
    pub file_name: String,
    pub bytes: Vec<u8>,
    /// Present for snapshot artifacts.
    pub metadata: Option<SnapshotMetadata>,
}

/// Transport to an artifact repository.
pub trait ArtifactClient: Send + Sync {
    /// Cheap freshness check. `Ok(None)` means the repository has no metadata
    /// for the coordinate.
    fn fetch_metadata(
        &self,
        coordinate: &MavenCoordinate,
        known_timestamp: Option<i64>,
    ) -> anyhow::Result<Option<SnapshotMetadata>>;

    fn download(
        &self,
        coordinate: &MavenCoordinate,
        known_timestamp: Option<i64>,
    ) -> anyhow::Result<DownloadedArtifact>;
}

/// Client over a repository laid out on disk the Maven way:
/// `<root>/<group path>/<artifactId>/<version>/<file>`.
///
/// Snapshot timestamps come from the file modification time.
#[derive(Debug, Clone)]
pub struct LocalRepositoryClient {
    root: PathBuf,
}

impl LocalRepositoryClient {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Client over the user's local repository (`~/.m2/repository`).
    pub fn user_default() -> anyhow::Result<Self> {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(Self::new(home.join(".m2").join("repository")))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn artifact_path(&self, coordinate: &MavenCoordinate) -> PathBuf {
        let mut path = self.root.clone();
        for segment in coordinate.group_id.split('.') {
            path.push(segment);
        }
        path.join(&coordinate.artifact_id)
            .join(&coordinate.version)
            .join(coordinate.file_name())
    }

    fn modified_millis(path: &Path) -> anyhow::Result<i64> {
        let modified = std::fs::metadata(path)
            .and_then(|meta| meta.modified())
            .with_context(|| format!("Failed to read modification time: {}", path.display()))?;
        let millis = modified
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as i64)
            .unwrap_or_default();
        Ok(millis)
    }
}

impl ArtifactClient for LocalRepositoryClient {
    fn fetch_metadata(
        &self,
        coordinate: &MavenCoordinate,
        known_timestamp: Option<i64>,
    ) -> anyhow::Result<Option<SnapshotMetadata>> {
        if !coordinate.is_snapshot() {
            return Ok(None);
        }
        let path = self.artifact_path(coordinate);
        if !path.exists() {
            anyhow::bail!("Artifact {} not found at {}", coordinate, path.display());
        }
        let timestamp = Self::modified_millis(&path)?;
        Ok(Some(SnapshotMetadata {
            is_newer: known_timestamp.is_none_or(|known| timestamp > known),
            timestamp,
        }))
    }

    fn download(
        &self,
        coordinate: &MavenCoordinate,
        known_timestamp: Option<i64>,
    ) -> anyhow::Result<DownloadedArtifact> {
        let path = self.artifact_path(coordinate);
        let bytes = std::fs::read(&path)
            .with_context(|| format!("Failed to read artifact {} at {}", coordinate, path.display()))?;
        let metadata = self.fetch_metadata(coordinate, known_timestamp)?;
        Ok(DownloadedArtifact {
            file_name: coordinate.file_name(),
            bytes,
            metadata,
        })
    }
}
