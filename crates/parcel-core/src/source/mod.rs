//! Package and library origins.

pub mod client;
pub mod maven;
pub mod provider;

pub use client::{ArtifactClient, DownloadedArtifact, LocalRepositoryClient, SnapshotMetadata};
pub use maven::MavenCoordinate;
pub use provider::{ArtifactProvider, PackageSource, RemoteArtifact, StoredArtifact, UploadedArtifact};
