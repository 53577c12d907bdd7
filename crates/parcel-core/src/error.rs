//! Error taxonomy for package deployment.

use crate::types::{BlobId, PackageId};

pub type Result<T, E = DeployError> = std::result::Result<T, E>;

/// Errors surfaced by the deployment engine.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// The archive could not be read, or a remote artifact could not be resolved.
    #[error("Unable to read package: {message}")]
    Reading {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// The package content is structurally invalid.
    #[error("Invalid package '{package}': {message}")]
    Validation { package: String, message: String },

    #[error("Unable to change the package name to '{name}'. Package with the same name already exists ({existing})")]
    NameCollision { name: String, existing: PackageId },

    #[error("Package '{name}' already exists")]
    AlreadyExists { name: String },

    #[error("Package '{name}' doesn't exist")]
    DoesNotExist { name: String },

    #[error("Package hasn't been found by id: {0}")]
    NotFound(PackageId),

    #[error("Package {0} is not accessible")]
    NotAccessible(PackageId),

    /// Write access to a shared blob or a linked package was denied.
    #[error("{0}")]
    Access(String),

    #[error("Existing blob '{blob_name}' ({blob_id}) has been detected and cannot be reused or updated")]
    BlobReuseRejected { blob_name: String, blob_id: BlobId },

    /// Other packages already use the same mutable origin.
    #[error(
        "Packages using the same origin already exist (package: {same_origin:?}, library: {same_library:?}). \
         Set allow_update_of_other_packages to update them as well"
    )]
    Collision {
        same_origin: Vec<PackageId>,
        same_library: Vec<PackageId>,
    },

    /// Delete requested while the package write lock is held elsewhere.
    #[error("Package {0} is busy: an update or execution is in progress")]
    Busy(PackageId),

    #[error("Timeout while acquiring the read lock on package {0}; an update is probably in progress")]
    LockTimeout(PackageId),

    /// Copying staged blobs into the live store failed.
    #[error("Unable to commit package '{package}'")]
    Commit {
        package: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to redeploy linked packages {failed:?}: {message}")]
    RedeployFailed {
        failed: Vec<PackageId>,
        message: String,
    },

    #[error("Blob hasn't been found by id: {0}")]
    BlobNotFound(BlobId),

    #[error("Blob {blob} cannot be deleted, it is used by packages {linked:?}")]
    BlobInUse {
        blob: BlobId,
        linked: Vec<PackageId>,
    },

    /// A collaborator (store, hook, reader) failed.
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl DeployError {
    pub fn reading(message: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::Reading {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn validation(package: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            package: package.into(),
            message: message.into(),
        }
    }

    /// Conflicting package ids carried by a collision error.
    pub fn conflicting_packages(&self) -> Option<(&[PackageId], &[PackageId])> {
        match self {
            Self::Collision {
                same_origin,
                same_library,
            } => Some((same_origin, same_library)),
            _ => None,
        }
    }
}
