//! Parcel Core Library
//!
//! Deploys versioned automation packages: reads an archive, stages its
//! keywords, plans and schedules, and swaps them into the live stores under a
//! per-package lock. Remote (maven) artifacts are cached as blobs and shared
//! between packages.

pub mod access;
pub mod cache;
pub mod config;
pub mod conflict;
pub mod content;
pub mod context;
pub mod deploy;
pub mod error;
pub mod hooks;
pub mod locks;
pub mod model;
pub mod source;
pub mod store;
pub mod types;

/// Re-exports of commonly used types
pub mod prelude {
    // Engine
    pub use crate::conflict::ConflictingPackages;
    pub use crate::context::EngineContext;
    pub use crate::deploy::{
        DeployOutcome, DeployRequest, DeployStatus, OwnedEntities, PackageManager, RefreshOutcome,
        RefreshStatus,
    };
    pub use crate::error::{DeployError, Result};

    // Configuration
    pub use crate::config::EngineConfig;

    // Model
    pub use crate::model::{FileRef, Keyword, Package, Plan, PlanNode, Schedule};
    pub use crate::types::{BlobId, BlobType, EntityId, PackageId, PackageStatus};

    // Sources
    pub use crate::source::{ArtifactClient, MavenCoordinate, PackageSource};

    // Extension points
    pub use crate::access::{AccessPolicy, AllowAll};
    pub use crate::content::{ContentReader, PackageContent};
    pub use crate::hooks::{ExecutionScheduler, ScheduleHook};
    pub use crate::store::{BlobStore, EntityStore, PackageStore, Stores};
}
