//! Deployment pipeline: staging, commit, delayed updates and deletion.

mod commit;
mod delete;
pub mod manager;
pub mod queue;
pub mod request;
pub mod scope;
pub mod staging;

pub use manager::{OwnedEntities, PackageManager};
pub use queue::CommitQueue;
pub use request::{
    DeployOutcome, DeployRequest, DeployStatus, RefreshOutcome, RefreshStatus,
};
pub use scope::DeploymentScope;
pub use staging::{StagedPackage, StagingArea};
