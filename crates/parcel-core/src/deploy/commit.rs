//! Commit of a staged package into the live stores.
//!
//! Must run under the package write lock.

use tracing::info;

use super::delete::{delete_owned_entities, delete_package_blobs};
use super::scope::DeploymentScope;
use super::staging::StagedPackage;
use crate::error::{DeployError, Result};
use crate::hooks::HookRegistry;
use crate::locks::PackageWriteGuard;
use crate::model::Package;
use crate::store::{BlobStore, Stores};

/// Replace `old` (if any) by `staged`.
///
/// Old entities go first so names never collide. Copying staged blobs is the
/// last step that can abort without having written any new entity.
pub(crate) fn commit(
    stores: &Stores,
    hooks: &HookRegistry,
    staged: StagedPackage,
    old: Option<&Package>,
    scope: &mut DeploymentScope,
    _guard: &PackageWriteGuard,
) -> Result<Package> {
    let StagedPackage {
        mut package,
        keywords,
        plans,
        schedules,
        staging,
    } = staged;

    if let Some(old) = old {
        delete_owned_entities(stores, hooks, &old.id);
        let mut keep = package.linked_blobs();
        keep.extend(scope.created().iter().cloned());
        delete_package_blobs(stores, old, &keep);
    }

    let staged_blobs = staging
        .blobs()
        .list()
        .map_err(|source| commit_error(&package, source))?;
    for blob in staged_blobs {
        let content = staging
            .blobs()
            .content(&blob.id)
            .and_then(|content| {
                content.ok_or_else(|| anyhow::anyhow!("Staged blob {} has no content", blob.id))
            })
            .map_err(|source| commit_error(&package, source))?;
        stores
            .blobs
            .import(&blob, content)
            .map_err(|source| commit_error(&package, source))?;
        scope.track(blob.id);
    }

    for keyword in keywords {
        stores.keywords.save(keyword)?;
    }
    for plan in plans {
        stores.plans.save(plan)?;
    }
    for schedule in schedules {
        hooks.create_schedule(schedule, stores.schedules.as_ref())?;
    }

    package.status = None;
    package.updated_at = chrono::Utc::now();
    stores.packages.save(package.clone())?;

    info!(package_id = %package.id, name = %package.name, "Package committed");
    Ok(package)
}

fn commit_error(package: &Package, source: anyhow::Error) -> DeployError {
    DeployError::Commit {
        package: package.name.clone(),
        source,
    }
}
