//! Package deployment, update and deletion.

use std::sync::Arc;

use tracing::{error, info, warn};

use super::commit::commit;
use super::delete::{delete_owned_entities, delete_package_blobs};
use super::queue::CommitQueue;
use super::request::{DeployOutcome, DeployRequest, DeployStatus, RefreshOutcome, RefreshStatus};
use super::scope::DeploymentScope;
use super::staging::{StagedPackage, Stager};
use crate::access::AccessPolicy;
use crate::cache::{ArtifactCacheManager, LinkPolicy};
use crate::config::EngineConfig;
use crate::conflict::{ConflictDetector, ConflictingPackages};
use crate::content::{ContentReader, PackageContent};
use crate::error::{DeployError, Result};
use crate::hooks::HookRegistry;
use crate::locks::{LockRegistry, PackageReadGuard};
use crate::model::{Keyword, Package, Plan, Schedule};
use crate::source::{ArtifactClient, ArtifactProvider, MavenCoordinate, PackageSource};
use crate::store::Stores;
use crate::types::{BlobId, BlobType, PackageId, PackageStatus};

/// Entities currently owned by a package.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OwnedEntities {
    pub keywords: Vec<Keyword>,
    pub plans: Vec<Plan>,
    pub schedules: Vec<Schedule>,
}

impl OwnedEntities {
    /// The package owns nothing.
    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty() && self.plans.is_empty() && self.schedules.is_empty()
    }
}

/// Blobs refreshed in place during a deployment and the other packages
/// linked to them.
type Refreshed = Vec<(BlobId, Vec<PackageId>)>;

/// Entry point of the engine.
///
/// Cheap to clone; clones share stores, locks and the commit queue.
#[derive(Clone)]
pub struct PackageManager {
    stores: Stores,
    hooks: HookRegistry,
    locks: Arc<LockRegistry>,
    reader: Arc<dyn ContentReader>,
    client: Option<Arc<dyn ArtifactClient>>,
    access: Arc<dyn AccessPolicy>,
    cache: ArtifactCacheManager,
    detector: ConflictDetector,
    config: Arc<EngineConfig>,
    /// Absent in the copies handed to background commits.
    queue: Option<Arc<CommitQueue>>,
}

impl PackageManager {
    /// Create a manager over `stores` and start its commit queue.
    pub fn new(
        stores: Stores,
        reader: Arc<dyn ContentReader>,
        access: Arc<dyn AccessPolicy>,
        config: EngineConfig,
    ) -> anyhow::Result<Self> {
        config.validate()?;
        let queue = CommitQueue::new(config.commit.workers)?;
        Ok(Self {
            cache: ArtifactCacheManager::new(stores.blobs.clone(), stores.packages.clone()),
            detector: ConflictDetector::new(stores.packages.clone()),
            stores,
            hooks: HookRegistry::new(),
            locks: Arc::new(LockRegistry::new()),
            reader,
            client: None,
            access,
            config: Arc::new(config),
            queue: Some(Arc::new(queue)),
        })
    }

    /// Replace the schedule hook chain.
    pub fn with_hooks(mut self, hooks: HookRegistry) -> Self {
        self.hooks = hooks;
        self
    }

    /// Resolve remote sources through `client`.
    pub fn with_client(mut self, client: Arc<dyn ArtifactClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// A manager acting under another access policy, sharing everything else.
    pub fn with_access(&self, access: Arc<dyn AccessPolicy>) -> Self {
        Self {
            access,
            ..self.clone()
        }
    }

    /// Live stores.
    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    /// Per-package lock registry shared by every clone.
    pub fn locks(&self) -> &LockRegistry {
        &self.locks
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Delayed commits not finished yet.
    pub fn pending_commits(&self) -> usize {
        self.queue.as_ref().map_or(0, |queue| queue.pending())
    }

    fn without_queue(&self) -> Self {
        Self {
            queue: None,
            ..self.clone()
        }
    }

    /// Create or update a package.
    pub fn deploy(&self, request: DeployRequest) -> Result<DeployOutcome> {
        let client = self.client.as_deref();
        let archive = ArtifactProvider::resolve(
            request.source.as_ref(),
            BlobType::PackageArchive,
            self.stores.blobs.as_ref(),
            client,
        )?;
        let library = ArtifactProvider::resolve(
            request.library.as_ref(),
            BlobType::PackageLibrary,
            self.stores.blobs.as_ref(),
            client,
        )?;
        self.deploy_resolved(request, archive, library)
    }

    fn deploy_resolved(
        &self,
        request: DeployRequest,
        archive_provider: ArtifactProvider,
        library_provider: ArtifactProvider,
    ) -> Result<DeployOutcome> {
        let refresh_snapshots = request
            .refresh_snapshots
            .unwrap_or(self.config.deploy.refresh_snapshots);
        let mut warnings = Vec::new();
        let (archive_provider, library_provider) = if refresh_snapshots {
            (archive_provider, library_provider)
        } else {
            (
                self.pin_to_stored(archive_provider, &mut warnings)?,
                self.pin_to_stored(library_provider, &mut warnings)?,
            )
        };

        let archive = archive_provider.archive().ok_or_else(|| DeployError::Reading {
            message: "No package archive provided".to_string(),
            source: None,
        })?;
        let content = self
            .reader
            .read(&archive)
            .map_err(|err| {
                DeployError::reading(
                    format!("Unable to read package from {}", archive_provider.describe()),
                    err,
                )
            })?
            .ok_or_else(|| DeployError::Reading {
                message: format!("No package descriptor found in {}", archive_provider.describe()),
                source: None,
            })?;

        let name = package_name(&content, request.version_name.as_deref())?;
        let old = self.find_old_version(&request, &name)?;
        match &old {
            Some(_) if !request.allow_update => return Err(DeployError::AlreadyExists { name }),
            None if !request.allow_create => return Err(DeployError::DoesNotExist { name }),
            _ => {}
        }
        if let Some(old) = &old {
            self.access.check_package_write(old).map_err(|err| {
                DeployError::Access(format!(
                    "You're not allowed to update the package {}: {}",
                    old.log_repr(),
                    err
                ))
            })?;
        }

        let conflicts = if request.check_for_same_origin {
            self.check_conflicts(&request, &archive_provider, &library_provider, old.as_ref())?
        } else {
            ConflictingPackages::default()
        };

        let mut package = new_identity(name, &content, &request, old.as_ref(), &archive_provider);
        info!(package_id = %package.id, name = %package.name, update = old.is_some(), "Deploying package");

        let mut scope = DeploymentScope::new(self.stores.blobs.clone());
        let mut refreshed: Refreshed = Vec::new();
        let policy = LinkPolicy {
            allow_reuse: request.allow_blob_reuse,
            allow_update_content: refresh_snapshots,
        };
        for (provider, blob_type) in [
            (&archive_provider, BlobType::PackageArchive),
            (&library_provider, BlobType::PackageLibrary),
        ] {
            let Some(linked) = self.cache.resolve_and_link_blob(
                provider,
                blob_type,
                &package,
                policy,
                self.access.as_ref(),
            )?
            else {
                continue;
            };
            if linked.created {
                scope.track(linked.blob.id.clone());
            }
            if linked.refreshed {
                refreshed.push((linked.blob.id.clone(), linked.linked_packages));
            }
            match blob_type {
                BlobType::PackageLibrary => package.library_blob = Some(linked.blob.id),
                _ => package.archive_blob = Some(linked.blob.id),
            }
        }

        let staged = Stager {
            reader: self.reader.as_ref(),
            stores: &self.stores,
            staging_root: &self.config.staging.root,
        }
        .stage(package, content, &archive, old.as_ref(), &request)?;

        let id = staged.package.id.clone();
        let guard = match self.locks.try_write_lock(&id) {
            Some(guard) => guard,
            None => match (&old, &self.queue) {
                (Some(old), Some(queue)) if request.is_async => {
                    self.delay_commit(queue, staged, old.clone(), scope, refreshed)?;
                    return Ok(DeployOutcome {
                        status: DeployStatus::UpdateDelayed,
                        package_id: id,
                        conflicts,
                        warnings,
                    });
                }
                _ => self.locks.write_lock(&id),
            },
        };

        let result = commit(&self.stores, &self.hooks, staged, old.as_ref(), &mut scope, &guard);
        drop(guard);
        let committed = result?;
        scope.detach();

        self.propagate(&committed.id, refreshed)?;

        let status = if old.is_some() {
            DeployStatus::Updated
        } else {
            DeployStatus::Created
        };
        Ok(DeployOutcome {
            status,
            package_id: committed.id,
            conflicts,
            warnings,
        })
    }

    /// Swap a provider that downloaded newer snapshot bytes for its stored
    /// blob, so the package keeps matching the blob it links to.
    fn pin_to_stored(
        &self,
        provider: ArtifactProvider,
        warnings: &mut Vec<String>,
    ) -> Result<ArtifactProvider> {
        let Some(pinned) = provider.pinned_to_stored(self.stores.blobs.as_ref())? else {
            return Ok(provider);
        };
        warn!(origin = %provider.describe(), "Snapshot refresh disabled, deploying the stored content");
        warnings.push(format!(
            "A newer version of {} is available but snapshot refresh is disabled. The stored, outdated content was deployed",
            provider.describe()
        ));
        Ok(pinned)
    }

    fn find_old_version(&self, request: &DeployRequest, name: &str) -> Result<Option<Package>> {
        let Some(id) = &request.explicit_id else {
            return Ok(self
                .stores
                .packages
                .find_by_name(name)?
                .filter(|package| self.access.can_read(package)));
        };

        let old = self
            .stores
            .packages
            .get(id)?
            .ok_or_else(|| DeployError::NotFound(id.clone()))?;
        if !self.access.can_read(&old) {
            return Err(DeployError::NotAccessible(id.clone()));
        }
        if old.name != name
            && let Some(other) = self.stores.packages.find_by_name(name)?
            && other.id != old.id
        {
            return Err(DeployError::NameCollision {
                name: name.to_string(),
                existing: other.id,
            });
        }
        Ok(Some(old))
    }

    fn check_conflicts(
        &self,
        request: &DeployRequest,
        archive: &ArtifactProvider,
        library: &ArtifactProvider,
        old: Option<&Package>,
    ) -> Result<ConflictingPackages> {
        let exclude: Vec<PackageId> = old.map(|old| old.id.clone()).into_iter().collect();
        let conflicts = self.detector.find_conflicts(archive, library, &exclude)?;
        if conflicts.is_empty() {
            return Ok(conflicts);
        }
        if !request.allow_update_of_other_packages {
            return Err(DeployError::Collision {
                same_origin: conflicts.same_origin,
                same_library: conflicts.same_library,
            });
        }
        for id in conflicts.all() {
            if let Some(other) = self.stores.packages.get(&id)? {
                self.access.check_package_write(&other).map_err(|err| {
                    DeployError::Access(format!(
                        "You're not allowed to update the package {}: {}",
                        other.log_repr(),
                        err
                    ))
                })?;
            }
        }
        info!(conflicting = ?conflicts.all(), "Updating packages that share a changed origin");
        Ok(conflicts)
    }

    /// Mark the live version, then commit from the background queue once the
    /// write lock is free.
    fn delay_commit(
        &self,
        queue: &CommitQueue,
        staged: StagedPackage,
        old: Package,
        scope: DeploymentScope,
        refreshed: Refreshed,
    ) -> Result<()> {
        let mut marker = old.clone();
        marker.status = Some(PackageStatus::DelayedUpdate);
        self.stores.packages.save(marker)?;
        info!(package_id = %old.id, name = %old.name, "Package is busy, update delayed");

        let worker = self.without_queue();
        queue.submit(move || worker.run_delayed_commit(staged, old, scope, refreshed));
        Ok(())
    }

    fn run_delayed_commit(
        &self,
        staged: StagedPackage,
        old: Package,
        mut scope: DeploymentScope,
        refreshed: Refreshed,
    ) {
        let guard = self.locks.write_lock(&old.id);
        // A delete may have won the lock while the update waited.
        if let Ok(None) = self.stores.packages.get(&old.id) {
            info!(package_id = %old.id, "Package deleted before its delayed update, discarding the update");
            self.locks.release_and_remove(guard);
            drop(staged);
            drop(scope);
            return;
        }
        let result = commit(&self.stores, &self.hooks, staged, Some(&old), &mut scope, &guard);
        drop(guard);

        match result {
            Ok(committed) => {
                scope.detach();
                info!(package_id = %committed.id, "Delayed update committed");
                if let Err(err) = self.propagate(&committed.id, refreshed) {
                    error!(package_id = %committed.id, error = %err, "Failed to redeploy linked packages");
                }
            }
            Err(err) => {
                error!(package_id = %old.id, error = %err, "Delayed update failed");
                drop(scope);
                let mut restored = old;
                restored.status = None;
                if let Err(err) = self.stores.packages.save(restored) {
                    error!(error = %err, "Failed to clear the delayed update marker");
                }
            }
        }
    }

    fn propagate(&self, source: &PackageId, refreshed: Refreshed) -> Result<()> {
        let mut targets: Vec<PackageId> = Vec::new();
        for (blob_id, linked) in refreshed {
            info!(blob_id = %blob_id, linked = linked.len(), "Blob refreshed, redeploying linked packages");
            for id in linked {
                if &id != source && !targets.contains(&id) {
                    targets.push(id);
                }
            }
        }
        if targets.is_empty() {
            return Ok(());
        }
        self.redeploy_packages(&targets)
    }

    fn redeploy_packages(&self, ids: &[PackageId]) -> Result<()> {
        let mut failed = Vec::new();
        let mut reasons = Vec::new();
        for id in ids {
            match self.redeploy_package(id) {
                Ok(outcome) => {
                    info!(package_id = %id, status = ?outcome.status, "Linked package redeployed")
                }
                Err(err) => {
                    warn!(package_id = %id, error = %err, "Failed to redeploy linked package");
                    reasons.push(format!("{}: {}", id, err));
                    failed.push(id.clone());
                }
            }
        }
        if failed.is_empty() {
            Ok(())
        } else {
            Err(DeployError::RedeployFailed {
                failed,
                message: reasons.join("; "),
            })
        }
    }

    /// Redeploy a package from its own stored archive and library.
    fn redeploy_package(&self, id: &PackageId) -> Result<DeployOutcome> {
        let package = self
            .stores
            .packages
            .get(id)?
            .ok_or_else(|| DeployError::NotFound(id.clone()))?;
        let archive = package.archive_blob.clone().ok_or_else(|| DeployError::Reading {
            message: format!("Package {} has no stored archive", package.log_repr()),
            source: None,
        })?;

        let mut request = DeployRequest::update(PackageSource::StoredBlob(archive))
            .with_explicit_id(package.id.clone())
            .with_check_for_same_origin(false)
            .with_async(true);
        request.library = package.library_blob.clone().map(PackageSource::StoredBlob);
        request.version_name = package.version_name.clone();
        request.activation_expression = package.activation_expression.clone();
        request.plan_attributes = package.plan_attributes.clone();
        request.keyword_attributes = package.keyword_attributes.clone();
        request.token_selection = package.token_selection.clone();
        request.actor = package.updated_by.clone();
        self.deploy(request)
    }

    /// Delete a package and everything it owns. Fails with
    /// [`DeployError::Busy`] instead of waiting when the package is locked.
    pub fn delete_package(&self, id: &PackageId) -> Result<()> {
        let package = self.get_package(id)?;
        self.access.check_package_write(&package).map_err(|err| {
            DeployError::Access(format!(
                "You're not allowed to delete the package {}: {}",
                package.log_repr(),
                err
            ))
        })?;

        let guard = self
            .locks
            .try_write_lock(id)
            .ok_or_else(|| DeployError::Busy(id.clone()))?;

        delete_owned_entities(&self.stores, &self.hooks, id);
        delete_package_blobs(&self.stores, &package, &[]);
        let removed = self.stores.packages.delete(id);
        self.locks.release_and_remove(guard);
        removed?;

        info!(package_id = %id, name = %package.name, "Package deleted");
        Ok(())
    }

    /// Package by id; not-found and unreadable packages are errors.
    pub fn get_package(&self, id: &PackageId) -> Result<Package> {
        let package = self
            .stores
            .packages
            .get(id)?
            .ok_or_else(|| DeployError::NotFound(id.clone()))?;
        if !self.access.can_read(&package) {
            return Err(DeployError::NotAccessible(id.clone()));
        }
        Ok(package)
    }

    /// Readable package named `name`, if any.
    pub fn find_package_by_name(&self, name: &str) -> Result<Option<Package>> {
        Ok(self
            .stores
            .packages
            .find_by_name(name)?
            .filter(|package| self.access.can_read(package)))
    }

    /// Every package the access policy lets the caller read.
    pub fn list_packages(&self) -> Result<Vec<Package>> {
        Ok(self
            .stores
            .packages
            .list()?
            .into_iter()
            .filter(|package| self.access.can_read(package))
            .collect())
    }

    /// Keywords, plans and schedules owned by package `id`.
    pub fn owned_entities(&self, id: &PackageId) -> Result<OwnedEntities> {
        Ok(OwnedEntities {
            keywords: self.stores.keywords.find_by_owner(id)?,
            plans: self.stores.plans.find_by_owner(id)?,
            schedules: self.stores.schedules.find_by_owner(id)?,
        })
    }

    /// Read lock held by an execution of the package. Waits at most the
    /// configured timeout.
    pub fn lock_for_execution(&self, id: &PackageId) -> Result<PackageReadGuard> {
        self.get_package(id)?;
        self.locks
            .try_read_lock_for(id, self.config.read_timeout())
            .ok_or_else(|| DeployError::LockTimeout(id.clone()))
    }

    /// Re-check a remote-origin blob, rewrite it when stale or missing, and
    /// redeploy the packages linked to it.
    pub fn refresh_blob(&self, id: &BlobId) -> Result<RefreshOutcome> {
        let blob = self
            .stores
            .blobs
            .get(id)?
            .ok_or_else(|| DeployError::BlobNotFound(id.clone()))?;
        let mut outcome = RefreshOutcome::new(RefreshStatus::NotRequired);

        if let Err(err) = self.access.check_blob_write(&blob) {
            outcome
                .errors
                .push(format!("Access denied to blob {}; reason: {}", id, err));
            return Ok(outcome);
        }
        if !matches!(blob.blob_type, BlobType::PackageArchive | BlobType::PackageLibrary) {
            outcome.errors.push(format!(
                "Unsupported blob type for refresh: {}. Supported types: {}, {}",
                blob.blob_type,
                BlobType::PackageArchive,
                BlobType::PackageLibrary
            ));
        }
        let coordinate = blob
            .origin
            .as_deref()
            .filter(|origin| MavenCoordinate::is_short_form(origin))
            .and_then(|origin| MavenCoordinate::parse(origin).ok());
        let Some(coordinate) = coordinate else {
            outcome.errors.push(format!(
                "Unsupported blob origin for refresh: {}. Only maven artifacts are supported",
                blob.origin.as_deref().unwrap_or("none")
            ));
            return Ok(outcome);
        };
        if outcome.is_failed() {
            return Ok(outcome);
        }

        let client = self.client.as_deref().ok_or_else(|| DeployError::Reading {
            message: format!("No artifact client configured to resolve {}", coordinate),
            source: None,
        })?;
        let reading = |err: anyhow::Error| {
            DeployError::reading(
                format!("Cannot restore {} from the artifact repository", coordinate),
                err,
            )
        };

        let linked = self.detector.find_linked_packages(&blob.id, &[])?;
        let up_to_date = format!(
            "Refresh is not required for blob {}. The content of this blob is already up to date",
            coordinate
        );

        if self.stores.blobs.content(&blob.id)?.is_none() {
            let downloaded = client.download(&coordinate, None).map_err(reading)?;
            self.stores.blobs.overwrite_content(
                &blob.id,
                downloaded.bytes,
                downloaded.metadata.map(|metadata| metadata.timestamp),
            )?;
            outcome.status = RefreshStatus::Refreshed;
        } else if coordinate.is_snapshot() {
            let metadata = client
                .fetch_metadata(&coordinate, blob.origin_timestamp)
                .map_err(reading)?;
            if metadata.is_none() {
                warn!(origin = %coordinate, "No snapshot metadata, treating remote content as new");
            }
            if metadata.is_none_or(|metadata| metadata.is_newer) {
                let downloaded = client
                    .download(&coordinate, blob.origin_timestamp)
                    .map_err(reading)?;
                self.stores.blobs.overwrite_content(
                    &blob.id,
                    downloaded.bytes,
                    downloaded.metadata.map(|metadata| metadata.timestamp),
                )?;
                outcome.status = RefreshStatus::Refreshed;
            } else {
                outcome.infos.push(up_to_date);
            }
        } else {
            outcome.infos.push(up_to_date);
        }

        if outcome.status == RefreshStatus::Refreshed && !linked.is_empty() {
            match self.redeploy_packages(&linked) {
                Ok(()) => outcome.infos.push(format!(
                    "The following packages have been redeployed: {:?}",
                    linked
                )),
                Err(DeployError::RedeployFailed { failed, message }) => {
                    let redeployed: Vec<&PackageId> =
                        linked.iter().filter(|id| !failed.contains(id)).collect();
                    if !redeployed.is_empty() {
                        outcome.infos.push(format!(
                            "The following packages have been redeployed: {:?}",
                            redeployed
                        ));
                    }
                    outcome.errors.push(format!(
                        "Failed to redeploy the following packages: {:?}; Reason: {}",
                        failed, message
                    ));
                }
                Err(err) => outcome.errors.push(err.to_string()),
            }
        }

        info!(blob_id = %id, status = ?outcome.status, "Blob refresh finished");
        Ok(outcome)
    }

    /// Delete a blob no package links to.
    pub fn delete_blob(&self, id: &BlobId) -> Result<()> {
        let blob = self
            .stores
            .blobs
            .get(id)?
            .ok_or_else(|| DeployError::BlobNotFound(id.clone()))?;
        self.access.check_blob_write(&blob).map_err(|err| {
            DeployError::Access(format!("You're not allowed to delete the blob {}: {}", id, err))
        })?;

        let linked = self.detector.find_linked_packages(id, &[])?;
        if !linked.is_empty() {
            return Err(DeployError::BlobInUse {
                blob: id.clone(),
                linked,
            });
        }
        self.stores.blobs.delete(id)?;
        info!(blob_id = %id, "Blob deleted");
        Ok(())
    }
}

impl std::fmt::Debug for PackageManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackageManager")
            .field("locks", &self.locks)
            .field("hooks", &self.hooks)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// `<name>` or `<name>.<version_name>`.
fn package_name(content: &PackageContent, version_name: Option<&str>) -> Result<String> {
    let name = content
        .name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| DeployError::Reading {
            message: "Package name is missing in the package descriptor".to_string(),
            source: None,
        })?;
    Ok(match version_name {
        Some(version) => format!("{}.{}", name, version),
        None => name.to_string(),
    })
}

fn new_identity(
    name: String,
    content: &PackageContent,
    request: &DeployRequest,
    old: Option<&Package>,
    archive: &ArtifactProvider,
) -> Package {
    let mut package = Package::new(name);
    if let Some(old) = old {
        package.id = old.id.clone();
    }
    package.version = content.version.clone();
    package.version_name = request.version_name.clone();
    package.activation_expression = request.activation_expression.clone();
    package.file_name = archive.file_name();
    package.plan_attributes = request.plan_attributes.clone();
    package.keyword_attributes = request.keyword_attributes.clone();
    package.token_selection = request.token_selection.clone();
    package.updated_by = request.actor.clone();
    package
}
