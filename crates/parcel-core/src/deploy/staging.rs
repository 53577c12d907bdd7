//! Staging of a package version before it touches the live stores.
//!
//! Keywords, plans and schedules are built in memory; files they reference
//! are extracted from the archive into a private blob store under the staging
//! root. Nothing here writes to the live stores.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{debug, warn};

use super::request::DeployRequest;
use crate::content::{ContentReader, PackageArchive, PackageContent};
use crate::error::{DeployError, Result};
use crate::model::{FileRef, Keyword, Package, Plan, Schedule, reuse_old_ids};
use crate::store::fs::FsBlobStore;
use crate::store::{BlobStore, NewBlob, Stores};
use crate::types::{BlobId, BlobType, EntityId, PackageId};

/// Private blob store of one deployment attempt. The directory is removed on
/// drop.
pub struct StagingArea {
    blobs: FsBlobStore,
}

impl StagingArea {
    pub fn create(root: &Path, package_id: &PackageId) -> anyhow::Result<Self> {
        let dir = root.join(format!("{}-{}", package_id, uuid::Uuid::new_v4().simple()));
        let blobs = FsBlobStore::open(&dir)
            .with_context(|| format!("Failed to create staging area: {}", dir.display()))?;
        Ok(Self { blobs })
    }

    pub fn blobs(&self) -> &FsBlobStore {
        &self.blobs
    }

    pub fn path(&self) -> &Path {
        self.blobs.root()
    }
}

impl Drop for StagingArea {
    fn drop(&mut self) {
        let dir: PathBuf = self.blobs.root().to_path_buf();
        if let Err(err) = std::fs::remove_dir_all(&dir) {
            warn!(path = %dir.display(), error = %err, "Failed to remove staging area");
        }
    }
}

impl std::fmt::Debug for StagingArea {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagingArea")
            .field("path", &self.path())
            .finish()
    }
}

/// A fully built package version waiting for commit.
#[derive(Debug)]
pub struct StagedPackage {
    pub package: Package,
    pub keywords: Vec<Keyword>,
    pub plans: Vec<Plan>,
    pub schedules: Vec<Schedule>,
    pub staging: StagingArea,
}

/// Builds a [`StagedPackage`] from package content.
pub(crate) struct Stager<'a> {
    pub reader: &'a dyn ContentReader,
    pub stores: &'a Stores,
    pub staging_root: &'a Path,
}

impl Stager<'_> {
    /// `package` carries the final identity: its id is the old package's id on
    /// update. `old` is the version being replaced, if any.
    pub fn stage(
        &self,
        package: Package,
        content: PackageContent,
        archive: &PackageArchive,
        old: Option<&Package>,
        request: &DeployRequest,
    ) -> Result<StagedPackage> {
        let staging = StagingArea::create(self.staging_root, &package.id)?;
        let mut files = FileExtractor {
            reader: self.reader,
            archive,
            staging: &staging,
            owner: &package.id,
            extracted: HashMap::new(),
        };

        let mut keywords = Vec::with_capacity(content.keywords.len());
        for definition in content.keywords {
            let mut keyword = Keyword::new(definition.name, definition.kind);
            keyword.attributes = definition.attributes;
            keyword
                .attributes
                .extend(request.keyword_attributes.clone());
            keyword.token_selection = request.token_selection.clone();
            keyword.activation_expression = request.activation_expression.clone();
            keyword.owner = Some(package.id.clone());
            if let Some(mut file) = definition.file {
                files.extract(&mut file, BlobType::KeywordFile)?;
                keyword.file = Some(file);
            }
            keywords.push(keyword);
        }

        let mut plans = Vec::with_capacity(content.plans.len());
        for definition in content.plans {
            let mut plan = Plan::new(definition.name, definition.root);
            plan.attributes = definition.attributes;
            plan.attributes.extend(request.plan_attributes.clone());
            plan.activation_expression = request.activation_expression.clone();
            plan.owner = Some(package.id.clone());
            plan.root
                .visit_file_refs_mut(&mut |file: &mut FileRef| files.extract(file, BlobType::PlanFile))?;
            plans.push(plan);
        }

        if let Some(old) = old {
            reuse_old_ids(&mut keywords, &self.stores.keywords.find_by_owner(&old.id)?);
            reuse_old_ids(&mut plans, &self.stores.plans.find_by_owner(&old.id)?);
        }

        let mut schedules = Vec::with_capacity(content.schedules.len());
        for definition in content.schedules {
            let plan_name = definition.plan_name.ok_or_else(|| {
                DeployError::validation(
                    &package.name,
                    format!("Schedule '{}' has no plan name", definition.name),
                )
            })?;
            let plan_id = self.lookup_plan_by_name(&plan_name, &plans, &package, &definition.name)?;
            let assertion_plan_id = definition
                .assertion_plan_name
                .as_deref()
                .map(|name| self.lookup_plan_by_name(name, &plans, &package, &definition.name))
                .transpose()?;

            schedules.push(Schedule {
                id: EntityId::new(),
                name: definition.name,
                cron: definition.cron,
                cron_exclusions: definition.cron_exclusions,
                active: definition.active.unwrap_or(true),
                plan_id,
                plan_name,
                assertion_plan_id,
                execution_parameters: definition.execution_parameters,
                owner: Some(package.id.clone()),
            });
        }

        if let Some(old) = old {
            reuse_old_ids(&mut schedules, &self.stores.schedules.find_by_owner(&old.id)?);
        }

        debug!(
            package_id = %package.id,
            keywords = keywords.len(),
            plans = plans.len(),
            schedules = schedules.len(),
            files = files.extracted.len(),
            "Package staged"
        );

        Ok(StagedPackage {
            package,
            keywords,
            plans,
            schedules,
            staging,
        })
    }

    /// Staged plans first, then live plans not owned by this package.
    fn lookup_plan_by_name(
        &self,
        plan_name: &str,
        staged: &[Plan],
        package: &Package,
        schedule_name: &str,
    ) -> Result<EntityId> {
        if let Some(plan) = staged.iter().find(|plan| plan.name == plan_name) {
            return Ok(plan.id.clone());
        }
        let live = self.stores.plans.find_by_name(plan_name)?;
        live.into_iter()
            .find(|plan| plan.owner.as_ref() != Some(&package.id))
            .map(|plan| plan.id)
            .ok_or_else(|| {
                DeployError::validation(
                    &package.name,
                    format!(
                        "Unresolved plan reference '{}' in schedule '{}'",
                        plan_name, schedule_name
                    ),
                )
            })
    }
}

/// Copies archive entries into the staging store, once per path.
struct FileExtractor<'a> {
    reader: &'a dyn ContentReader,
    archive: &'a PackageArchive,
    staging: &'a StagingArea,
    owner: &'a PackageId,
    extracted: HashMap<String, BlobId>,
}

impl FileExtractor<'_> {
    fn extract(&mut self, file: &mut FileRef, blob_type: BlobType) -> Result<()> {
        let Some(path) = file.as_archive_path() else {
            return Ok(());
        };
        if let Some(id) = self.extracted.get(path) {
            *file = FileRef::Blob(id.clone());
            return Ok(());
        }

        let bytes = self
            .reader
            .read_entry(self.archive, path)
            .map_err(|err| DeployError::reading(format!("Unable to read file '{}' from package", path), err))?;
        let file_name = path.rsplit('/').next().map(str::to_string);
        let blob = self.staging.blobs().create(
            NewBlob::new(blob_type, path, bytes)
                .with_file_name(file_name)
                .with_owner(self.owner.clone()),
        )?;

        self.extracted.insert(path.to_string(), blob.id.clone());
        *file = FileRef::Blob(blob.id);
        Ok(())
    }
}
