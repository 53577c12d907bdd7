//! Deployment requests and their outcomes.

use std::collections::BTreeMap;

use crate::conflict::ConflictingPackages;
use crate::source::PackageSource;
use crate::types::PackageId;

/// Parameters of a create/update deployment.
#[derive(Debug, Clone)]
pub struct DeployRequest {
    /// Package archive source.
    pub source: Option<PackageSource>,
    /// Optional library attached to the package.
    pub library: Option<PackageSource>,
    /// Update this package instead of looking the target up by name.
    pub explicit_id: Option<PackageId>,
    pub allow_create: bool,
    pub allow_update: bool,
    /// Hand the commit to the background queue when the package is busy.
    pub is_async: bool,
    /// Appended to the package name: `<name>.<version_name>`.
    pub version_name: Option<String>,
    pub activation_expression: Option<String>,
    pub plan_attributes: BTreeMap<String, String>,
    pub keyword_attributes: BTreeMap<String, String>,
    pub token_selection: BTreeMap<String, String>,
    /// Fail when other packages share the package's mutable origins.
    pub check_for_same_origin: bool,
    /// Accept changing packages that share a mutable origin.
    pub allow_update_of_other_packages: bool,
    /// Link to existing blobs with the same origin.
    pub allow_blob_reuse: bool,
    /// Overrides the configured snapshot refresh behavior.
    pub refresh_snapshots: Option<bool>,
    /// User recorded on the package.
    pub actor: Option<String>,
}

impl DeployRequest {
    fn base(source: PackageSource, allow_create: bool, allow_update: bool) -> Self {
        Self {
            source: Some(source),
            library: None,
            explicit_id: None,
            allow_create,
            allow_update,
            is_async: false,
            version_name: None,
            activation_expression: None,
            plan_attributes: BTreeMap::new(),
            keyword_attributes: BTreeMap::new(),
            token_selection: BTreeMap::new(),
            check_for_same_origin: true,
            allow_update_of_other_packages: false,
            allow_blob_reuse: true,
            refresh_snapshots: None,
            actor: None,
        }
    }

    /// Create a new package; fails if one with the same name exists.
    pub fn create(source: PackageSource) -> Self {
        Self::base(source, true, false)
    }

    /// Update an existing package; fails if none matches.
    pub fn update(source: PackageSource) -> Self {
        Self::base(source, false, true)
    }

    pub fn create_or_update(source: PackageSource) -> Self {
        Self::base(source, true, true)
    }

    pub fn with_library(mut self, library: PackageSource) -> Self {
        self.library = Some(library);
        self
    }

    pub fn with_explicit_id(mut self, id: PackageId) -> Self {
        self.explicit_id = Some(id);
        self
    }

    pub fn with_async(mut self, is_async: bool) -> Self {
        self.is_async = is_async;
        self
    }

    pub fn with_version_name(mut self, version_name: impl Into<String>) -> Self {
        self.version_name = Some(version_name.into());
        self
    }

    pub fn with_activation_expression(mut self, expression: impl Into<String>) -> Self {
        self.activation_expression = Some(expression.into());
        self
    }

    pub fn with_plan_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.plan_attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_keyword_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.keyword_attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_token_selection(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.token_selection.insert(key.into(), value.into());
        self
    }

    pub fn with_check_for_same_origin(mut self, check: bool) -> Self {
        self.check_for_same_origin = check;
        self
    }

    pub fn with_allow_update_of_other_packages(mut self, allow: bool) -> Self {
        self.allow_update_of_other_packages = allow;
        self
    }

    pub fn with_allow_blob_reuse(mut self, allow: bool) -> Self {
        self.allow_blob_reuse = allow;
        self
    }

    pub fn with_refresh_snapshots(mut self, refresh: bool) -> Self {
        self.refresh_snapshots = Some(refresh);
        self
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployStatus {
    Created,
    Updated,
    /// The update was queued; poll the package status for completion.
    UpdateDelayed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployOutcome {
    pub status: DeployStatus,
    pub package_id: PackageId,
    /// Other packages sharing a changed snapshot origin, accepted under
    /// `allow_update_of_other_packages`.
    pub conflicts: ConflictingPackages,
    /// Non-fatal notes, e.g. snapshot content left outdated.
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshStatus {
    Refreshed,
    NotRequired,
}

/// Result of refreshing a remote-origin blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshOutcome {
    pub status: RefreshStatus,
    pub infos: Vec<String>,
    pub errors: Vec<String>,
}

impl RefreshOutcome {
    pub(crate) fn new(status: RefreshStatus) -> Self {
        Self {
            status,
            infos: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn is_failed(&self) -> bool {
        !self.errors.is_empty()
    }
}
