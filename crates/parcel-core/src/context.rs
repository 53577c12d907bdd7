//! Engine context for dependency injection.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing::debug;

use crate::access::{AccessPolicy, AllowAll};
use crate::config::EngineConfig;
use crate::content::{ArchiveContentReader, ContentReader};
use crate::deploy::PackageManager;
use crate::hooks::{ExecutionScheduler, HookRegistry, SchedulerHook};
use crate::source::ArtifactClient;
use crate::store::Stores;

/// Collaborators of the engine, assembled once and turned into a
/// [`PackageManager`].
///
/// Defaults to in-memory stores, the zip archive reader, no artifact client
/// and a policy that grants everything.
#[derive(Clone)]
pub struct EngineContext {
    config: EngineConfig,
    stores: Stores,
    reader: Arc<dyn ContentReader>,
    client: Option<Arc<dyn ArtifactClient>>,
    access: Arc<dyn AccessPolicy>,
    hooks: HookRegistry,
}

impl EngineContext {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            stores: Stores::in_memory(),
            reader: Arc::new(ArchiveContentReader::new()),
            client: None,
            access: Arc::new(AllowAll),
            hooks: HookRegistry::new(),
        }
    }

    /// Context configured from a `parcel.toml`; a missing file yields the
    /// defaults.
    pub fn from_config_file(path: &Path) -> anyhow::Result<Self> {
        let config = EngineConfig::load(path)
            .with_context(|| format!("Failed to load engine config: {}", path.display()))?;
        debug!(path = %path.display(), "Engine config loaded");
        Ok(Self::new(config))
    }

    pub fn with_stores(mut self, stores: Stores) -> Self {
        self.stores = stores;
        self
    }

    pub fn with_reader(mut self, reader: Arc<dyn ContentReader>) -> Self {
        self.reader = reader;
        self
    }

    pub fn with_client(mut self, client: Arc<dyn ArtifactClient>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn with_access(mut self, access: Arc<dyn AccessPolicy>) -> Self {
        self.access = access;
        self
    }

    pub fn with_hooks(mut self, hooks: HookRegistry) -> Self {
        self.hooks = hooks;
        self
    }

    /// Register schedules with `scheduler` as they are created and deleted.
    pub fn with_scheduler(mut self, scheduler: Arc<dyn ExecutionScheduler>) -> Self {
        let hook = SchedulerHook::new(scheduler, self.stores.schedules.clone());
        self.hooks = self.hooks.with_hook(Arc::new(hook));
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    pub fn build(self) -> anyhow::Result<PackageManager> {
        let mut manager = PackageManager::new(self.stores, self.reader, self.access, self.config)?
            .with_hooks(self.hooks);
        if let Some(client) = self.client {
            manager = manager.with_client(client);
        }
        Ok(manager)
    }
}

impl Default for EngineContext {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl std::fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineContext")
            .field("config", &self.config)
            .field("hooks", &self.hooks)
            .field("client", &self.client.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let context = EngineContext::from_config_file(&dir.path().join("parcel.toml")).unwrap();
        assert_eq!(context.config(), &EngineConfig::default());
    }

    #[test]
    fn builds_a_manager_with_the_configured_stores() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::default().with_staging_root(dir.path());
        let manager = EngineContext::new(config).build().unwrap();

        assert!(manager.list_packages().unwrap().is_empty());
        assert_eq!(manager.pending_commits(), 0);
        assert_eq!(manager.config().staging.root, dir.path());
    }

    #[test]
    fn invalid_config_is_rejected_at_build() {
        let config = EngineConfig::default().with_commit_workers(0);
        assert!(EngineContext::new(config).build().is_err());
    }
}
