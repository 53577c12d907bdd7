//! Extension hooks around schedule persistence.

use std::sync::Arc;

use anyhow::Context;
use tracing::debug;

use crate::model::Schedule;
use crate::store::EntityStore;
use crate::types::EntityId;

/// Intercepts schedule creation and deletion.
///
/// Returning `true` means the hook handled the schedule and the default store
/// must be bypassed.
pub trait ScheduleHook: Send + Sync {
    fn on_create(&self, schedule: &Schedule) -> anyhow::Result<bool>;
    fn on_delete(&self, schedule: &Schedule) -> anyhow::Result<bool>;
}

/// Ordered set of schedule hooks in front of the schedule store.
#[derive(Clone, Default)]
pub struct HookRegistry {
    hooks: Vec<Arc<dyn ScheduleHook>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hook(mut self, hook: Arc<dyn ScheduleHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Persist `schedule` through the first hook that handles it, or the store.
    pub fn create_schedule(
        &self,
        schedule: Schedule,
        store: &dyn EntityStore<Schedule>,
    ) -> anyhow::Result<()> {
        for hook in &self.hooks {
            if hook.on_create(&schedule)? {
                debug!(name = %schedule.name, "Schedule handled by hook");
                return Ok(());
            }
        }
        store.save(schedule)
    }

    pub fn delete_schedule(
        &self,
        schedule: &Schedule,
        store: &dyn EntityStore<Schedule>,
    ) -> anyhow::Result<()> {
        for hook in &self.hooks {
            if hook.on_delete(schedule)? {
                return Ok(());
            }
        }
        store.delete(&schedule.id)?;
        Ok(())
    }
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRegistry")
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

/// Runs schedules. Lives outside the engine.
pub trait ExecutionScheduler: Send + Sync {
    fn add_or_update(&self, schedule: &Schedule) -> anyhow::Result<()>;
    fn remove(&self, id: &EntityId) -> anyhow::Result<()>;
}

/// Stores schedules and registers them with an [`ExecutionScheduler`].
pub struct SchedulerHook {
    scheduler: Arc<dyn ExecutionScheduler>,
    store: Arc<dyn EntityStore<Schedule>>,
}

impl SchedulerHook {
    pub fn new(scheduler: Arc<dyn ExecutionScheduler>, store: Arc<dyn EntityStore<Schedule>>) -> Self {
        Self { scheduler, store }
    }
}

impl ScheduleHook for SchedulerHook {
    fn on_create(&self, schedule: &Schedule) -> anyhow::Result<bool> {
        self.store.save(schedule.clone())?;
        self.scheduler
            .add_or_update(schedule)
            .with_context(|| format!("Failed to register schedule '{}'", schedule.name))?;
        Ok(true)
    }

    fn on_delete(&self, schedule: &Schedule) -> anyhow::Result<bool> {
        self.scheduler
            .remove(&schedule.id)
            .with_context(|| format!("Failed to unregister schedule '{}'", schedule.name))?;
        self.store.delete(&schedule.id)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryEntityStore;
    use parking_lot::Mutex;
    use std::collections::BTreeMap;

    #[derive(Default)]
    struct RecordingScheduler {
        active: Mutex<Vec<EntityId>>,
    }

    impl ExecutionScheduler for RecordingScheduler {
        fn add_or_update(&self, schedule: &Schedule) -> anyhow::Result<()> {
            self.active.lock().push(schedule.id.clone());
            Ok(())
        }

        fn remove(&self, id: &EntityId) -> anyhow::Result<()> {
            self.active.lock().retain(|active| active != id);
            Ok(())
        }
    }

    fn schedule() -> Schedule {
        Schedule {
            id: EntityId::new(),
            name: "nightly".to_string(),
            cron: "0 0 * * *".to_string(),
            cron_exclusions: Vec::new(),
            active: true,
            plan_id: EntityId::new(),
            plan_name: "Pl1".to_string(),
            assertion_plan_id: None,
            execution_parameters: BTreeMap::new(),
            owner: None,
        }
    }

    #[test]
    fn without_hooks_the_store_is_used() {
        let store = MemoryEntityStore::<Schedule>::default();
        let registry = HookRegistry::new();
        let schedule = schedule();

        registry.create_schedule(schedule.clone(), &store).unwrap();
        assert!(store.get(&schedule.id).unwrap().is_some());

        registry.delete_schedule(&schedule, &store).unwrap();
        assert!(store.get(&schedule.id).unwrap().is_none());
    }

    #[test]
    fn scheduler_hook_registers_and_unregisters() {
        let store = Arc::new(MemoryEntityStore::<Schedule>::default());
        let scheduler = Arc::new(RecordingScheduler::default());
        let registry = HookRegistry::new().with_hook(Arc::new(SchedulerHook::new(
            scheduler.clone(),
            store.clone(),
        )));
        let schedule = schedule();

        registry.create_schedule(schedule.clone(), store.as_ref()).unwrap();
        assert_eq!(*scheduler.active.lock(), vec![schedule.id.clone()]);
        assert!(store.get(&schedule.id).unwrap().is_some());

        registry.delete_schedule(&schedule, store.as_ref()).unwrap();
        assert!(scheduler.active.lock().is_empty());
        assert!(store.get(&schedule.id).unwrap().is_none());
    }
}
