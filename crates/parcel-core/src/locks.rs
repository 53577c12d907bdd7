//! Per-package reader/writer locks.
//!
//! Entries are created lazily on first access. Read locks keep a package from
//! being replaced while it is referenced (e.g. by a running execution); write
//! locks gate commit and delete.

use parking_lot::{ArcRwLockReadGuard, ArcRwLockWriteGuard, Mutex, RawRwLock, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::types::PackageId;

type Entry = Arc<RwLock<()>>;

/// Owned read lock on a package. Released on drop.
pub struct PackageReadGuard {
    id: PackageId,
    _guard: ArcRwLockReadGuard<RawRwLock, ()>,
}

impl PackageReadGuard {
    /// Package this guard locks.
    pub fn package_id(&self) -> &PackageId {
        &self.id
    }

    /// Release the lock now instead of at end of scope.
    pub fn unlock(self) {}
}

impl std::fmt::Debug for PackageReadGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackageReadGuard").field("id", &self.id).finish()
    }
}

/// Owned write lock on a package. Released on drop.
pub struct PackageWriteGuard {
    id: PackageId,
    guard: ArcRwLockWriteGuard<RawRwLock, ()>,
}

impl PackageWriteGuard {
    /// Package this guard locks.
    pub fn package_id(&self) -> &PackageId {
        &self.id
    }

    /// Release the lock now instead of at end of scope.
    pub fn unlock(self) {}
}

impl std::fmt::Debug for PackageWriteGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackageWriteGuard").field("id", &self.id).finish()
    }
}

/// Lock entries keyed by package id.
#[derive(Default)]
pub struct LockRegistry {
    entries: Mutex<HashMap<PackageId, Entry>>,
}

impl LockRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, id: &PackageId) -> Entry {
        let mut entries = self.entries.lock();
        Arc::clone(
            entries
                .entry(id.clone())
                .or_insert_with(|| Arc::new(RwLock::new(()))),
        )
    }

    /// Block until the read lock is held.
    pub fn read_lock(&self, id: &PackageId) -> PackageReadGuard {
        let entry = self.entry(id);
        PackageReadGuard {
            id: id.clone(),
            _guard: entry.read_arc(),
        }
    }

    /// Wait at most `timeout` for the read lock.
    pub fn try_read_lock_for(&self, id: &PackageId, timeout: Duration) -> Option<PackageReadGuard> {
        let entry = self.entry(id);
        entry.try_read_arc_for(timeout).map(|guard| PackageReadGuard {
            id: id.clone(),
            _guard: guard,
        })
    }

    /// Block until the write lock is held.
    pub fn write_lock(&self, id: &PackageId) -> PackageWriteGuard {
        let entry = self.entry(id);
        PackageWriteGuard {
            id: id.clone(),
            guard: entry.write_arc(),
        }
    }

    /// Take the write lock if it is free right now.
    pub fn try_write_lock(&self, id: &PackageId) -> Option<PackageWriteGuard> {
        let entry = self.entry(id);
        entry.try_write_arc().map(|guard| PackageWriteGuard {
            id: id.clone(),
            guard,
        })
    }

    /// Release a held write lock and drop the entry when no one else holds or
    /// waits on it.
    ///
    /// The map mutex is held across the release so no new holder can obtain
    /// the entry in between.
    pub fn release_and_remove(&self, guard: PackageWriteGuard) {
        let mut entries = self.entries.lock();
        let PackageWriteGuard { id, guard } = guard;
        drop(guard);
        let unused = entries
            .get(&id)
            .is_some_and(|entry| Arc::strong_count(entry) == 1);
        if unused {
            entries.remove(&id);
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// No entry is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for LockRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockRegistry")
            .field("entries", &self.len())
            .finish()
    }
}
