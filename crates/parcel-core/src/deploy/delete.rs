//! Removal of everything a package owns.
//!
//! Each entity kind is removed independently; individual failures are logged
//! and do not stop the cascade.

use tracing::{info, warn};

use crate::hooks::HookRegistry;
use crate::model::{OwnedEntity, Package};
use crate::store::{EntityStore, Stores};
use crate::types::{BlobId, PackageId};

/// Delete schedules (through the hooks), plans and keywords owned by `owner`.
pub(crate) fn delete_owned_entities(stores: &Stores, hooks: &HookRegistry, owner: &PackageId) {
    match stores.schedules.find_by_owner(owner) {
        Ok(schedules) => {
            for schedule in schedules {
                if let Err(err) = hooks.delete_schedule(&schedule, stores.schedules.as_ref()) {
                    warn!(package_id = %owner, name = %schedule.name, error = %err, "Failed to delete schedule");
                }
            }
        }
        Err(err) => warn!(package_id = %owner, error = %err, "Failed to list schedules"),
    }

    delete_all(stores.plans.as_ref(), owner);
    delete_all(stores.keywords.as_ref(), owner);
}

fn delete_all<E: OwnedEntity>(store: &dyn EntityStore<E>, owner: &PackageId) {
    let entities = match store.find_by_owner(owner) {
        Ok(entities) => entities,
        Err(err) => {
            warn!(package_id = %owner, kind = E::KIND, error = %err, "Failed to list entities");
            return;
        }
    };
    for entity in entities {
        if let Err(err) = store.delete(entity.id()) {
            warn!(
                package_id = %owner,
                kind = E::KIND,
                name = entity.name(),
                error = %err,
                "Failed to delete entity"
            );
        }
    }
}

/// Delete the blobs owned by `package` and its archive/library blobs when no
/// other package links them. Blobs listed in `keep` survive.
pub(crate) fn delete_package_blobs(stores: &Stores, package: &Package, keep: &[BlobId]) {
    let owned = match stores.blobs.find_by_owner(&package.id) {
        Ok(owned) => owned,
        Err(err) => {
            warn!(package_id = %package.id, error = %err, "Failed to list owned blobs");
            Vec::new()
        }
    };
    for blob in owned {
        if keep.contains(&blob.id) {
            continue;
        }
        delete_blob_logged(stores, &package.id, &blob.id);
    }

    for id in package.linked_blobs() {
        if keep.contains(&id) {
            continue;
        }
        let shared = match stores.packages.find_by_blob(&id) {
            Ok(linked) => linked.iter().any(|other| other.id != package.id),
            Err(err) => {
                warn!(package_id = %package.id, blob_id = %id, error = %err, "Failed to check blob usage, keeping it");
                true
            }
        };
        if shared {
            info!(package_id = %package.id, blob_id = %id, "Blob still linked to other packages, keeping it");
            continue;
        }
        delete_blob_logged(stores, &package.id, &id);
    }
}

fn delete_blob_logged(stores: &Stores, owner: &PackageId, id: &BlobId) {
    if let Err(err) = stores.blobs.delete(id) {
        warn!(package_id = %owner, blob_id = %id, error = %err, "Failed to delete blob");
    }
}
