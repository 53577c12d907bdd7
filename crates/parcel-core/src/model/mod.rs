//! Domain model: packages and the entities they own.

pub mod entity;
pub mod package;
pub mod plan;

pub use entity::{Keyword, OwnedEntity, Plan, Schedule, reuse_old_ids};
pub use package::Package;
pub use plan::{FileRef, PlanNode};
