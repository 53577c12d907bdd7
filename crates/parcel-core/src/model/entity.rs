//! Entities owned by a package: keywords, plans and schedules.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use super::plan::{FileRef, PlanNode};
use crate::types::{EntityId, PackageId};

/// Common surface of entities deployed as part of a package.
pub trait OwnedEntity: Clone + Send + Sync + 'static {
    /// Entity kind, used in log lines.
    const KIND: &'static str;

    fn id(&self) -> &EntityId;
    fn set_id(&mut self, id: EntityId);
    fn name(&self) -> &str;
    fn owner(&self) -> Option<&PackageId>;
    fn set_owner(&mut self, owner: PackageId);
}

/// Give every entity in `entities` the identifier of the old entity with the
/// same name. Entities without a match keep their freshly generated id.
pub fn reuse_old_ids<E: OwnedEntity>(entities: &mut [E], old: &[E]) {
    let name_to_id: HashMap<&str, &EntityId> =
        old.iter().map(|entity| (entity.name(), entity.id())).collect();
    for entity in entities.iter_mut() {
        if let Some(id) = name_to_id.get(entity.name()) {
            entity.set_id((*id).clone());
        }
    }
}

/// A keyword (function) callable from plans.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyword {
    pub id: EntityId,
    pub name: String,
    /// Keyword implementation type (e.g. "script", "java", "composite").
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<FileRef>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub token_selection: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activation_expression: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<PackageId>,
}

impl Keyword {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: EntityId::new(),
            name: name.into(),
            kind: kind.into(),
            file: None,
            attributes: BTreeMap::new(),
            token_selection: BTreeMap::new(),
            activation_expression: None,
            owner: None,
        }
    }
}

/// An executable plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub id: EntityId,
    pub name: String,
    pub root: PlanNode,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activation_expression: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<PackageId>,
}

impl Plan {
    pub fn new(name: impl Into<String>, root: PlanNode) -> Self {
        Self {
            id: EntityId::new(),
            name: name.into(),
            root,
            attributes: BTreeMap::new(),
            activation_expression: None,
            owner: None,
        }
    }
}

/// A recurring execution of a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub id: EntityId,
    pub name: String,
    pub cron: String,
    #[serde(default)]
    pub cron_exclusions: Vec<String>,
    pub active: bool,
    /// Plan executed by this schedule.
    pub plan_id: EntityId,
    pub plan_name: String,
    /// Plan executed after each run to assert on its results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assertion_plan_id: Option<EntityId>,
    #[serde(default)]
    pub execution_parameters: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<PackageId>,
}

macro_rules! impl_owned_entity {
    ($ty:ty, $kind:literal) => {
        impl OwnedEntity for $ty {
            const KIND: &'static str = $kind;

            fn id(&self) -> &EntityId {
                &self.id
            }

            fn set_id(&mut self, id: EntityId) {
                self.id = id;
            }

            fn name(&self) -> &str {
                &self.name
            }

            fn owner(&self) -> Option<&PackageId> {
                self.owner.as_ref()
            }

            fn set_owner(&mut self, owner: PackageId) {
                self.owner = Some(owner);
            }
        }
    };
}

impl_owned_entity!(Keyword, "keyword");
impl_owned_entity!(Plan, "plan");
impl_owned_entity!(Schedule, "schedule");
