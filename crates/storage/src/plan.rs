use bson::oid::ObjectId;
use eyre::{eyre, Result};
use log::info;
use model::{plan::PackagePlan, session::Session};

use crate::collection::{Collection, Record};

impl Record for PackagePlan {
    fn id(&self) -> ObjectId {
        self.id
    }
}

#[derive(Clone)]
pub struct PlanStore {
    store: Collection<PackagePlan>,
}

impl PlanStore {
    pub(crate) fn new() -> Self {
        PlanStore {
            store: Collection::new("package_plans"),
        }
    }

    pub async fn insert(&self, session: &mut Session, plan: PackagePlan) -> Result<()> {
        info!("Insert plan: {} {} in gym {}", plan.id, plan.name, plan.gym_id);
        self.store.insert(session, plan)
    }

    pub async fn get(&self, id: ObjectId) -> Result<Option<PackagePlan>> {
        Ok(self.store.get(id))
    }

    pub async fn find_by_gym(&self, gym_id: ObjectId, only_active: bool) -> Result<Vec<PackagePlan>> {
        let mut plans = self
            .store
            .find(|p| p.gym_id == gym_id && (!only_active || p.is_active));
        plans.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(plans)
    }

    pub async fn set_active(&self, session: &mut Session, id: ObjectId, active: bool) -> Result<()> {
        info!("Set plan {} active: {}", id, active);
        self.store
            .update(session, id, |plan| plan.is_active = active)?
            .ok_or_else(|| eyre!("Plan not found: {}", id))?;
        Ok(())
    }
}
