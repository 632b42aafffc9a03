use bson::oid::ObjectId;
use eyre::{eyre, Result};
use log::info;
use model::{session::Session, template::ScheduleTemplate};

use crate::collection::{Collection, Record};

impl Record for ScheduleTemplate {
    fn id(&self) -> ObjectId {
        self.id
    }
}

#[derive(Clone)]
pub struct TemplateStore {
    store: Collection<ScheduleTemplate>,
}

impl TemplateStore {
    pub(crate) fn new() -> Self {
        TemplateStore {
            store: Collection::new("schedule_templates"),
        }
    }

    pub async fn insert(&self, session: &mut Session, template: ScheduleTemplate) -> Result<()> {
        info!(
            "Insert template: {} room {} {:?} at {}",
            template.id, template.room_id, template.days_of_week, template.start_time
        );
        self.store.insert(session, template)
    }

    pub async fn get(&self, id: ObjectId) -> Result<Option<ScheduleTemplate>> {
        Ok(self.store.get(id))
    }

    pub async fn find_by_gym(&self, gym_id: ObjectId) -> Result<Vec<ScheduleTemplate>> {
        let mut templates = self.store.find(|t| t.gym_id == gym_id);
        templates.sort_by_key(|t| (t.created_at, t.id));
        Ok(templates)
    }

    pub async fn set_active(&self, session: &mut Session, id: ObjectId, active: bool) -> Result<()> {
        info!("Set template {} active: {}", id, active);
        self.store
            .update(session, id, |template| template.active = active)?
            .ok_or_else(|| eyre!("Template not found: {}", id))?;
        Ok(())
    }
}
