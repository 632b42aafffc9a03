use bson::oid::ObjectId;
use eyre::Result;
use model::{
    history::{Entity, HistoryRow},
    session::Session,
};

use crate::collection::{Collection, Record};

impl Record for HistoryRow {
    fn id(&self) -> ObjectId {
        self.id
    }
}

#[derive(Clone)]
pub struct HistoryStore {
    store: Collection<HistoryRow>,
}

impl HistoryStore {
    pub(crate) fn new() -> Self {
        HistoryStore {
            store: Collection::new("history"),
        }
    }

    pub async fn store(&self, session: &mut Session, entry: HistoryRow) -> Result<()> {
        self.store.insert(session, entry)
    }

    /// Newest entries first.
    pub async fn get_logs(&self, limit: usize, offset: usize) -> Result<Vec<HistoryRow>> {
        Ok(page(self.store.find(|_| true), limit, offset))
    }

    pub async fn get_actor_logs(
        &self,
        actor: ObjectId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<HistoryRow>> {
        Ok(page(self.store.find(|row| row.actor == actor), limit, offset))
    }

    /// Every entry of one entity, oldest first.
    pub async fn get_entity_logs(&self, entity: Entity, entity_id: ObjectId) -> Result<Vec<HistoryRow>> {
        let mut rows = self
            .store
            .find(|row| row.entity == entity && row.entity_id == entity_id);
        rows.sort_by_key(|row| (row.date_time, row.id));
        Ok(rows)
    }
}

fn page(mut rows: Vec<HistoryRow>, limit: usize, offset: usize) -> Vec<HistoryRow> {
    rows.sort_by(|a, b| b.date_time.cmp(&a.date_time).then(b.id.cmp(&a.id)));
    rows.into_iter().skip(offset).take(limit).collect()
}
