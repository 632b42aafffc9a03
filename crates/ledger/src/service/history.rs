use std::sync::Arc;

use async_trait::async_trait;
use bson::{oid::ObjectId, Document};
use eyre::Result;
use log::error;
use model::{
    history::{Action, Entity, HistoryRow},
    session::Session,
};
use storage::history::HistoryStore;

/// Destination of audit rows.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, session: &mut Session, entry: HistoryRow) -> Result<()>;
}

#[async_trait]
impl AuditSink for HistoryStore {
    async fn append(&self, session: &mut Session, entry: HistoryRow) -> Result<()> {
        self.store(session, entry).await
    }
}

/// Id recorded as the actor of unattended operations (expiry sweep).
pub fn system_actor() -> ObjectId {
    ObjectId::from_bytes([0; 12])
}

#[derive(Clone)]
pub struct History {
    store: HistoryStore,
    sink: Arc<dyn AuditSink>,
}

impl History {
    pub fn new(store: HistoryStore) -> Self {
        let sink = Arc::new(store.clone());
        History { store, sink }
    }

    pub fn with_sink(store: HistoryStore, sink: Arc<dyn AuditSink>) -> Self {
        History { store, sink }
    }

    /// Appends an audit row. A sink failure is logged and swallowed: the
    /// audited mutation stands either way.
    pub(crate) async fn record(
        &self,
        session: &mut Session,
        actor: ObjectId,
        entity: Entity,
        entity_id: ObjectId,
        action: Action,
        diff: Document,
    ) {
        let entry = HistoryRow::new(actor, entity, entity_id, action, diff);
        if let Err(err) = self.sink.append(session, entry).await {
            error!(
                "Failed to audit {:?}/{:?} of {} by {}: {:#}",
                entity, action, entity_id, actor, err
            );
        }
    }

    pub async fn logs(&self, limit: usize, offset: usize) -> Result<Vec<HistoryRow>> {
        self.store.get_logs(limit, offset).await
    }

    pub async fn actor_logs(
        &self,
        actor: ObjectId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<HistoryRow>> {
        self.store.get_actor_logs(actor, limit, offset).await
    }

    pub async fn entity_logs(&self, entity: Entity, entity_id: ObjectId) -> Result<Vec<HistoryRow>> {
        self.store.get_entity_logs(entity, entity_id).await
    }
}
