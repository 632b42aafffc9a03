use bson::oid::ObjectId;
use eyre::{eyre, Result};
use log::info;
use model::{session::Session, waitlist::WaitlistEntry};

use crate::collection::{Collection, Record};

impl Record for WaitlistEntry {
    fn id(&self) -> ObjectId {
        self.id
    }
}

#[derive(Clone)]
pub struct WaitlistStore {
    store: Collection<WaitlistEntry>,
}

impl WaitlistStore {
    pub(crate) fn new() -> Self {
        WaitlistStore {
            store: Collection::new("waitlist"),
        }
    }

    pub async fn insert(&self, session: &mut Session, entry: WaitlistEntry) -> Result<()> {
        info!(
            "Insert waitlist entry: session {} student {} position {}",
            entry.session_id, entry.student_id, entry.position
        );
        if self.find(entry.session_id, entry.student_id).await?.is_some() {
            return Err(eyre!(
                "Student {} already waits for {}",
                entry.student_id,
                entry.session_id
            ));
        }
        self.store.insert(session, entry)
    }

    pub async fn find(
        &self,
        session_id: ObjectId,
        student_id: ObjectId,
    ) -> Result<Option<WaitlistEntry>> {
        Ok(self
            .store
            .find_one(|e| e.session_id == session_id && e.student_id == student_id))
    }

    /// Entries of the session in queue order.
    pub async fn find_by_session(&self, session_id: ObjectId) -> Result<Vec<WaitlistEntry>> {
        let mut entries = self.store.find(|e| e.session_id == session_id);
        entries.sort_by_key(|e| (e.position, e.created_at));
        Ok(entries)
    }

    pub async fn find_by_student(&self, student_id: ObjectId) -> Result<Vec<WaitlistEntry>> {
        Ok(self.store.find(|e| e.student_id == student_id))
    }

    pub async fn delete(&self, session: &mut Session, id: ObjectId) -> Result<()> {
        info!("Delete waitlist entry: {}", id);
        self.store
            .delete(session, id)?
            .ok_or_else(|| eyre!("Waitlist entry not found: {}", id))?;
        Ok(())
    }

    pub async fn delete_by_session(&self, session: &mut Session, session_id: ObjectId) -> Result<u32> {
        let entries = self.find_by_session(session_id).await?;
        for entry in &entries {
            self.store.delete(session, entry.id)?;
        }
        info!(
            "Delete waitlist of session {}: {} entries",
            session_id,
            entries.len()
        );
        Ok(entries.len() as u32)
    }
}
