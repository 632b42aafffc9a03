use bson::oid::ObjectId;
use chrono::{DateTime, Utc};
use eyre::{eyre, Result};
use log::info;
use model::{
    class_session::{ClassSession, SessionFilter, SessionStatus},
    session::Session,
    slot::Slot,
};

use crate::collection::{Collection, Record};

impl Record for ClassSession {
    fn id(&self) -> ObjectId {
        self.id
    }
}

#[derive(Clone)]
pub struct CalendarStore {
    store: Collection<ClassSession>,
}

impl CalendarStore {
    pub(crate) fn new() -> Self {
        CalendarStore {
            store: Collection::new("class_sessions"),
        }
    }

    pub async fn insert(&self, session: &mut Session, class: ClassSession) -> Result<()> {
        info!(
            "Insert session: {} room {} {:?}",
            class.id,
            class.room_id,
            class.get_slot()
        );
        self.store.insert(session, class)
    }

    pub async fn get(&self, id: ObjectId) -> Result<Option<ClassSession>> {
        Ok(self.store.get(id))
    }

    /// Sessions matching the filter, ordered by start time.
    pub async fn find(&self, filter: &SessionFilter) -> Result<Vec<ClassSession>> {
        let mut sessions = self.store.find(|s| filter.matches(s));
        sessions.sort_by_key(|s| (s.start_at, s.id));
        if let Some(limit) = filter.limit {
            sessions.truncate(limit);
        }
        Ok(sessions)
    }

    pub async fn find_range(
        &self,
        gym_id: ObjectId,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<ClassSession>> {
        self.find(&SessionFilter {
            gym_id: Some(gym_id),
            from,
            to,
            ..Default::default()
        })
        .await
    }

    /// First active session in the room overlapping the slot.
    pub async fn find_conflict(
        &self,
        room_id: ObjectId,
        slot: &Slot,
        exclude: Option<ObjectId>,
    ) -> Result<Option<ClassSession>> {
        Ok(self
            .store
            .find_one(|s| Some(s.id) != exclude && s.collides_with(room_id, slot)))
    }

    pub async fn set_status(
        &self,
        session: &mut Session,
        id: ObjectId,
        status: SessionStatus,
    ) -> Result<ClassSession> {
        info!("Set session {} status: {:?}", id, status);
        self.update(session, id, |class| class.status = status)
    }

    pub async fn set_capacity(
        &self,
        session: &mut Session,
        id: ObjectId,
        capacity: u32,
    ) -> Result<ClassSession> {
        info!("Set session {} capacity: {}", id, capacity);
        self.update(session, id, |class| class.capacity = capacity)
    }

    pub async fn set_slot(
        &self,
        session: &mut Session,
        id: ObjectId,
        slot: Slot,
    ) -> Result<ClassSession> {
        info!("Set session {} slot: {:?}", id, slot);
        self.update(session, id, |class| {
            class.start_at = slot.start_at;
            class.end_at = slot.end_at;
        })
    }

    /// Hands out the next waitlist position of the session.
    pub async fn next_waitlist_position(&self, session: &mut Session, id: ObjectId) -> Result<u32> {
        let class = self.update(session, id, |class| class.waitlist_seq += 1)?;
        Ok(class.waitlist_seq)
    }

    pub async fn delete(&self, session: &mut Session, id: ObjectId) -> Result<ClassSession> {
        info!("Delete session: {}", id);
        self.store
            .delete(session, id)?
            .ok_or_else(|| eyre!("Session not found: {}", id))
    }

    fn update(
        &self,
        session: &mut Session,
        id: ObjectId,
        update: impl FnOnce(&mut ClassSession),
    ) -> Result<ClassSession> {
        self.store
            .update(session, id, |class| {
                update(class);
                class.version += 1;
            })?
            .ok_or_else(|| eyre!("Session not found: {}", id))
    }
}
