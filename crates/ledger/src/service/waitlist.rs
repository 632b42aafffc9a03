use bson::{doc, oid::ObjectId};
use model::{
    class_session::ClassSession,
    errors::LedgerError,
    history::{Action, Entity},
    rights::Principal,
    session::Session,
    waitlist::WaitlistEntry,
};
use storage::{calendar::CalendarStore, waitlist::WaitlistStore};
use tx_macro::tx;

use super::history::History;

#[derive(Clone)]
pub struct Waitlist {
    store: WaitlistStore,
    calendar: CalendarStore,
    logs: History,
}

impl Waitlist {
    pub(crate) fn new(store: WaitlistStore, calendar: CalendarStore, logs: History) -> Self {
        Waitlist {
            store,
            calendar,
            logs,
        }
    }

    /// Queues the student at the next position of the session. Must run in
    /// the transaction that observed the session full.
    pub(crate) async fn enqueue(
        &self,
        session: &mut Session,
        class: &ClassSession,
        student_id: ObjectId,
    ) -> Result<WaitlistEntry, LedgerError> {
        if self.store.find(class.id, student_id).await?.is_some() {
            return Err(LedgerError::AlreadyWaitlisted {
                session_id: class.id,
                student_id,
            });
        }
        let position = self
            .calendar
            .next_waitlist_position(session, class.id)
            .await?;
        let entry = WaitlistEntry::new(class.id, student_id, position);
        self.store.insert(session, entry.clone()).await?;
        self.logs
            .record(
                session,
                student_id,
                Entity::Waitlist,
                entry.id,
                Action::Enqueue,
                doc! { "session_id": class.id, "position": position },
            )
            .await;
        Ok(entry)
    }

    pub(crate) async fn remove(
        &self,
        session: &mut Session,
        entry: &WaitlistEntry,
    ) -> Result<(), LedgerError> {
        self.store.delete(session, entry.id).await?;
        Ok(())
    }

    /// Removes the caller from the queue. Positions of the others stay as
    /// they are.
    #[tx]
    pub async fn leave_waitlist(
        &self,
        session: &mut Session,
        principal: &Principal,
        session_id: ObjectId,
    ) -> Result<(), LedgerError> {
        let entry = self
            .store
            .find(session_id, principal.user_id)
            .await?
            .ok_or(LedgerError::NotWaitlisted {
                session_id,
                student_id: principal.user_id,
            })?;
        self.store.delete(session, entry.id).await?;
        self.logs
            .record(
                session,
                principal.user_id,
                Entity::Waitlist,
                entry.id,
                Action::Leave,
                doc! { "session_id": session_id, "position": entry.position },
            )
            .await;
        Ok(())
    }

    /// Queue of the session, lowest position first.
    pub async fn entries(&self, session_id: ObjectId) -> Result<Vec<WaitlistEntry>, LedgerError> {
        Ok(self.store.find_by_session(session_id).await?)
    }

    pub async fn position_of(
        &self,
        session_id: ObjectId,
        student_id: ObjectId,
    ) -> Result<Option<u32>, LedgerError> {
        Ok(self
            .store
            .find(session_id, student_id)
            .await?
            .map(|entry| entry.position))
    }

    pub async fn find(
        &self,
        session_id: ObjectId,
        student_id: ObjectId,
    ) -> Result<Option<WaitlistEntry>, LedgerError> {
        Ok(self.store.find(session_id, student_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use model::errors::ErrorKind;

    use crate::test_utils::Fixture;

    #[tokio::test]
    async fn test_positions_are_never_reused() {
        let fx = Fixture::new().await;
        let mut session = fx.session().await;
        let class = fx.class_in(Duration::days(1), 1).await;
        let seated = fx.student(1).await;
        fx.book(&seated, class.id).await.unwrap();

        let a = fx.student(1).await;
        let b = fx.student(1).await;
        let c = fx.student(1).await;
        for student in [&a, &b] {
            fx.book(student, class.id).await.unwrap();
        }
        fx.ledger
            .waitlist
            .leave_waitlist(&mut session, &b, class.id)
            .await
            .unwrap();
        let outcome = fx.book(&c, class.id).await.unwrap();
        assert_eq!(outcome.waitlist_entry().unwrap().position, 3);

        let err = fx.book(&a, class.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);

        let positions: Vec<_> = fx
            .ledger
            .waitlist
            .entries(class.id)
            .await
            .unwrap()
            .into_iter()
            .map(|entry| (entry.student_id, entry.position))
            .collect();
        assert_eq!(positions, vec![(a.user_id, 1), (c.user_id, 3)]);
        assert_eq!(
            fx.ledger
                .waitlist
                .position_of(class.id, b.user_id)
                .await
                .unwrap(),
            None
        );

        let err = fx
            .ledger
            .waitlist
            .leave_waitlist(&mut session, &b, class.id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
