use bson::{doc, oid::ObjectId};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc, Weekday};
use log::{info, warn};
use model::{
    booking::BookingStatus,
    class_session::{ClassSession, SessionFilter, SessionStatus},
    errors::LedgerError,
    history::{Action, Entity},
    rights::{Principal, Role, Rule},
    session::Session,
    slot::Slot,
    statistics::SessionStats,
    template::ScheduleTemplate,
};
use serde::{Deserialize, Serialize};
use storage::{
    booking::BookingStore, calendar::CalendarStore, template::TemplateStore,
    waitlist::WaitlistStore,
};
use tx_macro::tx;

use super::{history::History, tokens::Tokens, users::Users};
use crate::LedgerConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSession {
    pub gym_id: ObjectId,
    pub professor_id: ObjectId,
    pub room_id: ObjectId,
    pub class_type_id: ObjectId,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub capacity: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTemplate {
    pub gym_id: ObjectId,
    pub professor_id: ObjectId,
    pub room_id: ObjectId,
    pub class_type_id: ObjectId,
    pub days_of_week: Vec<Weekday>,
    pub start_time: NaiveTime,
    pub duration_min: u32,
    pub capacity: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionPatch {
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub capacity: Option<u32>,
    pub status: Option<SessionStatus>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerateReport {
    pub generated: u32,
    pub sessions: Vec<ClassSession>,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CancelSessionReport {
    pub cancelled_bookings: u32,
    pub refunded_tokens: u32,
    pub dropped_waitlist: u32,
}

#[derive(Clone)]
pub struct Calendar {
    calendar: CalendarStore,
    templates: TemplateStore,
    bookings: BookingStore,
    waitlist: WaitlistStore,
    users: Users,
    tokens: Tokens,
    logs: History,
    config: LedgerConfig,
}

impl Calendar {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        calendar: CalendarStore,
        templates: TemplateStore,
        bookings: BookingStore,
        waitlist: WaitlistStore,
        users: Users,
        tokens: Tokens,
        logs: History,
        config: LedgerConfig,
    ) -> Self {
        Calendar {
            calendar,
            templates,
            bookings,
            waitlist,
            users,
            tokens,
            logs,
            config,
        }
    }

    pub async fn get_session(&self, id: ObjectId) -> Result<ClassSession, LedgerError> {
        self.calendar
            .get(id)
            .await?
            .ok_or(LedgerError::SessionNotFound(id))
    }

    pub async fn get_sessions(&self, filter: &SessionFilter) -> Result<Vec<ClassSession>, LedgerError> {
        Ok(self.calendar.find(filter).await?)
    }

    pub async fn get_week_sessions(
        &self,
        gym_id: ObjectId,
        week_start: NaiveDate,
    ) -> Result<Vec<ClassSession>, LedgerError> {
        let filter = SessionFilter::week(gym_id, week_start)
            .ok_or_else(|| LedgerError::invalid_input(format!("Invalid week start {}", week_start)))?;
        self.get_sessions(&filter).await
    }

    pub async fn get_month_sessions(
        &self,
        gym_id: ObjectId,
        year: i32,
        month: u32,
    ) -> Result<Vec<ClassSession>, LedgerError> {
        let filter = SessionFilter::month(gym_id, year, month)
            .ok_or_else(|| LedgerError::invalid_input(format!("Invalid month {}-{}", year, month)))?;
        self.get_sessions(&filter).await
    }

    /// Staff check for schedule changes in a gym. Professors are provisioned
    /// into the gym first.
    async fn ensure_scheduler(
        &self,
        session: &mut Session,
        principal: &Principal,
        rule: Rule,
        gym_id: ObjectId,
    ) -> Result<(), LedgerError> {
        principal.ensure(rule)?;
        if principal.role == Role::Professor {
            self.users
                .ensure_professor_membership(session, principal.user_id, gym_id)
                .await?;
        }
        self.users.ensure_staff(principal.user_id, gym_id).await?;
        Ok(())
    }

    async fn ensure_room_free(
        &self,
        room_id: ObjectId,
        slot: &Slot,
        exclude: Option<ObjectId>,
    ) -> Result<(), LedgerError> {
        if let Some(existing) = self.calendar.find_conflict(room_id, slot, exclude).await? {
            warn!(
                "Room {} is taken by {} at {:?}",
                room_id,
                existing.id,
                existing.get_slot()
            );
            return Err(LedgerError::RoomConflict {
                room_id,
                existing: existing.id,
            });
        }
        Ok(())
    }

    #[tx]
    pub async fn create_session(
        &self,
        session: &mut Session,
        principal: &Principal,
        new: NewSession,
    ) -> Result<ClassSession, LedgerError> {
        let slot = Slot::new(new.start_at, new.end_at);
        if !slot.is_valid() {
            return Err(LedgerError::invalid_input("session must end after it starts"));
        }
        if new.capacity == 0 {
            return Err(LedgerError::invalid_input("capacity must be positive"));
        }
        self.ensure_scheduler(session, principal, Rule::ManageSessions, new.gym_id)
            .await?;
        self.ensure_room_free(new.room_id, &slot, None).await?;

        let class = ClassSession::new(
            new.gym_id,
            new.professor_id,
            new.room_id,
            new.class_type_id,
            slot,
            new.capacity,
        );
        self.calendar.insert(session, class.clone()).await?;
        self.logs
            .record(
                session,
                principal.user_id,
                Entity::ClassSession,
                class.id,
                Action::Create,
                session_diff(&class),
            )
            .await;
        Ok(class)
    }

    /// Copies a session to a new start time, keeping its duration.
    #[tx]
    pub async fn duplicate_session(
        &self,
        session: &mut Session,
        principal: &Principal,
        session_id: ObjectId,
        new_start: DateTime<Utc>,
    ) -> Result<ClassSession, LedgerError> {
        let source = self.get_session(session_id).await?;
        self.ensure_scheduler(session, principal, Rule::ManageSessions, source.gym_id)
            .await?;
        let slot = source.get_slot().shifted_to(new_start);
        self.ensure_room_free(source.room_id, &slot, None).await?;

        let class = ClassSession::new(
            source.gym_id,
            source.professor_id,
            source.room_id,
            source.class_type_id,
            slot,
            source.capacity,
        );
        self.calendar.insert(session, class.clone()).await?;
        let mut diff = session_diff(&class);
        diff.insert("source_id", source.id);
        self.logs
            .record(
                session,
                principal.user_id,
                Entity::ClassSession,
                class.id,
                Action::Duplicate,
                diff,
            )
            .await;
        Ok(class)
    }

    #[tx]
    pub async fn create_template(
        &self,
        session: &mut Session,
        principal: &Principal,
        new: NewTemplate,
    ) -> Result<ScheduleTemplate, LedgerError> {
        let mut days_of_week = new.days_of_week;
        days_of_week.sort_by_key(|day| day.num_days_from_monday());
        days_of_week.dedup();
        let template = ScheduleTemplate::new(
            new.gym_id,
            new.professor_id,
            new.room_id,
            new.class_type_id,
            days_of_week,
            new.start_time,
            new.duration_min,
            new.capacity,
        );
        template
            .validate()
            .map_err(|err| LedgerError::invalid_input(err))?;
        self.ensure_scheduler(session, principal, Rule::ManageTemplates, template.gym_id)
            .await?;

        self.templates.insert(session, template.clone()).await?;
        self.logs
            .record(
                session,
                principal.user_id,
                Entity::ScheduleTemplate,
                template.id,
                Action::Create,
                doc! {
                    "room_id": template.room_id,
                    "days_of_week": format!("{:?}", template.days_of_week),
                    "start_time": template.start_time.to_string(),
                    "duration_min": template.duration_min,
                    "capacity": template.capacity,
                },
            )
            .await;
        Ok(template)
    }

    #[tx]
    pub async fn set_template_active(
        &self,
        session: &mut Session,
        principal: &Principal,
        template_id: ObjectId,
        active: bool,
    ) -> Result<(), LedgerError> {
        let template = self.get_template(template_id).await?;
        self.ensure_scheduler(session, principal, Rule::ManageTemplates, template.gym_id)
            .await?;
        self.templates.set_active(session, template_id, active).await?;
        self.logs
            .record(
                session,
                principal.user_id,
                Entity::ScheduleTemplate,
                template_id,
                Action::Update,
                doc! { "active": active },
            )
            .await;
        Ok(())
    }

    pub async fn get_template(&self, id: ObjectId) -> Result<ScheduleTemplate, LedgerError> {
        self.templates
            .get(id)
            .await?
            .ok_or(LedgerError::TemplateNotFound(id))
    }

    pub async fn templates(&self, gym_id: ObjectId) -> Result<Vec<ScheduleTemplate>, LedgerError> {
        Ok(self.templates.find_by_gym(gym_id).await?)
    }

    /// Creates the template's sessions for `weeks` weeks from `start_date`.
    /// Occurrences that can not be scheduled are reported, not fatal.
    #[tx]
    pub async fn generate_from_template(
        &self,
        session: &mut Session,
        principal: &Principal,
        template_id: ObjectId,
        start_date: NaiveDate,
        weeks: u32,
    ) -> Result<GenerateReport, LedgerError> {
        let template = self.get_template(template_id).await?;
        if !template.active {
            return Err(LedgerError::TemplateInactive(template_id));
        }
        if weeks == 0 || weeks > self.config.max_template_weeks {
            return Err(LedgerError::invalid_input(format!(
                "weeks must be between 1 and {}",
                self.config.max_template_weeks
            )));
        }
        self.ensure_scheduler(session, principal, Rule::ManageTemplates, template.gym_id)
            .await?;

        let mut report = GenerateReport::default();
        for date in template.occurrences(start_date, weeks) {
            let Some(slot) = template.slot_on(date) else {
                report.errors.push(format!(
                    "{}: {} does not exist in local time",
                    date, template.start_time
                ));
                continue;
            };
            if let Some(existing) = self
                .calendar
                .find_conflict(template.room_id, &slot, None)
                .await?
            {
                report.errors.push(format!(
                    "{}: room is taken by session {} at {:?}",
                    date,
                    existing.id,
                    existing.get_slot()
                ));
                continue;
            }

            let mut class = ClassSession::new(
                template.gym_id,
                template.professor_id,
                template.room_id,
                template.class_type_id,
                slot,
                template.capacity,
            );
            class.template_id = Some(template.id);
            self.calendar.insert(session, class.clone()).await?;
            let mut diff = session_diff(&class);
            diff.insert("template_id", template.id);
            self.logs
                .record(
                    session,
                    principal.user_id,
                    Entity::ClassSession,
                    class.id,
                    Action::CreateFromTemplate,
                    diff,
                )
                .await;
            report.generated += 1;
            report.sessions.push(class);
        }

        info!(
            "Template {}: generated {} sessions, {} skipped",
            template_id,
            report.generated,
            report.errors.len()
        );
        Ok(report)
    }

    /// Applies a patch to a session. Callers promote the waitlist when the
    /// capacity grows.
    pub(crate) async fn apply_update(
        &self,
        session: &mut Session,
        principal: &Principal,
        session_id: ObjectId,
        patch: SessionPatch,
    ) -> Result<ClassSession, LedgerError> {
        let class = self.get_session(session_id).await?;
        self.ensure_scheduler(session, principal, Rule::ManageSessions, class.gym_id)
            .await?;
        if class.status.is_terminal() {
            return Err(LedgerError::InvalidTransition {
                session_id,
                from: class.status,
                to: patch.status.unwrap_or(class.status),
            });
        }

        let mut diff = doc! {};
        let slot = Slot::new(
            patch.start_at.unwrap_or(class.start_at),
            patch.end_at.unwrap_or(class.end_at),
        );
        if slot != class.get_slot() {
            if !slot.is_valid() {
                return Err(LedgerError::invalid_input("session must end after it starts"));
            }
            self.ensure_room_free(class.room_id, &slot, Some(session_id))
                .await?;
        }

        if let Some(capacity) = patch.capacity {
            if capacity == 0 {
                return Err(LedgerError::invalid_input("capacity must be positive"));
            }
            let booked = self.bookings.count_seats(session_id).await?;
            if capacity < booked {
                return Err(LedgerError::CapacityBelowBookings {
                    session_id,
                    capacity,
                    booked,
                });
            }
        }

        if let Some(status) = patch.status {
            if status != class.status
                && (status == SessionStatus::Cancelled || !class.status.can_transition_to(status))
            {
                return Err(LedgerError::InvalidTransition {
                    session_id,
                    from: class.status,
                    to: status,
                });
            }
        }

        if slot != class.get_slot() {
            self.calendar.set_slot(session, session_id, slot).await?;
            diff.insert("start_at", slot.start_at);
            diff.insert("end_at", slot.end_at);
        }
        if let Some(capacity) = patch.capacity.filter(|c| *c != class.capacity) {
            self.calendar
                .set_capacity(session, session_id, capacity)
                .await?;
            diff.insert("capacity", capacity);
        }
        if let Some(status) = patch.status.filter(|s| *s != class.status) {
            self.calendar.set_status(session, session_id, status).await?;
            diff.insert("status", format!("{:?}", status));
        }

        if !diff.is_empty() {
            self.logs
                .record(
                    session,
                    principal.user_id,
                    Entity::ClassSession,
                    session_id,
                    Action::Update,
                    diff,
                )
                .await;
        }
        self.get_session(session_id).await
    }

    /// Cancels the session, every seat held in it and its waitlist. Charged
    /// tokens are returned regardless of plan rules.
    #[tx]
    pub async fn cancel_session(
        &self,
        session: &mut Session,
        principal: &Principal,
        session_id: ObjectId,
        reason: Option<String>,
    ) -> Result<CancelSessionReport, LedgerError> {
        let class = self.get_session(session_id).await?;
        self.ensure_scheduler(session, principal, Rule::ManageSessions, class.gym_id)
            .await?;
        if !class.status.can_be_canceled() {
            return Err(LedgerError::InvalidTransition {
                session_id,
                from: class.status,
                to: SessionStatus::Cancelled,
            });
        }

        let reason = reason.unwrap_or_else(|| "session cancelled".to_string());
        let mut report = CancelSessionReport::default();
        for booking in self.bookings.find_by_session(session_id).await? {
            if !booking.holds_seat() {
                continue;
            }
            self.bookings
                .set_status(session, booking.id, BookingStatus::Cancelled)
                .await?;
            report.cancelled_bookings += 1;

            let mut refunded = 0;
            if let Some(wallet_id) = booking.wallet_id {
                let charged = self.bookings.take_charge(session, booking.id).await?;
                if charged > 0 {
                    self.tokens
                        .credit(session, principal.user_id, wallet_id, charged, &reason)
                        .await?;
                    refunded = charged;
                }
            }
            report.refunded_tokens += refunded;
            self.logs
                .record(
                    session,
                    principal.user_id,
                    Entity::Booking,
                    booking.id,
                    Action::Cancel,
                    doc! {
                        "session_id": session_id,
                        "student_id": booking.student_id,
                        "refunded": refunded,
                        "reason": reason.as_str(),
                    },
                )
                .await;
        }
        report.dropped_waitlist = self
            .waitlist
            .delete_by_session(session, session_id)
            .await?;
        self.calendar
            .set_status(session, session_id, SessionStatus::Cancelled)
            .await?;

        self.logs
            .record(
                session,
                principal.user_id,
                Entity::ClassSession,
                session_id,
                Action::Cancel,
                doc! {
                    "previous_status": format!("{:?}", class.status),
                    "cancelled_bookings": report.cancelled_bookings,
                    "refunded_tokens": report.refunded_tokens,
                    "dropped_waitlist": report.dropped_waitlist,
                    "reason": reason.as_str(),
                },
            )
            .await;
        Ok(report)
    }

    /// Removes a session that nobody holds a seat in. Professors may only
    /// delete their own sessions.
    #[tx]
    pub async fn delete_session(
        &self,
        session: &mut Session,
        principal: &Principal,
        session_id: ObjectId,
    ) -> Result<(), LedgerError> {
        let class = self.get_session(session_id).await?;
        self.ensure_scheduler(session, principal, Rule::ManageSessions, class.gym_id)
            .await?;
        if principal.role == Role::Professor && class.professor_id != principal.user_id {
            return Err(LedgerError::NotOwner {
                actor: principal.user_id,
                owner: class.professor_id,
            });
        }
        let active = self.bookings.count_seats(session_id).await?;
        if active > 0 {
            warn!("Session {} still has {} active bookings", session_id, active);
            return Err(LedgerError::SessionHasBookings { session_id, active });
        }

        let dropped = self
            .waitlist
            .delete_by_session(session, session_id)
            .await?;
        let removed = self.calendar.delete(session, session_id).await?;
        let mut diff = session_diff(&removed);
        diff.insert("status", format!("{:?}", removed.status));
        diff.insert("dropped_waitlist", dropped);
        self.logs
            .record(
                session,
                principal.user_id,
                Entity::ClassSession,
                session_id,
                Action::Delete,
                diff,
            )
            .await;
        Ok(())
    }

    pub async fn session_stats(
        &self,
        gym_id: ObjectId,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<SessionStats, LedgerError> {
        let mut stats = SessionStats::default();
        for class in self.calendar.find_range(gym_id, from, to).await? {
            let booked = self.bookings.count_seats(class.id).await?;
            stats.add(&class, booked);
        }
        Ok(stats)
    }
}

fn session_diff(class: &ClassSession) -> bson::Document {
    doc! {
        "gym_id": class.gym_id,
        "professor_id": class.professor_id,
        "room_id": class.room_id,
        "class_type_id": class.class_type_id,
        "start_at": class.start_at,
        "end_at": class.end_at,
        "capacity": class.capacity,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike as _, Duration, Local, NaiveTime, Utc, Weekday};
    use model::{
        booking::BookingStatus,
        class_session::SessionStatus,
        errors::ErrorKind,
        history::{Action, Entity},
        rights::{Principal, Role},
    };

    use super::{NewSession, NewTemplate, SessionPatch};
    use crate::test_utils::Fixture;

    #[tokio::test]
    async fn test_room_conflict_and_touching_windows() {
        let fx = Fixture::new().await;
        let mut session = fx.session().await;
        let start = Utc::now() + Duration::days(2);
        fx.class_between(start, start + Duration::hours(1), 10).await;

        let new = NewSession {
            gym_id: fx.gym,
            professor_id: fx.professor.user_id,
            room_id: fx.room,
            class_type_id: fx.class_type,
            start_at: start + Duration::minutes(30),
            end_at: start + Duration::minutes(90),
            capacity: 10,
        };
        let err = fx
            .ledger
            .calendar
            .create_session(&mut session, &fx.professor, new.clone())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let touching = fx
            .ledger
            .calendar
            .create_session(
                &mut session,
                &fx.professor,
                NewSession {
                    start_at: start + Duration::hours(1),
                    end_at: start + Duration::hours(2),
                    ..new.clone()
                },
            )
            .await
            .unwrap();
        assert_eq!(touching.status, SessionStatus::Scheduled);

        let other_room = fx
            .ledger
            .calendar
            .create_session(
                &mut session,
                &fx.professor,
                NewSession {
                    room_id: bson::oid::ObjectId::new(),
                    ..new
                },
            )
            .await;
        assert!(other_room.is_ok());
    }

    #[tokio::test]
    async fn test_create_session_validation() {
        let fx = Fixture::new().await;
        let mut session = fx.session().await;
        let start = Utc::now() + Duration::days(1);
        let new = NewSession {
            gym_id: fx.gym,
            professor_id: fx.professor.user_id,
            room_id: fx.room,
            class_type_id: fx.class_type,
            start_at: start,
            end_at: start,
            capacity: 10,
        };
        let err = fx
            .ledger
            .calendar
            .create_session(&mut session, &fx.professor, new.clone())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let err = fx
            .ledger
            .calendar
            .create_session(
                &mut session,
                &fx.professor,
                NewSession {
                    end_at: start + Duration::hours(1),
                    capacity: 0,
                    ..new.clone()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let student = fx.student(0).await;
        let err = fx
            .ledger
            .calendar
            .create_session(
                &mut session,
                &student,
                NewSession {
                    end_at: start + Duration::hours(1),
                    ..new
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }

    #[tokio::test]
    async fn test_professor_is_provisioned_into_gym() {
        let fx = Fixture::new().await;
        let mut session = fx.session().await;
        let user = fx
            .ledger
            .users
            .create_user(&mut session, "New Coach".to_string(), Role::Professor)
            .await
            .unwrap();
        let coach = Principal::new(user.id, Role::Professor);
        assert!(fx
            .ledger
            .users
            .active_membership(coach.user_id, fx.gym)
            .await
            .unwrap()
            .is_none());

        let start = Utc::now() + Duration::days(3);
        fx.ledger
            .calendar
            .create_session(
                &mut session,
                &coach,
                NewSession {
                    gym_id: fx.gym,
                    professor_id: coach.user_id,
                    room_id: fx.room,
                    class_type_id: fx.class_type,
                    start_at: start,
                    end_at: start + Duration::hours(1),
                    capacity: 8,
                },
            )
            .await
            .unwrap();
        let membership = fx
            .ledger
            .users
            .active_membership(coach.user_id, fx.gym)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(membership.role_in_gym, Role::Professor);
    }

    #[tokio::test]
    async fn test_template_generation_reports_conflicts() {
        let fx = Fixture::new().await;
        let mut session = fx.session().await;
        let mut start_date = Local::now().date_naive() + Duration::days(7);
        while start_date.weekday() != Weekday::Mon {
            start_date += Duration::days(1);
        }
        let template = fx
            .ledger
            .calendar
            .create_template(
                &mut session,
                &fx.professor,
                NewTemplate {
                    gym_id: fx.gym,
                    professor_id: fx.professor.user_id,
                    room_id: fx.room,
                    class_type_id: fx.class_type,
                    days_of_week: vec![Weekday::Mon, Weekday::Wed],
                    start_time: NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
                    duration_min: 60,
                    capacity: 12,
                },
            )
            .await
            .unwrap();

        // Block the second Wednesday.
        let blocked = template.slot_on(start_date + Duration::days(9)).unwrap();
        fx.class_between(blocked.start_at, blocked.end_at, 5).await;

        let report = fx
            .ledger
            .calendar
            .generate_from_template(&mut session, &fx.professor, template.id, start_date, 2)
            .await
            .unwrap();
        assert_eq!(report.generated, 3);
        assert_eq!(report.errors.len(), 1);
        assert!(report
            .sessions
            .iter()
            .all(|s| s.template_id == Some(template.id) && s.capacity == 12));
        assert!(report
            .sessions
            .windows(2)
            .all(|pair| pair[0].start_at < pair[1].start_at));

        let err = fx
            .ledger
            .calendar
            .generate_from_template(&mut session, &fx.professor, template.id, start_date, 53)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        fx.ledger
            .calendar
            .set_template_active(&mut session, &fx.professor, template.id, false)
            .await
            .unwrap();
        let err = fx
            .ledger
            .calendar
            .generate_from_template(&mut session, &fx.professor, template.id, start_date, 1)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[tokio::test]
    async fn test_capacity_cannot_drop_below_bookings() {
        let fx = Fixture::new().await;
        let mut session = fx.session().await;
        let class = fx.class_in(Duration::days(2), 3).await;
        for _ in 0..2 {
            let student = fx.student(1).await;
            fx.book(&student, class.id).await.unwrap();
        }

        let err = fx
            .ledger
            .update_session(
                &mut session,
                &fx.professor,
                class.id,
                SessionPatch {
                    capacity: Some(1),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);

        let updated = fx
            .ledger
            .update_session(
                &mut session,
                &fx.professor,
                class.id,
                SessionPatch {
                    capacity: Some(2),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.capacity, 2);
    }

    #[tokio::test]
    async fn test_status_transitions() {
        let fx = Fixture::new().await;
        let mut session = fx.session().await;
        let class = fx.class_in(Duration::days(1), 3).await;
        let patch = |status| SessionPatch {
            status: Some(status),
            ..Default::default()
        };

        let err = fx
            .ledger
            .update_session(&mut session, &fx.professor, class.id, patch(SessionStatus::Completed))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        let err = fx
            .ledger
            .update_session(&mut session, &fx.professor, class.id, patch(SessionStatus::Cancelled))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);

        fx.ledger
            .update_session(&mut session, &fx.professor, class.id, patch(SessionStatus::InProgress))
            .await
            .unwrap();
        let done = fx
            .ledger
            .update_session(&mut session, &fx.professor, class.id, patch(SessionStatus::Completed))
            .await
            .unwrap();
        assert_eq!(done.status, SessionStatus::Completed);

        let err = fx
            .ledger
            .update_session(
                &mut session,
                &fx.professor,
                class.id,
                SessionPatch {
                    capacity: Some(10),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[tokio::test]
    async fn test_cancel_session_refunds_everyone() {
        let fx = Fixture::new().await;
        let mut session = fx.session().await;
        let class = fx.class_in(Duration::hours(2), 2).await;
        let first = fx.student(1).await;
        let second = fx.student(1).await;
        let waiting = fx.student(1).await;
        fx.book(&first, class.id).await.unwrap();
        fx.book(&second, class.id).await.unwrap();
        let outcome = fx.book(&waiting, class.id).await.unwrap();
        assert!(outcome.waitlist_entry().is_some());

        let report = fx
            .ledger
            .calendar
            .cancel_session(&mut session, &fx.professor, class.id, None)
            .await
            .unwrap();
        assert_eq!(report.cancelled_bookings, 2);
        assert_eq!(report.refunded_tokens, 2);
        assert_eq!(report.dropped_waitlist, 1);
        assert_eq!(fx.balance(first.user_id).await, 1);
        assert_eq!(fx.balance(second.user_id).await, 1);
        assert_eq!(fx.balance(waiting.user_id).await, 1);

        let bookings = fx
            .ledger
            .bookings
            .get_session_bookings(&fx.professor, class.id)
            .await
            .unwrap();
        assert!(bookings
            .iter()
            .all(|b| b.status == BookingStatus::Cancelled && b.charged == 0));

        let err = fx
            .ledger
            .calendar
            .cancel_session(&mut session, &fx.professor, class.id, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[tokio::test]
    async fn test_duplicate_and_stats() {
        let fx = Fixture::new().await;
        let mut session = fx.session().await;
        let class = fx.class_in(Duration::days(1), 4).await;
        let copy = fx
            .ledger
            .calendar
            .duplicate_session(&mut session, &fx.professor, class.id, class.start_at + Duration::days(7))
            .await
            .unwrap();
        assert_eq!(copy.get_slot().duration(), class.get_slot().duration());
        assert_eq!(copy.capacity, 4);

        let student = fx.student(1).await;
        fx.book(&student, class.id).await.unwrap();

        let stats = fx
            .ledger
            .calendar
            .session_stats(fx.gym, None, None)
            .await
            .unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.total_capacity, 8);
        assert_eq!(stats.total_bookings, 1);
        assert!((stats.average_occupancy - 12.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_delete_session_requires_empty_roster_and_owner() {
        let fx = Fixture::new().await;
        let mut session = fx.session().await;
        let class = fx.class_in(Duration::days(2), 5).await;
        let student = fx.student(1).await;
        let booking = fx.book(&student, class.id).await.unwrap();
        let booking = booking.booking().unwrap().clone();

        let err = fx
            .ledger
            .calendar
            .delete_session(&mut session, &fx.professor, class.id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);

        let user = fx
            .ledger
            .users
            .create_user(&mut session, "Other Coach".to_string(), Role::Professor)
            .await
            .unwrap();
        let other = Principal::new(user.id, Role::Professor);
        let err = fx
            .ledger
            .calendar
            .delete_session(&mut session, &other, class.id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        fx.ledger
            .bookings
            .cancel_booking(&mut session, &student, booking.id, None)
            .await
            .unwrap();
        let err = fx
            .ledger
            .calendar
            .delete_session(&mut session, &other, class.id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        fx.ledger
            .calendar
            .delete_session(&mut session, &fx.professor, class.id)
            .await
            .unwrap();
        let err = fx.ledger.calendar.get_session(class.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let logs = fx
            .ledger
            .history
            .entity_logs(Entity::ClassSession, class.id)
            .await
            .unwrap();
        assert_eq!(logs.last().unwrap().action, Action::Delete);

        let err = fx
            .ledger
            .calendar
            .delete_session(&mut session, &fx.admin, class.id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_week_and_month_sessions() {
        let fx = Fixture::new().await;
        let class = fx.class_in(Duration::days(2), 5).await;
        let day = class.start_at.with_timezone(&Local).date_naive();

        let week = fx
            .ledger
            .calendar
            .get_week_sessions(fx.gym, day)
            .await
            .unwrap();
        assert_eq!(week.len(), 1);
        assert_eq!(week[0].id, class.id);

        let next_week = fx
            .ledger
            .calendar
            .get_week_sessions(fx.gym, day + Duration::days(1))
            .await
            .unwrap();
        assert!(next_week.is_empty());

        let month = fx
            .ledger
            .calendar
            .get_month_sessions(fx.gym, day.year(), day.month())
            .await
            .unwrap();
        assert_eq!(month.len(), 1);

        let other_gym = fx
            .ledger
            .calendar
            .get_month_sessions(bson::oid::ObjectId::new(), day.year(), day.month())
            .await
            .unwrap();
        assert!(other_gym.is_empty());

        let err = fx
            .ledger
            .calendar
            .get_month_sessions(fx.gym, day.year(), 0)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }
}
