use bson::{doc, oid::ObjectId};
use chrono::{DateTime, Utc};
use log::{info, warn};
use model::{
    booking::{
        Booking, BookingFilter, BookingOutcome, BookingStatus, CancelOutcome, CheckInMethod,
    },
    class_session::{ClassSession, SessionStatus},
    errors::{ErrorKind, LedgerError},
    history::{Action, Entity},
    rights::{Principal, Rule},
    session::Session,
    statistics::BookingStats,
};
use serde::{Deserialize, Serialize};
use storage::{booking::BookingStore, calendar::CalendarStore};
use tx_macro::tx;

use super::{history::History, tokens::Tokens, users::Users, waitlist::Waitlist};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingRequest {
    pub session_id: ObjectId,
    pub student_id: ObjectId,
    /// Grant to attribute the booking to instead of the oldest usable one.
    #[serde(default)]
    pub grant_id: Option<ObjectId>,
}

impl BookingRequest {
    pub fn new(session_id: ObjectId, student_id: ObjectId) -> Self {
        BookingRequest {
            session_id,
            student_id,
            grant_id: None,
        }
    }
}

#[derive(Clone)]
pub struct Bookings {
    store: BookingStore,
    calendar: CalendarStore,
    users: Users,
    tokens: Tokens,
    waitlist: Waitlist,
    logs: History,
}

impl Bookings {
    pub(crate) fn new(
        store: BookingStore,
        calendar: CalendarStore,
        users: Users,
        tokens: Tokens,
        waitlist: Waitlist,
        logs: History,
    ) -> Self {
        Bookings {
            store,
            calendar,
            users,
            tokens,
            waitlist,
            logs,
        }
    }

    async fn get_class(&self, session_id: ObjectId) -> Result<ClassSession, LedgerError> {
        self.calendar
            .get(session_id)
            .await?
            .ok_or(LedgerError::SessionNotFound(session_id))
    }

    pub async fn get_booking(&self, booking_id: ObjectId) -> Result<Booking, LedgerError> {
        self.store
            .get(booking_id)
            .await?
            .ok_or(LedgerError::BookingNotFound(booking_id))
    }

    /// Reserves a seat or, when the session is full, queues the student.
    #[tx]
    pub async fn create_booking(
        &self,
        session: &mut Session,
        principal: &Principal,
        request: BookingRequest,
    ) -> Result<BookingOutcome, LedgerError> {
        if !principal.is(request.student_id) {
            return Err(LedgerError::NotOwner {
                actor: principal.user_id,
                owner: request.student_id,
            });
        }
        let class = self.get_class(request.session_id).await?;
        if !class.status.can_sign_in() {
            return Err(LedgerError::SessionNotOpen {
                session_id: class.id,
                status: class.status,
            });
        }
        if self
            .store
            .find_live(class.id, request.student_id)
            .await?
            .is_some()
        {
            return Err(LedgerError::AlreadyBooked {
                session_id: class.id,
                student_id: request.student_id,
            });
        }

        let booked = self.store.count_seats(class.id).await?;
        if booked >= class.capacity {
            let entry = self
                .waitlist
                .enqueue(session, &class, request.student_id)
                .await?;
            info!(
                "Session {} is full, {} waits at {}",
                class.id, request.student_id, entry.position
            );
            return Ok(BookingOutcome::Waitlisted {
                waitlist_entry: entry,
            });
        }

        let booking = self
            .book_seat(session, &class, request.student_id, request.grant_id)
            .await?;
        Ok(BookingOutcome::Booked { booking })
    }

    /// Charges one token and writes the reservation. Seat availability is
    /// checked by the caller in the same transaction.
    async fn book_seat(
        &self,
        session: &mut Session,
        class: &ClassSession,
        student_id: ObjectId,
        grant_id: Option<ObjectId>,
    ) -> Result<Booking, LedgerError> {
        let wallet = self
            .tokens
            .get_wallet(student_id, class.gym_id)
            .await?
            .ok_or(LedgerError::WalletNotFound {
                user_id: student_id,
                gym_id: class.gym_id,
            })?;
        if !wallet.can_debit(1) {
            return Err(LedgerError::InsufficientBalance {
                wallet_id: wallet.id,
                balance: wallet.balance,
                required: 1,
            });
        }

        let now = Utc::now();
        let grant = match grant_id {
            Some(grant_id) => {
                let grant = self
                    .tokens
                    .get_grant(grant_id)
                    .await?
                    .filter(|grant| grant.wallet_id == wallet.id)
                    .ok_or(LedgerError::GrantNotFound(grant_id))?;
                if grant.swept || grant.is_expired(now) {
                    return Err(LedgerError::GrantExpired(grant_id));
                }
                grant
            }
            None => {
                let Some(grant) = self.tokens.select_grant(wallet.id, now).await? else {
                    warn!(
                        "Wallet {} has {} tokens but no usable grant",
                        wallet.id, wallet.balance
                    );
                    return Err(LedgerError::NoUsableGrant {
                        wallet_id: wallet.id,
                    });
                };
                grant
            }
        };

        self.tokens
            .debit(
                session,
                student_id,
                wallet.id,
                1,
                &format!("booking {}", class.id),
            )
            .await?;
        let booking = Booking::reserved(class.id, student_id, wallet.id, Some(grant.id));
        self.store.insert(session, booking.clone()).await?;

        if let Some(entry) = self.waitlist.find(class.id, student_id).await? {
            self.waitlist.remove(session, &entry).await?;
        }

        self.logs
            .record(
                session,
                student_id,
                Entity::Booking,
                booking.id,
                Action::Create,
                doc! {
                    "session_id": class.id,
                    "wallet_id": wallet.id,
                    "grant_id": booking.grant_id,
                    "charged": booking.charged,
                },
            )
            .await;
        Ok(booking)
    }

    #[tx]
    pub async fn cancel_booking(
        &self,
        session: &mut Session,
        principal: &Principal,
        booking_id: ObjectId,
        reason: Option<String>,
    ) -> Result<CancelOutcome, LedgerError> {
        let booking = self.get_booking(booking_id).await?;
        if !principal.is(booking.student_id) {
            return Err(LedgerError::NotOwner {
                actor: principal.user_id,
                owner: booking.student_id,
            });
        }
        if booking.status != BookingStatus::Reserved {
            return Err(LedgerError::WrongBookingStatus {
                booking_id,
                status: booking.status,
                expected: BookingStatus::Reserved,
            });
        }
        let class = self.get_class(booking.session_id).await?;

        let eligible = self.can_refund(&booking, &class, Utc::now()).await?;
        let mut cancelled = self
            .store
            .set_status(session, booking_id, BookingStatus::Cancelled)
            .await?;

        let mut refunded = 0;
        if eligible {
            if let Some(wallet_id) = booking.wallet_id {
                let charged = self.store.take_charge(session, booking_id).await?;
                if charged > 0 {
                    let reason = reason
                        .clone()
                        .unwrap_or_else(|| format!("cancel booking {}", booking_id));
                    self.tokens
                        .credit(session, principal.user_id, wallet_id, charged, &reason)
                        .await?;
                    refunded = charged;
                }
                cancelled.charged = 0;
            }
        }

        self.logs
            .record(
                session,
                principal.user_id,
                Entity::Booking,
                booking_id,
                Action::Cancel,
                doc! {
                    "session_id": class.id,
                    "refund_eligible": eligible,
                    "refunded": refunded,
                    "reason": reason,
                },
            )
            .await;

        let promoted = self.promote_from_waitlist_inner(session, class.id).await?;
        Ok(CancelOutcome {
            booking: cancelled,
            refunded: refunded > 0,
            promoted,
        })
    }

    /// Whether cancelling now returns the booking's token. Only bookings paid
    /// from a plan grant are refundable, within the plan's cancellation window.
    pub async fn can_refund(
        &self,
        booking: &Booking,
        class: &ClassSession,
        now: DateTime<Utc>,
    ) -> Result<bool, LedgerError> {
        let Some(grant_id) = booking.grant_id else {
            return Ok(false);
        };
        let Some(plan_id) = self
            .tokens
            .get_grant(grant_id)
            .await?
            .and_then(|grant| grant.plan_id)
        else {
            return Ok(false);
        };
        let Some(plan) = self.tokens.get_plan(plan_id).await? else {
            return Ok(false);
        };
        Ok(plan.rules.allows_refund(class.start_at, now))
    }

    /// Seats free places with queued students in position order. A student
    /// that can not be booked keeps their place and the next one is tried.
    #[tx]
    pub async fn promote_from_waitlist(
        &self,
        session: &mut Session,
        session_id: ObjectId,
    ) -> Result<Vec<Booking>, LedgerError> {
        let class = self.get_class(session_id).await?;
        if class.status != SessionStatus::Scheduled {
            return Ok(vec![]);
        }
        let booked = self.store.count_seats(session_id).await?;
        let mut free = class.free_seats(booked);
        let mut promoted = vec![];
        if free == 0 {
            return Ok(promoted);
        }

        for entry in self.waitlist.entries(session_id).await? {
            if free == 0 {
                break;
            }
            if self
                .store
                .find_live(session_id, entry.student_id)
                .await?
                .is_some()
            {
                self.waitlist.remove(session, &entry).await?;
                continue;
            }

            let savepoint = session.savepoint();
            match self.book_seat(session, &class, entry.student_id, None).await {
                Ok(booking) => {
                    info!(
                        "Promoted {} from position {} in {}",
                        entry.student_id, entry.position, session_id
                    );
                    self.logs
                        .record(
                            session,
                            entry.student_id,
                            Entity::Waitlist,
                            entry.id,
                            Action::Promote,
                            doc! {
                                "session_id": session_id,
                                "position": entry.position,
                                "booking_id": booking.id,
                            },
                        )
                        .await;
                    promoted.push(booking);
                    free -= 1;
                }
                Err(err) if err.kind() == ErrorKind::Internal => return Err(err),
                Err(err) => {
                    session.rollback_to(savepoint);
                    warn!(
                        "Skipping {} at position {} in {}: {}",
                        entry.student_id, entry.position, session_id, err
                    );
                }
            }
        }
        Ok(promoted)
    }

    async fn ensure_attendance_staff(
        &self,
        principal: &Principal,
        class: &ClassSession,
    ) -> Result<(), LedgerError> {
        principal.ensure(Rule::CheckIn)?;
        self.users.ensure_staff(principal.user_id, class.gym_id).await?;
        Ok(())
    }

    #[tx]
    pub async fn check_in(
        &self,
        session: &mut Session,
        principal: &Principal,
        session_id: ObjectId,
        student_id: ObjectId,
        method: CheckInMethod,
    ) -> Result<Booking, LedgerError> {
        let class = self.get_class(session_id).await?;
        if !principal.is(student_id) {
            self.ensure_attendance_staff(principal, &class).await?;
        }
        let booking = self
            .store
            .find_live(session_id, student_id)
            .await?
            .ok_or(LedgerError::NoBooking {
                session_id,
                student_id,
            })?;
        if booking.status != BookingStatus::Reserved {
            return Err(LedgerError::WrongBookingStatus {
                booking_id: booking.id,
                status: booking.status,
                expected: BookingStatus::Reserved,
            });
        }

        let booking = self
            .store
            .set_status(session, booking.id, BookingStatus::Attended)
            .await?;
        self.logs
            .record(
                session,
                principal.user_id,
                Entity::Booking,
                booking.id,
                Action::CheckIn,
                doc! {
                    "session_id": session_id,
                    "student_id": student_id,
                    "method": format!("{:?}", method),
                },
            )
            .await;
        Ok(booking)
    }

    /// Marks an attendee as absent. The token is kept.
    #[tx]
    pub async fn mark_no_show(
        &self,
        session: &mut Session,
        principal: &Principal,
        session_id: ObjectId,
        student_id: ObjectId,
    ) -> Result<Booking, LedgerError> {
        let class = self.get_class(session_id).await?;
        self.ensure_attendance_staff(principal, &class).await?;
        let booking = self
            .store
            .find_live(session_id, student_id)
            .await?
            .ok_or(LedgerError::NoBooking {
                session_id,
                student_id,
            })?;
        if booking.status != BookingStatus::Attended {
            return Err(LedgerError::WrongBookingStatus {
                booking_id: booking.id,
                status: booking.status,
                expected: BookingStatus::Attended,
            });
        }

        let booking = self
            .store
            .set_status(session, booking.id, BookingStatus::NoShow)
            .await?;
        self.logs
            .record(
                session,
                principal.user_id,
                Entity::Booking,
                booking.id,
                Action::NoShow,
                doc! { "session_id": session_id, "student_id": student_id },
            )
            .await;
        Ok(booking)
    }

    /// Bookings of the student ordered by session start.
    pub async fn get_user_bookings(
        &self,
        student_id: ObjectId,
        filter: &BookingFilter,
    ) -> Result<Vec<Booking>, LedgerError> {
        let mut rows = Vec::new();
        for booking in self.store.find_by_student(student_id).await? {
            if filter.status.map_or(false, |status| booking.status != status) {
                continue;
            }
            let Some(class) = self.calendar.get(booking.session_id).await? else {
                continue;
            };
            if filter.gym_id.map_or(false, |gym| class.gym_id != gym)
                || filter.from.map_or(false, |from| class.start_at < from)
                || filter.to.map_or(false, |to| class.start_at > to)
            {
                continue;
            }
            rows.push((class.start_at, booking));
        }
        rows.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.created_at.cmp(&b.1.created_at)));
        Ok(rows.into_iter().map(|(_, booking)| booking).collect())
    }

    /// Roster of a session, oldest booking first.
    pub async fn get_session_bookings(
        &self,
        principal: &Principal,
        session_id: ObjectId,
    ) -> Result<Vec<Booking>, LedgerError> {
        let class = self.get_class(session_id).await?;
        principal.ensure(Rule::ViewSessionBookings)?;
        self.users.ensure_staff(principal.user_id, class.gym_id).await?;
        Ok(self.store.find_by_session(session_id).await?)
    }

    pub async fn booking_stats(
        &self,
        gym_id: ObjectId,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<BookingStats, LedgerError> {
        let mut stats = BookingStats::default();
        for class in self.calendar.find_range(gym_id, from, to).await? {
            for booking in self.store.find_by_session(class.id).await? {
                stats.add(&booking);
            }
        }
        Ok(stats)
    }
}
