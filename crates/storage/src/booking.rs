use bson::oid::ObjectId;
use chrono::Utc;
use eyre::{eyre, Result};
use log::info;
use model::{
    booking::{Booking, BookingStatus},
    session::Session,
};

use crate::collection::{Collection, Record};

impl Record for Booking {
    fn id(&self) -> ObjectId {
        self.id
    }
}

#[derive(Clone)]
pub struct BookingStore {
    store: Collection<Booking>,
}

impl BookingStore {
    pub(crate) fn new() -> Self {
        BookingStore {
            store: Collection::new("bookings"),
        }
    }

    pub async fn insert(&self, session: &mut Session, booking: Booking) -> Result<()> {
        info!(
            "Insert booking: {} session {} student {}",
            booking.id, booking.session_id, booking.student_id
        );
        if let Some(live) = self.find_live(booking.session_id, booking.student_id).await? {
            return Err(eyre!(
                "Student {} already holds booking {} in {}",
                booking.student_id,
                live.id,
                booking.session_id
            ));
        }
        self.store.insert(session, booking)
    }

    pub async fn get(&self, id: ObjectId) -> Result<Option<Booking>> {
        Ok(self.store.get(id))
    }

    /// The booking of the student in the session that is not cancelled.
    pub async fn find_live(
        &self,
        session_id: ObjectId,
        student_id: ObjectId,
    ) -> Result<Option<Booking>> {
        Ok(self
            .store
            .find_one(|b| b.session_id == session_id && b.student_id == student_id && b.is_live()))
    }

    /// Number of bookings that occupy a seat of the session.
    pub async fn count_seats(&self, session_id: ObjectId) -> Result<u32> {
        Ok(self
            .store
            .count(|b| b.session_id == session_id && b.holds_seat()) as u32)
    }

    /// Bookings of the session, oldest first.
    pub async fn find_by_session(&self, session_id: ObjectId) -> Result<Vec<Booking>> {
        let mut bookings = self.store.find(|b| b.session_id == session_id);
        bookings.sort_by_key(|b| (b.created_at, b.id));
        Ok(bookings)
    }

    pub async fn find_by_student(&self, student_id: ObjectId) -> Result<Vec<Booking>> {
        Ok(self.store.find(|b| b.student_id == student_id))
    }

    pub async fn set_status(
        &self,
        session: &mut Session,
        id: ObjectId,
        status: BookingStatus,
    ) -> Result<Booking> {
        info!("Set booking {} status: {:?}", id, status);
        self.store
            .update(session, id, |booking| {
                booking.status = status;
                booking.updated_at = Utc::now();
            })?
            .ok_or_else(|| eyre!("Booking not found: {}", id))
    }

    /// Zeroes the refundable charge of the booking and returns what it was.
    pub async fn take_charge(&self, session: &mut Session, id: ObjectId) -> Result<u32> {
        let mut charged = 0;
        self.store
            .update(session, id, |booking| {
                charged = booking.charged;
                booking.charged = 0;
                booking.updated_at = Utc::now();
            })?
            .ok_or_else(|| eyre!("Booking not found: {}", id))?;
        info!("Take charge of booking {}: {}", id, charged);
        Ok(charged)
    }
}
