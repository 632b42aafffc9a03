use bson::oid::ObjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::EnumIter;

use crate::waitlist::WaitlistEntry;

/// A student's claim on one seat of one session.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Booking {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub session_id: ObjectId,
    pub student_id: ObjectId,
    pub status: BookingStatus,
    pub grant_id: Option<ObjectId>,
    pub wallet_id: Option<ObjectId>,
    /// Tokens debited for this booking that have not been refunded yet.
    #[serde(default)]
    pub charged: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn reserved(
        session_id: ObjectId,
        student_id: ObjectId,
        wallet_id: ObjectId,
        grant_id: Option<ObjectId>,
    ) -> Booking {
        let now = Utc::now();
        Booking {
            id: ObjectId::new(),
            session_id,
            student_id,
            status: BookingStatus::Reserved,
            grant_id,
            wallet_id: Some(wallet_id),
            charged: 1,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn holds_seat(&self) -> bool {
        self.status.holds_seat()
    }

    pub fn is_live(&self) -> bool {
        self.status != BookingStatus::Cancelled
    }
}

#[derive(EnumIter, Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Reserved,
    Cancelled,
    Attended,
    NoShow,
}

impl BookingStatus {
    pub fn holds_seat(&self) -> bool {
        matches!(self, BookingStatus::Reserved | BookingStatus::Attended)
    }
}

/// Filter over a student's bookings. Dates bound the session start.
#[derive(Debug, Default, Serialize, Deserialize, Clone)]
pub struct BookingFilter {
    pub status: Option<BookingStatus>,
    pub gym_id: Option<ObjectId>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CheckInMethod {
    #[default]
    Manual,
    Qr,
}

/// Result of a booking request. Callers must branch on the kind.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BookingOutcome {
    Booked { booking: Booking },
    Waitlisted { waitlist_entry: WaitlistEntry },
}

impl BookingOutcome {
    pub fn booking(&self) -> Option<&Booking> {
        match self {
            BookingOutcome::Booked { booking } => Some(booking),
            BookingOutcome::Waitlisted { .. } => None,
        }
    }

    pub fn waitlist_entry(&self) -> Option<&WaitlistEntry> {
        match self {
            BookingOutcome::Booked { .. } => None,
            BookingOutcome::Waitlisted { waitlist_entry } => Some(waitlist_entry),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CancelOutcome {
    pub booking: Booking,
    pub refunded: bool,
    pub promoted: Vec<Booking>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_is_tagged() {
        let booking = Booking::reserved(ObjectId::new(), ObjectId::new(), ObjectId::new(), None);
        let json = serde_json::to_value(BookingOutcome::Booked { booking }).unwrap();
        assert_eq!(json["kind"], "booked");
        assert_eq!(json["booking"]["status"], "RESERVED");

        let entry = WaitlistEntry::new(ObjectId::new(), ObjectId::new(), 3);
        let json = serde_json::to_value(BookingOutcome::Waitlisted {
            waitlist_entry: entry,
        })
        .unwrap();
        assert_eq!(json["kind"], "waitlisted");
        assert_eq!(json["waitlist_entry"]["position"], 3);
    }

    #[test]
    fn test_seat_holding_statuses() {
        assert!(BookingStatus::Reserved.holds_seat());
        assert!(BookingStatus::Attended.holds_seat());
        assert!(!BookingStatus::NoShow.holds_seat());
        assert!(!BookingStatus::Cancelled.holds_seat());
    }
}
