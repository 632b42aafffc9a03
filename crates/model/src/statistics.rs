use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{
    booking::{Booking, BookingStatus},
    class_session::{ClassSession, SessionStatus},
};

#[derive(Debug, Default, Serialize, Deserialize, Clone)]
pub struct SessionStats {
    pub total: u32,
    pub by_status: HashMap<SessionStatus, u32>,
    pub by_class_type: HashMap<String, u32>,
    pub by_professor: HashMap<String, u32>,
    pub total_capacity: u32,
    pub total_bookings: u32,
    /// Booked seats over capacity, in percent.
    pub average_occupancy: f64,
}

impl SessionStats {
    pub fn add(&mut self, session: &ClassSession, booked: u32) {
        self.total += 1;
        *self.by_status.entry(session.status).or_default() += 1;
        *self.by_class_type.entry(session.class_type_id.to_hex()).or_default() += 1;
        *self.by_professor.entry(session.professor_id.to_hex()).or_default() += 1;
        self.total_capacity += session.capacity;
        self.total_bookings += booked;
        if self.total_capacity > 0 {
            self.average_occupancy =
                self.total_bookings as f64 / self.total_capacity as f64 * 100.0;
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize, Clone)]
pub struct BookingStats {
    pub by_status: HashMap<BookingStatus, u32>,
}

impl BookingStats {
    pub fn add(&mut self, booking: &Booking) {
        *self.by_status.entry(booking.status).or_default() += 1;
    }

    pub fn count(&self, status: BookingStatus) -> u32 {
        self.by_status.get(&status).copied().unwrap_or_default()
    }
}
