pub mod bookings;
pub mod calendar;
pub mod history;
pub mod tokens;
pub mod users;
pub mod waitlist;
