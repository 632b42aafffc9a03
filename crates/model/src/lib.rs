pub mod booking;
pub mod class_session;
pub mod errors;
pub mod history;
pub mod payment;
pub mod plan;
pub mod rights;
pub mod session;
pub mod slot;
pub mod statistics;
pub mod template;
pub mod token;
pub mod user;
pub mod waitlist;
