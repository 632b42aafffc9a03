use bson::oid::ObjectId;
use thiserror::Error;

use crate::{
    booking::BookingStatus,
    class_session::SessionStatus,
    rights::{Role, Rule},
};

/// Coarse classification of [`LedgerError`], stable for callers that map
/// errors onto a transport (HTTP status, exit code...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Forbidden,
    NotFound,
    InvalidState,
    Conflict,
    AlreadyExists,
    InsufficientBalance,
    InvalidInput,
    Internal,
}

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Common error: {0}")]
    Eyre(#[from] eyre::Error),

    // Forbidden
    #[error("Role {role:?} is not allowed to {rule:?}")]
    RuleNotAllowed { role: Role, rule: Rule },
    #[error("User {user_id} has no active membership in gym {gym_id}")]
    NotMember { user_id: ObjectId, gym_id: ObjectId },
    #[error("User {user_id} has no staff membership in gym {gym_id}")]
    NotStaff { user_id: ObjectId, gym_id: ObjectId },
    #[error("User {actor} can not act on behalf of {owner}")]
    NotOwner { actor: ObjectId, owner: ObjectId },

    // NotFound
    #[error("User not found: {0}")]
    UserNotFound(ObjectId),
    #[error("Wallet not found: user {user_id}, gym {gym_id}")]
    WalletNotFound { user_id: ObjectId, gym_id: ObjectId },
    #[error("Wallet not found: {0}")]
    WalletIdNotFound(ObjectId),
    #[error("Token grant not found: {0}")]
    GrantNotFound(ObjectId),
    #[error("Plan not found or inactive: {0}")]
    PlanNotFound(ObjectId),
    #[error("Payment not found: {0}")]
    PaymentNotFound(ObjectId),
    #[error("Session not found: {0}")]
    SessionNotFound(ObjectId),
    #[error("Schedule template not found: {0}")]
    TemplateNotFound(ObjectId),
    #[error("Booking not found: {0}")]
    BookingNotFound(ObjectId),
    #[error("No booking of {student_id} in session {session_id}")]
    NoBooking {
        session_id: ObjectId,
        student_id: ObjectId,
    },
    #[error("{student_id} is not on the waitlist of session {session_id}")]
    NotWaitlisted {
        session_id: ObjectId,
        student_id: ObjectId,
    },

    // InvalidState
    #[error("Session {session_id} is {status:?} and does not accept bookings")]
    SessionNotOpen {
        session_id: ObjectId,
        status: SessionStatus,
    },
    #[error("Session {session_id} can not go from {from:?} to {to:?}")]
    InvalidTransition {
        session_id: ObjectId,
        from: SessionStatus,
        to: SessionStatus,
    },
    #[error("Capacity {capacity} of session {session_id} is below {booked} booked seats")]
    CapacityBelowBookings {
        session_id: ObjectId,
        capacity: u32,
        booked: u32,
    },
    #[error("Booking {booking_id} is {status:?}, expected {expected:?}")]
    WrongBookingStatus {
        booking_id: ObjectId,
        status: BookingStatus,
        expected: BookingStatus,
    },
    #[error("Schedule template is inactive: {0}")]
    TemplateInactive(ObjectId),
    #[error("Token grant expired: {0}")]
    GrantExpired(ObjectId),
    #[error("Payment already processed: {0}")]
    PaymentAlreadyProcessed(ObjectId),
    #[error("Session {session_id} still has {active} active bookings")]
    SessionHasBookings { session_id: ObjectId, active: u32 },

    // Conflict
    #[error("Room {room_id} is taken by session {existing}")]
    RoomConflict { room_id: ObjectId, existing: ObjectId },

    // AlreadyExists
    #[error("{student_id} already booked session {session_id}")]
    AlreadyBooked {
        session_id: ObjectId,
        student_id: ObjectId,
    },
    #[error("{student_id} is already waiting for session {session_id}")]
    AlreadyWaitlisted {
        session_id: ObjectId,
        student_id: ObjectId,
    },
    #[error("Membership already exists: user {user_id}, gym {gym_id}")]
    MembershipExists { user_id: ObjectId, gym_id: ObjectId },

    // InsufficientBalance
    #[error("Not enough tokens in wallet {wallet_id}: {balance} < {required}")]
    InsufficientBalance {
        wallet_id: ObjectId,
        balance: u32,
        required: u32,
    },
    #[error("Wallet {wallet_id} has no unexpired tokens")]
    NoUsableGrant { wallet_id: ObjectId },

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::Eyre(_) => ErrorKind::Internal,
            LedgerError::RuleNotAllowed { .. }
            | LedgerError::NotMember { .. }
            | LedgerError::NotStaff { .. }
            | LedgerError::NotOwner { .. } => ErrorKind::Forbidden,
            LedgerError::UserNotFound(_)
            | LedgerError::WalletNotFound { .. }
            | LedgerError::WalletIdNotFound(_)
            | LedgerError::GrantNotFound(_)
            | LedgerError::PlanNotFound(_)
            | LedgerError::PaymentNotFound(_)
            | LedgerError::SessionNotFound(_)
            | LedgerError::TemplateNotFound(_)
            | LedgerError::BookingNotFound(_)
            | LedgerError::NoBooking { .. }
            | LedgerError::NotWaitlisted { .. } => ErrorKind::NotFound,
            LedgerError::SessionNotOpen { .. }
            | LedgerError::InvalidTransition { .. }
            | LedgerError::CapacityBelowBookings { .. }
            | LedgerError::WrongBookingStatus { .. }
            | LedgerError::TemplateInactive(_)
            | LedgerError::GrantExpired(_)
            | LedgerError::PaymentAlreadyProcessed(_)
            | LedgerError::SessionHasBookings { .. } => ErrorKind::InvalidState,
            LedgerError::RoomConflict { .. } => ErrorKind::Conflict,
            LedgerError::AlreadyBooked { .. }
            | LedgerError::AlreadyWaitlisted { .. }
            | LedgerError::MembershipExists { .. } => ErrorKind::AlreadyExists,
            LedgerError::InsufficientBalance { .. } | LedgerError::NoUsableGrant { .. } => {
                ErrorKind::InsufficientBalance
            }
            LedgerError::InvalidInput(_) => ErrorKind::InvalidInput,
        }
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        LedgerError::InvalidInput(msg.into())
    }
}
