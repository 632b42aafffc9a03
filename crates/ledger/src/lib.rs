use std::sync::Arc;

use bson::oid::ObjectId;
use log::info;
use model::{
    class_session::ClassSession, errors::LedgerError, rights::Principal, session::Session,
};
use service::{
    bookings::Bookings,
    calendar::{Calendar, SessionPatch},
    history::{AuditSink, History},
    tokens::Tokens,
    users::Users,
    waitlist::Waitlist,
};
use storage::{session::Db, Storage};
use tx_macro::tx;

pub mod service;

#[cfg(test)]
mod test_utils;

#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Lifetime of the bonus grant minted by a transfer.
    pub transfer_expiry_days: u32,
    pub max_template_weeks: u32,
    pub default_currency: String,
    pub payment_provider: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig {
            transfer_expiry_days: 30,
            max_template_weeks: 52,
            default_currency: "ARS".to_string(),
            payment_provider: "mercadopago".to_string(),
        }
    }
}

#[derive(Clone)]
pub struct Ledger {
    pub db: Db,
    pub users: Users,
    pub tokens: Tokens,
    pub calendar: Calendar,
    pub waitlist: Waitlist,
    pub bookings: Bookings,
    pub history: History,
    pub config: LedgerConfig,
}

impl Ledger {
    pub fn new(storage: Storage, config: LedgerConfig) -> Self {
        let history = History::new(storage.history.clone());
        Ledger::build(storage, config, history)
    }

    pub fn with_audit_sink(
        storage: Storage,
        config: LedgerConfig,
        sink: Arc<dyn AuditSink>,
    ) -> Self {
        let history = History::with_sink(storage.history.clone(), sink);
        Ledger::build(storage, config, history)
    }

    fn build(storage: Storage, config: LedgerConfig, history: History) -> Self {
        let users = Users::new(storage.users, storage.memberships, history.clone());
        let tokens = Tokens::new(
            storage.wallets,
            storage.grants,
            storage.plans,
            storage.payments,
            users.clone(),
            history.clone(),
            config.clone(),
        );
        let calendar = Calendar::new(
            storage.calendar.clone(),
            storage.templates,
            storage.bookings.clone(),
            storage.waitlist.clone(),
            users.clone(),
            tokens.clone(),
            history.clone(),
            config.clone(),
        );
        let waitlist = Waitlist::new(storage.waitlist, storage.calendar.clone(), history.clone());
        let bookings = Bookings::new(
            storage.bookings,
            storage.calendar,
            users.clone(),
            tokens.clone(),
            waitlist.clone(),
            history.clone(),
        );
        Ledger {
            db: storage.db,
            users,
            tokens,
            calendar,
            waitlist,
            bookings,
            history,
            config,
        }
    }

    /// Changes a session's window, capacity or status. Extra capacity is
    /// offered to the waitlist right away.
    #[tx]
    pub async fn update_session(
        &self,
        session: &mut Session,
        principal: &Principal,
        session_id: ObjectId,
        patch: SessionPatch,
    ) -> Result<ClassSession, LedgerError> {
        let before = self.calendar.get_session(session_id).await?;
        let updated = self
            .calendar
            .apply_update(session, principal, session_id, patch)
            .await?;
        if updated.capacity > before.capacity {
            let promoted = self
                .bookings
                .promote_from_waitlist_inner(session, session_id)
                .await?;
            if !promoted.is_empty() {
                info!(
                    "Capacity of {} grew to {}, promoted {}",
                    session_id,
                    updated.capacity,
                    promoted.len()
                );
            }
        }
        Ok(updated)
    }
}
