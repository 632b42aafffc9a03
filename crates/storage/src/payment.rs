use bson::oid::ObjectId;
use eyre::{eyre, Result};
use log::info;
use model::{
    payment::{Payment, PaymentStatus},
    session::Session,
};

use crate::collection::{Collection, Record};

impl Record for Payment {
    fn id(&self) -> ObjectId {
        self.id
    }
}

#[derive(Clone)]
pub struct PaymentStore {
    store: Collection<Payment>,
}

impl PaymentStore {
    pub(crate) fn new() -> Self {
        PaymentStore {
            store: Collection::new("payments"),
        }
    }

    pub async fn insert(&self, session: &mut Session, payment: Payment) -> Result<()> {
        info!(
            "Insert payment: {} user {} plan {} {} {}",
            payment.id, payment.user_id, payment.plan_id, payment.amount_minor, payment.currency
        );
        self.store.insert(session, payment)
    }

    pub async fn get(&self, id: ObjectId) -> Result<Option<Payment>> {
        Ok(self.store.get(id))
    }

    pub async fn find_by_user(&self, user_id: ObjectId) -> Result<Vec<Payment>> {
        let mut payments = self.store.find(|p| p.user_id == user_id);
        payments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(payments)
    }

    pub async fn set_status(
        &self,
        session: &mut Session,
        id: ObjectId,
        status: PaymentStatus,
    ) -> Result<()> {
        info!("Set payment {} status: {:?}", id, status);
        self.store
            .update(session, id, |payment| payment.status = status)?
            .ok_or_else(|| eyre!("Payment not found: {}", id))?;
        Ok(())
    }
}
