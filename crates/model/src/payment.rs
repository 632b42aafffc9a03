use bson::oid::ObjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Payment {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub user_id: ObjectId,
    pub gym_id: ObjectId,
    pub plan_id: ObjectId,
    pub amount_minor: u64,
    pub currency: String,
    pub provider: String,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Completed,
}

impl Payment {
    pub fn pending(
        user_id: ObjectId,
        gym_id: ObjectId,
        plan_id: ObjectId,
        amount_minor: u64,
        currency: String,
        provider: String,
    ) -> Payment {
        Payment {
            id: ObjectId::new(),
            user_id,
            gym_id,
            plan_id,
            amount_minor,
            currency,
            provider,
            status: PaymentStatus::Pending,
            created_at: Utc::now(),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == PaymentStatus::Pending
    }
}
