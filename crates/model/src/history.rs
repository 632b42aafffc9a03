use bson::{oid::ObjectId, Document};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Append-only audit record of a mutation.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HistoryRow {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub actor: ObjectId,
    pub entity: Entity,
    pub entity_id: ObjectId,
    pub action: Action,
    pub diff: Document,
    pub date_time: DateTime<Utc>,
}

impl HistoryRow {
    pub fn new(
        actor: ObjectId,
        entity: Entity,
        entity_id: ObjectId,
        action: Action,
        diff: Document,
    ) -> Self {
        HistoryRow {
            id: ObjectId::new(),
            actor,
            entity,
            entity_id,
            action,
            diff,
            date_time: Utc::now(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    User,
    Membership,
    TokenWallet,
    TokenGrant,
    PackagePlan,
    Payment,
    ClassSession,
    ScheduleTemplate,
    Booking,
    Waitlist,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Create,
    CreateFromTemplate,
    Duplicate,
    Update,
    Delete,
    Cancel,
    Consume,
    Refund,
    Transfer,
    Expire,
    CheckIn,
    NoShow,
    Enqueue,
    Promote,
    Leave,
}
