use bson::oid::ObjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WaitlistEntry {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub session_id: ObjectId,
    pub student_id: ObjectId,
    pub position: u32,
    pub created_at: DateTime<Utc>,
}

impl WaitlistEntry {
    pub fn new(session_id: ObjectId, student_id: ObjectId, position: u32) -> Self {
        WaitlistEntry {
            id: ObjectId::new(),
            session_id,
            student_id,
            position,
            created_at: Utc::now(),
        }
    }
}
