use bson::oid::ObjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::rights::Role;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub name: String,
    pub role: Role,
    #[serde(default = "default_is_active")]
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(name: String, role: Role) -> User {
        User {
            id: ObjectId::new(),
            name,
            role,
            is_active: true,
            created_at: Utc::now(),
        }
    }
}

fn default_is_active() -> bool {
    true
}

/// Role-scoped association of a user with a gym.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Membership {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub user_id: ObjectId,
    pub gym_id: ObjectId,
    pub role_in_gym: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Membership {
    pub fn new(user_id: ObjectId, gym_id: ObjectId, role_in_gym: Role) -> Membership {
        Membership {
            id: ObjectId::new(),
            user_id,
            gym_id,
            role_in_gym,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    pub fn is_staff(&self) -> bool {
        self.is_active && self.role_in_gym.is_staff()
    }
}
