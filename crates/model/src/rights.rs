use bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use strum::{EnumIter, IntoEnumIterator as _};

use crate::errors::LedgerError;

#[derive(EnumIter, Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Professor,
    Student,
}

impl Role {
    pub fn is_staff(&self) -> bool {
        matches!(self, Role::Admin | Role::Professor)
    }

    pub fn has_rule(&self, rule: Rule) -> bool {
        rule.roles().contains(self)
    }

    pub fn ensure(&self, rule: Rule) -> Result<(), LedgerError> {
        if !self.has_rule(rule) {
            return Err(LedgerError::RuleNotAllowed { role: *self, rule });
        }
        Ok(())
    }

    pub fn rules(&self) -> Vec<Rule> {
        Rule::iter().filter(|rule| self.has_rule(*rule)).collect()
    }
}

#[derive(EnumIter, Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    // Tokens
    AssignTokens,
    ManagePlans,

    // Calendar
    ManageSessions,
    ManageTemplates,

    // Attendance
    CheckIn,
    ViewSessionBookings,

    // Gym
    ManageMemberships,
}

const ADMIN: &[Role] = &[Role::Admin];
const STAFF: &[Role] = &[Role::Admin, Role::Professor];

impl Rule {
    /// Roles allowed to perform the action.
    pub fn roles(&self) -> &'static [Role] {
        match self {
            Rule::AssignTokens
            | Rule::ManageSessions
            | Rule::ManageTemplates
            | Rule::CheckIn
            | Rule::ViewSessionBookings => STAFF,
            Rule::ManagePlans | Rule::ManageMemberships => ADMIN,
        }
    }
}

/// Authenticated caller, supplied by the transport layer.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub user_id: ObjectId,
    pub role: Role,
}

impl Principal {
    pub fn new(user_id: ObjectId, role: Role) -> Self {
        Principal { user_id, role }
    }

    pub fn ensure(&self, rule: Rule) -> Result<(), LedgerError> {
        self.role.ensure(rule)
    }

    pub fn is(&self, user_id: ObjectId) -> bool {
        self.user_id == user_id
    }
}
