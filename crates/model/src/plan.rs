use bson::oid::ObjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Token package sold by a gym. Its rules travel with every grant minted from it.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PackagePlan {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub gym_id: ObjectId,
    pub name: String,
    pub tokens: u32,
    pub validity_days: u32,
    pub price_minor: u64,
    #[serde(default)]
    pub rules: PlanRules,
    pub is_active: bool,
}

impl PackagePlan {
    pub fn new(
        gym_id: ObjectId,
        name: String,
        tokens: u32,
        validity_days: u32,
        price_minor: u64,
        rules: PlanRules,
    ) -> Self {
        PackagePlan {
            id: ObjectId::new(),
            gym_id,
            name,
            tokens,
            validity_days,
            price_minor,
            rules,
            is_active: true,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct PlanRules {
    pub cancel_before_hours: Option<u32>,
    #[serde(default)]
    pub no_show_penalty: bool,
    #[serde(default)]
    pub transferable: bool,
}

impl PlanRules {
    /// Refund is denied when the cancellation comes later than
    /// `cancel_before_hours` before the session start.
    pub fn allows_refund(&self, session_start: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match self.cancel_before_hours {
            Some(hours) if hours > 0 => {
                let hours_until = (session_start - now).num_milliseconds() as f64 / 3_600_000.0;
                hours_until >= hours as f64
            }
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone as _};

    use super::*;

    fn rules(hours: Option<u32>) -> PlanRules {
        PlanRules {
            cancel_before_hours: hours,
            ..Default::default()
        }
    }

    #[test]
    fn test_refund_gating() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).single().unwrap();
        let rules = rules(Some(24));
        assert!(!rules.allows_refund(now + Duration::hours(23), now));
        assert!(rules.allows_refund(now + Duration::hours(25), now));
        assert!(rules.allows_refund(now + Duration::hours(24), now));
        assert!(!rules.allows_refund(now + Duration::hours(24) - Duration::seconds(1), now));
    }

    #[test]
    fn test_no_rule_always_refunds() {
        let now = Utc::now();
        assert!(rules(None).allows_refund(now + Duration::minutes(5), now));
        assert!(rules(Some(0)).allows_refund(now - Duration::minutes(5), now));
    }
}
