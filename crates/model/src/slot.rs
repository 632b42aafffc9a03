use std::fmt::Debug;

use chrono::{DateTime, Duration, Local, Utc};
use serde::{Deserialize, Serialize};

/// Half-open time window `[start_at, end_at)`.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
}

impl Slot {
    pub fn new(start_at: DateTime<Utc>, end_at: DateTime<Utc>) -> Slot {
        Slot { start_at, end_at }
    }

    pub fn with_duration(start_at: DateTime<Utc>, duration_min: u32) -> Slot {
        Slot::new(start_at, start_at + Duration::minutes(duration_min as i64))
    }

    pub fn is_valid(&self) -> bool {
        self.end_at > self.start_at
    }

    pub fn duration(&self) -> Duration {
        self.end_at - self.start_at
    }

    pub fn in_slot(&self, time: DateTime<Utc>) -> bool {
        time >= self.start_at && time < self.end_at
    }

    /// Touching windows (`a.end == b.start`) do not conflict.
    pub fn has_conflict(&self, other: &Slot) -> bool {
        self.start_at < other.end_at && self.end_at > other.start_at
    }

    pub fn shifted_to(&self, start_at: DateTime<Utc>) -> Slot {
        Slot::new(start_at, start_at + self.duration())
    }
}

impl Debug for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let start_at = self.start_at.with_timezone(&Local);
        let end_at = self.end_at.with_timezone(&Local);
        let fmt = "%H:%M";
        write!(
            f,
            "[({}):{}<->{}]",
            start_at.format("%d.%m"),
            start_at.format(fmt),
            end_at.format(fmt)
        )
    }
}
