use bson::oid::ObjectId;
use chrono::{DateTime, Duration, Local, NaiveDate, NaiveTime, TimeZone as _, Utc};
use serde::{Deserialize, Serialize};
use strum::EnumIter;

use crate::slot::Slot;

/// One scheduled occurrence of a class.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[non_exhaustive]
pub struct ClassSession {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub gym_id: ObjectId,
    pub professor_id: ObjectId,
    pub room_id: ObjectId,
    pub class_type_id: ObjectId,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub capacity: u32,
    pub status: SessionStatus,
    /// Last waitlist position handed out. Positions are never reused.
    #[serde(default)]
    pub waitlist_seq: u32,
    #[serde(default)]
    pub template_id: Option<ObjectId>,
    #[serde(default)]
    pub version: u64,
}

impl ClassSession {
    pub fn new(
        gym_id: ObjectId,
        professor_id: ObjectId,
        room_id: ObjectId,
        class_type_id: ObjectId,
        slot: Slot,
        capacity: u32,
    ) -> ClassSession {
        ClassSession {
            id: ObjectId::new(),
            gym_id,
            professor_id,
            room_id,
            class_type_id,
            start_at: slot.start_at,
            end_at: slot.end_at,
            capacity,
            status: SessionStatus::Scheduled,
            waitlist_seq: 0,
            template_id: None,
            version: 0,
        }
    }

    pub fn get_slot(&self) -> Slot {
        Slot::new(self.start_at, self.end_at)
    }

    /// Whether this session keeps its room busy.
    pub fn occupies_room(&self) -> bool {
        self.status.occupies_room()
    }

    pub fn collides_with(&self, room_id: ObjectId, slot: &Slot) -> bool {
        self.room_id == room_id && self.occupies_room() && self.get_slot().has_conflict(slot)
    }

    pub fn free_seats(&self, booked: u32) -> u32 {
        self.capacity.saturating_sub(booked)
    }
}

/// Session query. Unset fields match everything; `from` and `to` bound the
/// start time inclusively.
#[derive(Debug, Default, Serialize, Deserialize, Clone)]
pub struct SessionFilter {
    pub gym_id: Option<ObjectId>,
    pub professor_id: Option<ObjectId>,
    pub class_type_id: Option<ObjectId>,
    pub room_id: Option<ObjectId>,
    pub status: Option<SessionStatus>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl SessionFilter {
    pub fn gym(gym_id: ObjectId) -> Self {
        SessionFilter {
            gym_id: Some(gym_id),
            ..Default::default()
        }
    }

    /// Sessions of the gym starting in the seven local days from `week_start`.
    pub fn week(gym_id: ObjectId, week_start: NaiveDate) -> Option<Self> {
        let week_end = week_start.checked_add_signed(Duration::days(7))?;
        Self::local_days(gym_id, week_start, week_end)
    }

    /// Sessions of the gym starting in the given local calendar month.
    pub fn month(gym_id: ObjectId, year: i32, month: u32) -> Option<Self> {
        let first = NaiveDate::from_ymd_opt(year, month, 1)?;
        let next = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)?
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)?
        };
        Self::local_days(gym_id, first, next)
    }

    /// Local days `[from, until)`; `to` stops just short of `until` midnight.
    fn local_days(gym_id: ObjectId, from: NaiveDate, until: NaiveDate) -> Option<Self> {
        let from = local_midnight(from)?;
        let until = local_midnight(until)?;
        Some(SessionFilter {
            gym_id: Some(gym_id),
            from: Some(from),
            to: Some(until - Duration::nanoseconds(1)),
            ..Default::default()
        })
    }

    pub fn matches(&self, session: &ClassSession) -> bool {
        self.gym_id.map_or(true, |id| session.gym_id == id)
            && self.professor_id.map_or(true, |id| session.professor_id == id)
            && self.class_type_id.map_or(true, |id| session.class_type_id == id)
            && self.room_id.map_or(true, |id| session.room_id == id)
            && self.status.map_or(true, |status| session.status == status)
            && self.from.map_or(true, |from| session.start_at >= from)
            && self.to.map_or(true, |to| session.start_at <= to)
    }
}

fn local_midnight(date: NaiveDate) -> Option<DateTime<Utc>> {
    Local
        .from_local_datetime(&date.and_time(NaiveTime::MIN))
        .earliest()
        .map(|at| at.with_timezone(&Utc))
}

#[derive(EnumIter, Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
}

impl SessionStatus {
    pub fn occupies_room(&self) -> bool {
        matches!(self, SessionStatus::Scheduled | SessionStatus::InProgress)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Cancelled)
    }

    pub fn can_sign_in(&self) -> bool {
        matches!(self, SessionStatus::Scheduled)
    }

    pub fn can_be_canceled(&self) -> bool {
        matches!(self, SessionStatus::Scheduled | SessionStatus::InProgress)
    }

    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        matches!(
            (self, next),
            (SessionStatus::Scheduled, SessionStatus::InProgress)
                | (SessionStatus::InProgress, SessionStatus::Completed)
                | (SessionStatus::Scheduled, SessionStatus::Cancelled)
                | (SessionStatus::InProgress, SessionStatus::Cancelled)
        )
    }
}
