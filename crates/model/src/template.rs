use bson::oid::ObjectId;
use chrono::{DateTime, Datelike as _, Duration, Local, NaiveDate, NaiveTime, TimeZone as _, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::slot::Slot;

/// Weekly recurrence rule used to bulk-generate class sessions.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ScheduleTemplate {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub gym_id: ObjectId,
    pub professor_id: ObjectId,
    pub room_id: ObjectId,
    pub class_type_id: ObjectId,
    pub days_of_week: Vec<Weekday>,
    pub start_time: NaiveTime,
    pub duration_min: u32,
    pub capacity: u32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl ScheduleTemplate {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        gym_id: ObjectId,
        professor_id: ObjectId,
        room_id: ObjectId,
        class_type_id: ObjectId,
        days_of_week: Vec<Weekday>,
        start_time: NaiveTime,
        duration_min: u32,
        capacity: u32,
    ) -> Self {
        ScheduleTemplate {
            id: ObjectId::new(),
            gym_id,
            professor_id,
            room_id,
            class_type_id,
            days_of_week,
            start_time,
            duration_min,
            capacity,
            active: true,
            created_at: Utc::now(),
        }
    }

    pub fn validate(&self) -> Result<(), &'static str> {
        if self.days_of_week.is_empty() {
            return Err("template has no days of week");
        }
        if self.duration_min == 0 {
            return Err("template duration must be positive");
        }
        if self.capacity == 0 {
            return Err("template capacity must be positive");
        }
        Ok(())
    }

    /// Dates on or after `start_date` covered by `weeks` repetitions of the
    /// template's weekdays, in ascending order.
    pub fn occurrences(&self, start_date: NaiveDate, weeks: u32) -> Vec<NaiveDate> {
        let mut dates = Vec::with_capacity(self.days_of_week.len() * weeks as usize);
        for week in 0..weeks {
            let week_start = start_date + Duration::days(7 * week as i64);
            let from = week_start.weekday().num_days_from_monday() as i64;
            for day in &self.days_of_week {
                let offset = (day.num_days_from_monday() as i64 - from + 7) % 7;
                dates.push(week_start + Duration::days(offset));
            }
        }
        dates.sort();
        dates.dedup();
        dates
    }

    /// Window of the occurrence on `date`, in the server's local time zone.
    /// `None` when the start time does not exist on that date (DST gap).
    pub fn slot_on(&self, date: NaiveDate) -> Option<Slot> {
        let start_at = Local
            .from_local_datetime(&date.and_time(self.start_time))
            .earliest()?;
        Some(Slot::with_duration(
            start_at.with_timezone(&Utc),
            self.duration_min,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(days: Vec<Weekday>) -> ScheduleTemplate {
        ScheduleTemplate::new(
            ObjectId::new(),
            ObjectId::new(),
            ObjectId::new(),
            ObjectId::new(),
            days,
            NaiveTime::from_hms_opt(18, 30, 0).unwrap(),
            60,
            12,
        )
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_occurrences_from_monday() {
        let template = template(vec![Weekday::Wed, Weekday::Mon]);
        assert_eq!(
            template.occurrences(date(2024, 1, 1), 2),
            vec![
                date(2024, 1, 1),
                date(2024, 1, 3),
                date(2024, 1, 8),
                date(2024, 1, 10)
            ]
        );
    }

    #[test]
    fn test_occurrences_never_before_start() {
        let template = template(vec![Weekday::Mon, Weekday::Fri]);
        let dates = template.occurrences(date(2024, 1, 4), 2);
        assert_eq!(
            dates,
            vec![
                date(2024, 1, 5),
                date(2024, 1, 8),
                date(2024, 1, 12),
                date(2024, 1, 15)
            ]
        );
        assert!(dates.iter().all(|d| *d >= date(2024, 1, 4)));
    }

    #[test]
    fn test_duplicate_days_are_collapsed() {
        let template = template(vec![Weekday::Tue, Weekday::Tue]);
        assert_eq!(template.occurrences(date(2024, 1, 1), 1), vec![date(2024, 1, 2)]);
    }

    #[test]
    fn test_slot_uses_time_of_day_and_duration() {
        let template = template(vec![Weekday::Mon]);
        let slot = template.slot_on(date(2024, 1, 1)).unwrap();
        let local = slot.start_at.with_timezone(&Local);
        assert_eq!(local.time(), NaiveTime::from_hms_opt(18, 30, 0).unwrap());
        assert_eq!(slot.duration(), Duration::minutes(60));
    }

    #[test]
    fn test_validate() {
        assert!(template(vec![]).validate().is_err());
        let mut t = template(vec![Weekday::Mon]);
        assert!(t.validate().is_ok());
        t.capacity = 0;
        assert!(t.validate().is_err());
    }
}
