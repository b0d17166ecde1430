// src/config/schedule.rs
//! Wall-clock schedules for sync jobs, in UTC.
//!
//! Text form: `"HH:MM"` runs daily, `"<weekday> HH:MM"` runs weekly
//! (`"sun 04:00"`, `"Sunday 04:00"`).

use chrono::{DateTime, Datelike, Duration, NaiveTime, TimeZone, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Schedule {
    pub hour_utc: u32,
    pub minute: u32,
    pub weekday: Option<Weekday>,
}

impl Schedule {
    pub fn daily(hour_utc: u32, minute: u32) -> Self {
        Self {
            hour_utc,
            minute,
            weekday: None,
        }
    }

    pub fn weekly(weekday: Weekday, hour_utc: u32, minute: u32) -> Self {
        Self {
            hour_utc,
            minute,
            weekday: Some(weekday),
        }
    }

    /// First scheduled instant strictly after `now`.
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let time = NaiveTime::from_hms_opt(self.hour_utc, self.minute, 0).unwrap_or(NaiveTime::MIN);
        let mut day = now.date_naive();
        // At most one week of candidates; the eighth day always qualifies.
        for _ in 0..8 {
            let candidate = Utc.from_utc_datetime(&day.and_time(time));
            let weekday_ok = self.weekday.map_or(true, |w| candidate.weekday() == w);
            if weekday_ok && candidate > now {
                return candidate;
            }
            day += Duration::days(1);
        }
        Utc.from_utc_datetime(&day.and_time(time))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleParseError(pub String);

impl fmt::Display for ScheduleParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid schedule {:?} (expected \"HH:MM\" or \"<weekday> HH:MM\")", self.0)
    }
}

impl std::error::Error for ScheduleParseError {}

impl FromStr for Schedule {
    type Err = ScheduleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ScheduleParseError(s.to_string());
        let parts: Vec<&str> = s.split_whitespace().collect();
        let (weekday, clock) = match parts.as_slice() {
            [clock] => (None, *clock),
            [day, clock] => (Some(day.parse::<Weekday>().map_err(|_| err())?), *clock),
            _ => return Err(err()),
        };
        let (h, m) = clock.split_once(':').ok_or_else(err)?;
        let hour_utc: u32 = h.parse().map_err(|_| err())?;
        let minute: u32 = m.parse().map_err(|_| err())?;
        if hour_utc > 23 || minute > 59 {
            return Err(err());
        }
        Ok(Self {
            hour_utc,
            minute,
            weekday,
        })
    }
}

impl TryFrom<String> for Schedule {
    type Error = ScheduleParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Schedule> for String {
    fn from(s: Schedule) -> String {
        s.to_string()
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(w) = self.weekday {
            write!(f, "{} ", w.to_string().to_lowercase())?;
        }
        write!(f, "{:02}:{:02}", self.hour_utc, self.minute)
    }
}
