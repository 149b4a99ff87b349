//! Alarm model as seen by the engine.
//!
//! Alarms are owned by the surrounding application. The engine only reads
//! them: the hour/minute/repeat set are turned into concrete occurrences,
//! which are the sole time input to chain expansion.

mod store;

pub use store::{AlarmStore, MemoryAlarmStore};

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ScheduleError;

/// Opaque alarm identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlarmId(String);

impl AlarmId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AlarmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AlarmId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for AlarmId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Reference to a user-recorded alarm sound.
///
/// Only the encoded size is known to the engine; playback length is
/// estimated from it (see [`crate::queue::ChainIntervalCalculator`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioRef {
    pub name: String,
    pub byte_size: u64,
}

impl AudioRef {
    pub fn new(name: impl Into<String>, byte_size: u64) -> Self {
        Self {
            name: name.into(),
            byte_size,
        }
    }
}

/// A user alarm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alarm {
    pub id: AlarmId,
    #[serde(default)]
    pub label: String,
    pub hour: u32,
    pub minute: u32,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Repeat weekdays, Sunday = 0 .. Saturday = 6. Empty means one-shot.
    #[serde(default)]
    pub repeat_days: BTreeSet<u8>,
    #[serde(default)]
    pub audio: Option<AudioRef>,
    #[serde(default)]
    pub snooze_minutes: Option<u32>,
}

fn default_true() -> bool {
    true
}

/// One concrete future firing of an alarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occurrence {
    /// Repeat weekday this occurrence belongs to; `None` for one-shot alarms.
    pub weekday: Option<u8>,
    pub fire_date: DateTime<Utc>,
}

impl Alarm {
    pub fn new(id: impl Into<AlarmId>, hour: u32, minute: u32) -> Self {
        Self {
            id: id.into(),
            label: String::new(),
            hour,
            minute,
            enabled: true,
            repeat_days: BTreeSet::new(),
            audio: None,
            snooze_minutes: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_repeat(mut self, days: impl IntoIterator<Item = u8>) -> Self {
        self.repeat_days = days.into_iter().collect();
        self
    }

    pub fn with_audio(mut self, audio: AudioRef) -> Self {
        self.audio = Some(audio);
        self
    }

    pub fn with_snooze(mut self, minutes: u32) -> Self {
        self.snooze_minutes = Some(minutes);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn is_repeating(&self) -> bool {
        !self.repeat_days.is_empty()
    }

    /// Title shown in notifications and the alarm UI.
    pub fn title(&self) -> String {
        if self.label.is_empty() {
            format!("Alarm {:02}:{:02}", self.hour, self.minute)
        } else {
            self.label.clone()
        }
    }

    /// Check hour, minute and repeat days.
    pub fn validate(&self) -> Result<(), ScheduleError> {
        if self.hour > 23 || self.minute > 59 {
            return Err(ScheduleError::InvalidTime {
                hour: self.hour,
                minute: self.minute,
            });
        }
        if let Some(&bad) = self.repeat_days.iter().find(|&&d| d > 6) {
            return Err(ScheduleError::InvalidWeekday(bad));
        }
        Ok(())
    }

    /// Next instant strictly after `now` at which this alarm fires.
    pub fn next_fire_date(
        &self,
        now: DateTime<Utc>,
        offset: FixedOffset,
    ) -> Result<DateTime<Utc>, ScheduleError> {
        self.occurrences(now, offset)?
            .into_iter()
            .map(|o| o.fire_date)
            .min()
            .ok_or(ScheduleError::Unrepresentable {
                hour: self.hour,
                minute: self.minute,
                after: now,
            })
    }

    /// Next occurrence for each repeat weekday, or the single next
    /// occurrence of a one-shot alarm. Sorted by fire date.
    pub fn occurrences(
        &self,
        now: DateTime<Utc>,
        offset: FixedOffset,
    ) -> Result<Vec<Occurrence>, ScheduleError> {
        self.validate()?;
        let time = NaiveTime::from_hms_opt(self.hour, self.minute, 0).ok_or(
            ScheduleError::InvalidTime {
                hour: self.hour,
                minute: self.minute,
            },
        )?;
        let local_today = now.with_timezone(&offset).date_naive();

        let mut out = Vec::new();
        if self.repeat_days.is_empty() {
            let mut fire = self.at_local(local_today, time, offset, now)?;
            if fire <= now {
                fire += Duration::days(1);
            }
            out.push(Occurrence {
                weekday: None,
                fire_date: fire,
            });
        } else {
            let today = local_today.weekday().num_days_from_sunday() as i64;
            for &day in &self.repeat_days {
                let ahead = (i64::from(day) - today).rem_euclid(7);
                let date = local_today + Duration::days(ahead);
                let mut fire = self.at_local(date, time, offset, now)?;
                if fire <= now {
                    fire += Duration::days(7);
                }
                out.push(Occurrence {
                    weekday: Some(day),
                    fire_date: fire,
                });
            }
        }
        out.sort_by_key(|o| o.fire_date);
        Ok(out)
    }

    fn at_local(
        &self,
        date: chrono::NaiveDate,
        time: NaiveTime,
        offset: FixedOffset,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, ScheduleError> {
        offset
            .from_local_datetime(&date.and_time(time))
            .single()
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or(ScheduleError::Unrepresentable {
                hour: self.hour,
                minute: self.minute,
                after: now,
            })
    }
}

/// Short label used in event identifiers.
pub fn weekday_label(day: u8) -> &'static str {
    match day {
        0 => "sun",
        1 => "mon",
        2 => "tue",
        3 => "wed",
        4 => "thu",
        5 => "fri",
        6 => "sat",
        _ => "invalid",
    }
}
