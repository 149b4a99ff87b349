//! One physical notification instance: a single chain link of one alarm
//! occurrence.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::priority::PriorityTier;
use crate::alarm::{weekday_label, AlarmId};

const ONE_SHOT_LABEL: &str = "once";
const SNOOZE_SUFFIX: &str = "snooze";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledEvent {
    /// Stable identifier, see [`ScheduledEvent::identifier`].
    pub id: String,
    pub alarm_id: AlarmId,
    pub fire_date: DateTime<Utc>,
    /// Fire date of link 0, shared by every link of the same occurrence.
    pub occurrence: DateTime<Utc>,
    /// Repeat weekday of the occurrence (Sunday = 0); `None` for one-shot alarms.
    #[serde(default)]
    pub weekday: Option<u8>,
    pub chain_index: u32,
    pub priority: PriorityTier,
    #[serde(default)]
    pub is_registered: bool,
}

impl ScheduledEvent {
    pub fn new(
        alarm_id: AlarmId,
        weekday: Option<u8>,
        chain_index: u32,
        occurrence: DateTime<Utc>,
        fire_date: DateTime<Utc>,
        priority: PriorityTier,
    ) -> Self {
        Self {
            id: Self::identifier(&alarm_id, weekday, chain_index),
            alarm_id,
            fire_date,
            occurrence,
            weekday,
            chain_index,
            priority,
            is_registered: false,
        }
    }

    /// `{alarm_id}-{weekday|once}-{chain_index}`.
    ///
    /// Does not depend on the fire date, so expanding the same alarm twice
    /// yields the same identifiers and re-registration replaces in place.
    pub fn identifier(alarm_id: &AlarmId, weekday: Option<u8>, chain_index: u32) -> String {
        let day = weekday.map(weekday_label).unwrap_or(ONE_SHOT_LABEL);
        format!("{alarm_id}-{day}-{chain_index}")
    }

    /// Identifier of the one-shot snooze notification for an alarm.
    pub fn snooze_identifier(alarm_id: &AlarmId) -> String {
        format!("{alarm_id}-{SNOOZE_SUFFIX}")
    }

    pub fn is_chain_head(&self) -> bool {
        self.chain_index == 0
    }
}

/// Parsed form of a chain-link identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainIdentifier<'a> {
    pub alarm_id: &'a str,
    pub weekday: Option<u8>,
    pub chain_index: u32,
}

/// Split a chain-link identifier back into its parts.
///
/// Returns `None` for anything this engine did not generate as a chain
/// link (snooze notifications, foreign identifiers).
pub fn parse_chain_identifier(id: &str) -> Option<ChainIdentifier<'_>> {
    let mut parts = id.rsplitn(3, '-');
    let chain_index = parts.next()?.parse::<u32>().ok()?;
    let day = parts.next()?;
    let alarm_id = parts.next().filter(|s| !s.is_empty())?;
    let weekday = if day == ONE_SHOT_LABEL {
        None
    } else {
        Some((0u8..=6).find(|&d| weekday_label(d) == day)?)
    };
    Some(ChainIdentifier {
        alarm_id,
        weekday,
        chain_index,
    })
}

/// Whether `id` is a chain link or the snooze notification of `alarm_id`.
pub fn identifier_belongs_to(id: &str, alarm_id: &AlarmId) -> bool {
    if id == ScheduledEvent::snooze_identifier(alarm_id) {
        return true;
    }
    parse_chain_identifier(id).is_some_and(|parsed| parsed.alarm_id == alarm_id.as_str())
}

/// Total order by fire date; identifiers break ties.
pub fn by_fire_date(a: &ScheduledEvent, b: &ScheduledEvent) -> Ordering {
    a.fire_date
        .cmp(&b.fire_date)
        .then_with(|| a.id.cmp(&b.id))
}

/// Order used when competing for scarce slots: most urgent tier first,
/// then nearest fire date.
pub fn by_urgency(a: &ScheduledEvent, b: &ScheduledEvent) -> Ordering {
    b.priority
        .cmp(&a.priority)
        .then_with(|| by_fire_date(a, b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap() + Duration::seconds(secs)
    }

    #[test]
    fn identifiers_are_deterministic() {
        let id: AlarmId = "wake".into();
        assert_eq!(ScheduledEvent::identifier(&id, None, 3), "wake-once-3");
        assert_eq!(ScheduledEvent::identifier(&id, Some(1), 0), "wake-mon-0");

        let a = ScheduledEvent::new(id.clone(), Some(5), 2, at(0), at(10), PriorityTier::High);
        let b = ScheduledEvent::new(id, Some(5), 2, at(86400), at(86410), PriorityTier::Critical);
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn chain_identifiers_round_trip_through_parser() {
        let parsed = parse_chain_identifier("morning-run-sat-14").unwrap();
        assert_eq!(parsed.alarm_id, "morning-run");
        assert_eq!(parsed.weekday, Some(6));
        assert_eq!(parsed.chain_index, 14);

        let parsed = parse_chain_identifier("a-once-0").unwrap();
        assert_eq!(parsed.weekday, None);
    }

    #[test]
    fn non_chain_identifiers_are_rejected() {
        assert!(parse_chain_identifier("wake-snooze").is_none());
        assert!(parse_chain_identifier("wake-xyz-1").is_none());
        assert!(parse_chain_identifier("-once-1").is_none());
        assert!(parse_chain_identifier("garbage").is_none());
    }

    #[test]
    fn ownership_does_not_match_on_prefix() {
        let a: AlarmId = "a".into();
        assert!(identifier_belongs_to("a-once-0", &a));
        assert!(identifier_belongs_to("a-snooze", &a));
        assert!(!identifier_belongs_to("a-b-once-0", &a));
    }

    #[test]
    fn urgency_prefers_tier_then_fire_date() {
        let id: AlarmId = "x".into();
        let far_critical = ScheduledEvent::new(id.clone(), None, 1, at(0), at(100), PriorityTier::Critical);
        let near_critical = ScheduledEvent::new(id.clone(), None, 0, at(0), at(0), PriorityTier::Critical);
        let near_low = ScheduledEvent::new(id, Some(2), 0, at(-50), at(-50), PriorityTier::Low);

        let mut events = vec![near_low.clone(), far_critical.clone(), near_critical.clone()];
        events.sort_by(by_urgency);
        assert_eq!(events, vec![near_critical, far_critical, near_low]);
    }
}
