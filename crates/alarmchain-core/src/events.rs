use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::alarm::AlarmId;
use crate::gateway::SchedulerKind;
use crate::playback::{StrategyKind, Visibility};

/// Every alarm lifecycle transition produces an AlarmEvent.
/// Callers that get `None` back know the call was a no-op.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AlarmEvent {
    AlarmFired {
        alarm_id: AlarmId,
        scheduled_time: DateTime<Utc>,
        strategy: StrategyKind,
        /// Alarm that was ringing and got replaced by this one.
        superseded: Option<AlarmId>,
        at: DateTime<Utc>,
    },
    /// Visibility changed while ringing and playback moved to another strategy.
    StrategySwitched {
        alarm_id: AlarmId,
        from: Option<StrategyKind>,
        to: StrategyKind,
        visibility: Visibility,
        at: DateTime<Utc>,
    },
    /// Registrations of an alarm were withdrawn outside of a ringing alarm
    /// (alarm deleted or disabled).
    ChainCancelled {
        alarm_id: AlarmId,
        withdrawn: usize,
        at: DateTime<Utc>,
    },
    AlarmDismissed {
        alarm_id: AlarmId,
        at: DateTime<Utc>,
    },
    MissionCompleted {
        alarm_id: AlarmId,
        at: DateTime<Utc>,
    },
    AlarmSnoozed {
        alarm_id: AlarmId,
        minutes: u32,
        fire_date: DateTime<Utc>,
        backend: SchedulerKind,
        at: DateTime<Utc>,
    },
}

impl AlarmEvent {
    pub fn alarm_id(&self) -> &AlarmId {
        match self {
            AlarmEvent::AlarmFired { alarm_id, .. }
            | AlarmEvent::StrategySwitched { alarm_id, .. }
            | AlarmEvent::ChainCancelled { alarm_id, .. }
            | AlarmEvent::AlarmDismissed { alarm_id, .. }
            | AlarmEvent::MissionCompleted { alarm_id, .. }
            | AlarmEvent::AlarmSnoozed { alarm_id, .. } => alarm_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_tagged_by_type() {
        let event = AlarmEvent::AlarmDismissed {
            alarm_id: "a".into(),
            at: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "AlarmDismissed");
        assert_eq!(json["alarm_id"], "a");

        let back: AlarmEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back.alarm_id().as_str(), "a");
    }
}
