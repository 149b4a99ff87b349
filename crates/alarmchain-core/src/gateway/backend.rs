//! Scheduler backend selection.
//!
//! Some platforms offer a system-managed alarm facility that rings on its
//! own; everywhere else alarms are delivered as chain notifications. The
//! backend is probed once when the engine is built and never re-checked.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::NotificationScheduler;
use crate::alarm::{AlarmId, AudioRef};
use crate::error::GatewayError;
use crate::queue::ScheduledEvent;

/// Platform-managed alarm service.
#[async_trait]
pub trait ManagedAlarmService: Send + Sync {
    /// Capability probe, consulted once at startup.
    fn is_available(&self) -> bool;

    async fn schedule(
        &self,
        alarm_id: &AlarmId,
        fire_date: DateTime<Utc>,
        title: &str,
    ) -> Result<(), GatewayError>;

    async fn cancel(&self, alarm_id: &AlarmId) -> Result<(), GatewayError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerKind {
    Notification,
    Managed,
}

/// The scheduler capability, one of two backends.
#[derive(Clone)]
pub enum AlarmScheduler {
    Notification(Arc<NotificationScheduler>),
    Managed(Arc<dyn ManagedAlarmService>),
}

impl fmt::Debug for AlarmScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AlarmScheduler").field(&self.kind()).finish()
    }
}

impl AlarmScheduler {
    /// Prefer the managed backend when one is present and reports itself usable.
    pub fn probe(
        notifications: Arc<NotificationScheduler>,
        managed: Option<Arc<dyn ManagedAlarmService>>,
    ) -> Self {
        let scheduler = match managed {
            Some(service) if service.is_available() => AlarmScheduler::Managed(service),
            _ => AlarmScheduler::Notification(notifications),
        };
        info!(backend = ?scheduler.kind(), "selected alarm scheduler backend");
        scheduler
    }

    pub fn kind(&self) -> SchedulerKind {
        match self {
            AlarmScheduler::Notification(_) => SchedulerKind::Notification,
            AlarmScheduler::Managed(_) => SchedulerKind::Managed,
        }
    }

    /// Register a one-shot occurrence of `alarm_id` at `fire_date`.
    pub async fn schedule_snooze(
        &self,
        alarm_id: &AlarmId,
        title: &str,
        audio: Option<&AudioRef>,
        fire_date: DateTime<Utc>,
    ) -> Result<(), GatewayError> {
        match self {
            AlarmScheduler::Notification(scheduler) => scheduler
                .schedule_snooze(alarm_id, title, audio, fire_date)
                .await
                .map(|_| ()),
            AlarmScheduler::Managed(service) => service.schedule(alarm_id, fire_date, title).await,
        }
    }

    /// Withdraw a pending snooze for `alarm_id`.
    pub async fn cancel_snooze(&self, alarm_id: &AlarmId) -> Result<(), GatewayError> {
        match self {
            AlarmScheduler::Notification(scheduler) => {
                scheduler
                    .cancel(&[ScheduledEvent::snooze_identifier(alarm_id)])
                    .await;
                Ok(())
            }
            AlarmScheduler::Managed(service) => service.cancel(alarm_id).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::InMemoryNotificationCenter;
    use crate::testing::RecordingManagedAlarms;

    fn notifications() -> (Arc<InMemoryNotificationCenter>, Arc<NotificationScheduler>) {
        let center = Arc::new(InMemoryNotificationCenter::default());
        let scheduler = Arc::new(NotificationScheduler::new(center.clone()));
        (center, scheduler)
    }

    #[test]
    fn probe_falls_back_to_notifications() {
        let (_, scheduler) = notifications();
        assert_eq!(
            AlarmScheduler::probe(scheduler.clone(), None).kind(),
            SchedulerKind::Notification
        );

        let unavailable: Arc<dyn ManagedAlarmService> = Arc::new(RecordingManagedAlarms::new(false));
        assert_eq!(
            AlarmScheduler::probe(scheduler, Some(unavailable)).kind(),
            SchedulerKind::Notification
        );
    }

    #[tokio::test]
    async fn managed_backend_receives_snoozes() {
        let (center, scheduler) = notifications();
        let managed = Arc::new(RecordingManagedAlarms::new(true));
        let backend = AlarmScheduler::probe(scheduler, Some(managed.clone()));
        assert_eq!(backend.kind(), SchedulerKind::Managed);

        let fire = Utc::now();
        backend
            .schedule_snooze(&"a".into(), "Wake", None, fire)
            .await
            .unwrap();
        assert_eq!(managed.scheduled(), vec![(AlarmId::from("a"), fire)]);
        assert_eq!(center.pending_count(), 0);
    }

    #[tokio::test]
    async fn notification_backend_registers_snooze_identifier() {
        let (center, scheduler) = notifications();
        let backend = AlarmScheduler::probe(scheduler, None);
        let id: AlarmId = "a".into();

        backend
            .schedule_snooze(&id, "Wake", None, Utc::now())
            .await
            .unwrap();
        assert!(center.pending_fire_date("a-snooze").is_some());
        let content = center.pending_content("a-snooze").unwrap();
        assert_eq!(content.body, "Snoozed alarm");
        assert_eq!(content.user_info["alarm_id"], "a");

        backend.cancel_snooze(&id).await.unwrap();
        assert_eq!(center.pending_count(), 0);
    }
}
