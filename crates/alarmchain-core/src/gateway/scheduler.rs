use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::{AuthorizationStatus, NotificationContent, NotificationGateway};
use crate::alarm::{AlarmId, AudioRef};
use crate::error::GatewayError;
use crate::queue::{PriorityTier, ScheduledEvent};

pub const ALARM_CATEGORY: &str = "ALARM";

/// Translates scheduled events into requests the notification service
/// understands.
pub struct NotificationScheduler {
    gateway: Arc<dyn NotificationGateway>,
}

impl NotificationScheduler {
    pub fn new(gateway: Arc<dyn NotificationGateway>) -> Self {
        Self { gateway }
    }

    /// Build the notification content for one chain link.
    pub fn render(
        event: &ScheduledEvent,
        title: &str,
        audio: Option<&AudioRef>,
    ) -> NotificationContent {
        let body = if event.is_chain_head() {
            format!(
                "It's {} - time to get up",
                event.occurrence.format("%H:%M")
            )
        } else {
            format!("Still ringing (reminder {})", event.chain_index)
        };

        let mut user_info = BTreeMap::new();
        user_info.insert("alarm_id".to_string(), event.alarm_id.to_string());
        user_info.insert("chain_index".to_string(), event.chain_index.to_string());
        user_info.insert("occurrence".to_string(), event.occurrence.to_rfc3339());

        NotificationContent {
            title: title.to_string(),
            body,
            sound: audio.map(|a| a.name.clone()),
            category: ALARM_CATEGORY.to_string(),
            user_info,
        }
    }

    pub async fn authorization(&self) -> AuthorizationStatus {
        self.gateway.authorization_status().await
    }

    /// Register a chain link rendered from explicit title/audio, for
    /// occurrences whose alarm is no longer in the store.
    pub async fn schedule_with(
        &self,
        event: &ScheduledEvent,
        title: &str,
        audio: Option<&AudioRef>,
    ) -> Result<(), GatewayError> {
        let content = Self::render(event, title, audio);
        self.gateway.register(event, content).await
    }

    /// Register a single one-shot snooze notification.
    pub async fn schedule_snooze(
        &self,
        alarm_id: &AlarmId,
        title: &str,
        audio: Option<&AudioRef>,
        fire_date: DateTime<Utc>,
    ) -> Result<String, GatewayError> {
        let mut event = ScheduledEvent::new(
            alarm_id.clone(),
            None,
            0,
            fire_date,
            fire_date,
            PriorityTier::Critical,
        );
        event.id = ScheduledEvent::snooze_identifier(alarm_id);
        let mut content = Self::render(&event, title, audio);
        content.body = "Snoozed alarm".to_string();
        self.gateway.register(&event, content).await?;
        Ok(event.id)
    }

    pub async fn cancel(&self, identifiers: &[String]) {
        if identifiers.is_empty() {
            return;
        }
        self.gateway.unregister(identifiers).await;
    }

    pub async fn cancel_all(&self) {
        self.gateway.unregister_all().await;
    }

    pub async fn pending(&self) -> BTreeSet<String> {
        self.gateway.pending_identifiers().await
    }
}
