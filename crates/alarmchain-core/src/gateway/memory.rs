use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{AuthorizationStatus, NotificationContent, NotificationGateway};
use crate::error::GatewayError;
use crate::queue::ScheduledEvent;

/// Pending-slot capacity of the simulated service.
pub const DEFAULT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveredNotification {
    pub id: String,
    pub fire_date: DateTime<Utc>,
    pub content: NotificationContent,
}

#[derive(Debug)]
struct CenterState {
    pending: BTreeMap<String, (DateTime<Utc>, NotificationContent)>,
    delivered: BTreeMap<String, DeliveredNotification>,
    authorization: AuthorizationStatus,
    rejected: BTreeSet<String>,
    register_calls: usize,
}

/// In-process stand-in for an OS notification center.
///
/// Enforces a hard pending capacity, replaces registrations with an
/// existing identifier, and lets callers simulate what the OS does behind
/// the engine's back: delivering due notifications, evicting pending ones,
/// revoking permission.
#[derive(Debug)]
pub struct InMemoryNotificationCenter {
    capacity: usize,
    state: Mutex<CenterState>,
}

impl Default for InMemoryNotificationCenter {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl InMemoryNotificationCenter {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(CenterState {
                pending: BTreeMap::new(),
                delivered: BTreeMap::new(),
                authorization: AuthorizationStatus::Authorized,
                rejected: BTreeSet::new(),
                register_calls: 0,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn set_authorization(&self, status: AuthorizationStatus) {
        self.lock().authorization = status;
    }

    /// Make every future registration of `id` fail.
    pub fn reject(&self, id: impl Into<String>) {
        self.lock().rejected.insert(id.into());
    }

    /// Drop pending registrations without telling the engine.
    pub fn evict(&self, ids: &[&str]) {
        let mut state = self.lock();
        for id in ids {
            state.pending.remove(*id);
        }
    }

    /// Move every pending registration due at `now` to the delivered list.
    pub fn deliver_due(&self, now: DateTime<Utc>) -> Vec<DeliveredNotification> {
        let mut state = self.lock();
        let due: Vec<String> = state
            .pending
            .iter()
            .filter(|(_, (fire, _))| *fire <= now)
            .map(|(id, _)| id.clone())
            .collect();

        let mut out = Vec::with_capacity(due.len());
        for id in due {
            if let Some((fire_date, content)) = state.pending.remove(&id) {
                let delivered = DeliveredNotification {
                    id: id.clone(),
                    fire_date,
                    content,
                };
                state.delivered.insert(id, delivered.clone());
                out.push(delivered);
            }
        }
        out.sort_by(|a, b| a.fire_date.cmp(&b.fire_date).then_with(|| a.id.cmp(&b.id)));
        out
    }

    pub fn pending_fire_date(&self, id: &str) -> Option<DateTime<Utc>> {
        self.lock().pending.get(id).map(|(fire, _)| *fire)
    }

    pub fn pending_content(&self, id: &str) -> Option<NotificationContent> {
        self.lock().pending.get(id).map(|(_, content)| content.clone())
    }

    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn register_calls(&self) -> usize {
        self.lock().register_calls
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CenterState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl NotificationGateway for InMemoryNotificationCenter {
    async fn authorization_status(&self) -> AuthorizationStatus {
        self.lock().authorization
    }

    async fn register(
        &self,
        event: &ScheduledEvent,
        content: NotificationContent,
    ) -> Result<(), GatewayError> {
        let mut state = self.lock();
        state.register_calls += 1;

        if state.authorization == AuthorizationStatus::Denied {
            return Err(GatewayError::AuthorizationDenied);
        }
        if state.rejected.contains(&event.id) {
            return Err(GatewayError::Rejected {
                id: event.id.clone(),
                reason: "rejected by notification service".to_string(),
            });
        }
        if !state.pending.contains_key(&event.id) && state.pending.len() >= self.capacity {
            return Err(GatewayError::CapacityExceeded {
                capacity: self.capacity,
            });
        }
        state.delivered.remove(&event.id);
        state
            .pending
            .insert(event.id.clone(), (event.fire_date, content));
        Ok(())
    }

    async fn unregister(&self, identifiers: &[String]) {
        let mut state = self.lock();
        for id in identifiers {
            state.pending.remove(id);
        }
    }

    async fn unregister_all(&self) {
        self.lock().pending.clear();
    }

    async fn pending_identifiers(&self) -> BTreeSet<String> {
        self.lock().pending.keys().cloned().collect()
    }

    async fn delivered_identifiers(&self) -> BTreeSet<String> {
        self.lock().delivered.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::PriorityTier;
    use chrono::{Duration, TimeZone};

    fn event(id: &str, secs: i64) -> ScheduledEvent {
        let base = Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap();
        let mut ev = ScheduledEvent::new(
            "a".into(),
            None,
            0,
            base,
            base + Duration::seconds(secs),
            PriorityTier::Critical,
        );
        ev.id = id.to_string();
        ev
    }

    fn content() -> NotificationContent {
        NotificationContent {
            title: "t".into(),
            body: "b".into(),
            sound: None,
            category: "ALARM".into(),
            user_info: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn capacity_is_enforced_but_replacement_is_free() {
        let center = InMemoryNotificationCenter::new(2);
        center.register(&event("x", 0), content()).await.unwrap();
        center.register(&event("y", 1), content()).await.unwrap();
        assert_eq!(
            center.register(&event("z", 2), content()).await,
            Err(GatewayError::CapacityExceeded { capacity: 2 })
        );
        // Same identifier replaces in place.
        center.register(&event("x", 5), content()).await.unwrap();
        assert_eq!(center.pending_count(), 2);
    }

    #[tokio::test]
    async fn denied_permission_blocks_registration() {
        let center = InMemoryNotificationCenter::default();
        center.set_authorization(AuthorizationStatus::Denied);
        assert_eq!(
            center.register(&event("x", 0), content()).await,
            Err(GatewayError::AuthorizationDenied)
        );
    }

    #[tokio::test]
    async fn delivery_moves_due_notifications() {
        let center = InMemoryNotificationCenter::default();
        center.register(&event("late", 60), content()).await.unwrap();
        center.register(&event("early", 0), content()).await.unwrap();

        let now = Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 30).unwrap();
        let delivered = center.deliver_due(now);
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].id, "early");
        assert_eq!(center.pending_identifiers().await, ["late".to_string()].into());
        assert_eq!(center.delivered_identifiers().await, ["early".to_string()].into());
    }
}
