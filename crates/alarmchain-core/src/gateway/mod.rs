//! Boundary to the host notification service.
//!
//! The service holds a small, fixed number of pending registrations. The
//! engine never asks for that number; it only observes current occupancy
//! through [`NotificationGateway::pending_identifiers`].

mod backend;
mod memory;
mod scheduler;

pub use backend::{AlarmScheduler, ManagedAlarmService, SchedulerKind};
pub use memory::{DeliveredNotification, InMemoryNotificationCenter};
pub use scheduler::NotificationScheduler;

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::queue::ScheduledEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationStatus {
    Authorized,
    Denied,
    NotDetermined,
}

/// What the user sees (and hears) when a registration fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationContent {
    pub title: String,
    pub body: String,
    /// Sound name; `None` means the service's default sound.
    pub sound: Option<String>,
    pub category: String,
    /// Routing data handed back on delivery (alarm id, chain index, occurrence).
    pub user_info: BTreeMap<String, String>,
}

/// Host notification service.
#[async_trait]
pub trait NotificationGateway: Send + Sync {
    async fn authorization_status(&self) -> AuthorizationStatus;

    /// Register (or replace, for an existing identifier) one pending notification.
    async fn register(
        &self,
        event: &ScheduledEvent,
        content: NotificationContent,
    ) -> Result<(), GatewayError>;

    async fn unregister(&self, identifiers: &[String]);

    async fn unregister_all(&self);

    /// Identifiers currently waiting to fire.
    async fn pending_identifiers(&self) -> BTreeSet<String>;

    /// Identifiers that already fired and are still shown to the user.
    async fn delivered_identifiers(&self) -> BTreeSet<String>;
}
