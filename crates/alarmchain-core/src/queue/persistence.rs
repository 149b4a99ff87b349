//! Durable snapshot of what the queue believes is registered.
//!
//! The snapshot is only a starting point after a relaunch: it is always
//! reconciled against the notification service before being acted on.

use std::collections::BTreeSet;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PersistenceError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueState {
    pub registered_identifiers: BTreeSet<String>,
    pub version: u64,
    #[serde(default)]
    pub last_sync_timestamp: Option<DateTime<Utc>>,
}

/// Snapshot storage. Every save replaces the previous snapshot entirely.
#[async_trait]
pub trait QueueStore: Send + Sync {
    async fn save(&self, state: &QueueState) -> Result<(), PersistenceError>;

    async fn load(&self) -> Result<Option<QueueState>, PersistenceError>;
}

/// Snapshot kept in memory only.
#[derive(Debug, Default)]
pub struct MemoryQueueStore {
    state: Mutex<Option<QueueState>>,
}

impl MemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last saved snapshot, if any.
    pub fn snapshot(&self) -> Option<QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    async fn save(&self, state: &QueueState) -> Result<(), PersistenceError> {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = Some(state.clone());
        Ok(())
    }

    async fn load(&self) -> Result<Option<QueueState>, PersistenceError> {
        Ok(self.snapshot())
    }
}
