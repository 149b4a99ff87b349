use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use super::{AlarmContext, AlarmPlaybackStrategy, StrategyKind};
use crate::error::Result;
use crate::queue::NotificationQueueManager;

/// Keeps the alarm ringing through registered chain notifications.
///
/// Deactivation only forgets the context; withdrawing the registered links
/// is done by whoever ends the alarm.
pub struct BackgroundChainStrategy {
    queue: Arc<NotificationQueueManager>,
    context: Mutex<Option<AlarmContext>>,
}

impl BackgroundChainStrategy {
    pub fn new(queue: Arc<NotificationQueueManager>) -> Self {
        Self {
            queue,
            context: Mutex::new(None),
        }
    }

    pub async fn active_context(&self) -> Option<AlarmContext> {
        self.context.lock().await.clone()
    }
}

#[async_trait]
impl AlarmPlaybackStrategy for BackgroundChainStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::BackgroundChain
    }

    fn requires_chain_notifications(&self) -> bool {
        true
    }

    async fn activate(&self, context: &AlarmContext) -> Result<()> {
        let mut current = self.context.lock().await;
        *current = Some(context.clone());
        let report = self
            .queue
            .ensure_chain(
                &context.alarm_id,
                &context.title,
                context.audio.as_ref(),
                context.scheduled_time,
            )
            .await?;
        debug!(
            alarm_id = %context.alarm_id,
            links = report.registered.len(),
            "background chain active"
        );
        Ok(())
    }

    async fn deactivate(&self) {
        self.context.lock().await.take();
    }
}
