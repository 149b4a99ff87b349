//! Composition root.
//!
//! Builds every service once from an [`EngineConfig`] and the host's
//! collaborators, and exposes the entry points a host application calls.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::alarm::{AlarmId, AlarmStore};
use crate::clock::{Clock, SystemClock};
use crate::error::{EngineError, Result, StoreError};
use crate::events::AlarmEvent;
use crate::gateway::{
    AlarmScheduler, ManagedAlarmService, NotificationContent, NotificationGateway,
    NotificationScheduler, SchedulerKind,
};
use crate::orchestrator::{AlarmChainOrchestrator, LogPresenter, Presenter};
use crate::playback::{
    AlarmContext, AudioDriver, BackgroundChainStrategy, ForegroundStrategy, SilentAudioDriver,
    Visibility,
};
use crate::queue::{
    MemoryQueueStore, NotificationQueueManager, PriorityStrategy, QueueStore, ScheduleReport,
    TieredPriorityStrategy,
};
use crate::storage::EngineConfig;

pub struct AlarmEngine {
    config: EngineConfig,
    alarms: Arc<dyn AlarmStore>,
    clock: Arc<dyn Clock>,
    queue: Arc<NotificationQueueManager>,
    scheduler: AlarmScheduler,
    orchestrator: AlarmChainOrchestrator,
}

pub struct AlarmEngineBuilder {
    config: EngineConfig,
    alarms: Option<Arc<dyn AlarmStore>>,
    gateway: Option<Arc<dyn NotificationGateway>>,
    queue_store: Option<Arc<dyn QueueStore>>,
    audio: Option<Arc<dyn AudioDriver>>,
    presenter: Option<Arc<dyn Presenter>>,
    managed: Option<Arc<dyn ManagedAlarmService>>,
    clock: Option<Arc<dyn Clock>>,
    priority: Option<Arc<dyn PriorityStrategy>>,
    visibility: Visibility,
}

impl AlarmEngineBuilder {
    pub fn alarm_store(mut self, alarms: Arc<dyn AlarmStore>) -> Self {
        self.alarms = Some(alarms);
        self
    }

    pub fn gateway(mut self, gateway: Arc<dyn NotificationGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn queue_store(mut self, store: Arc<dyn QueueStore>) -> Self {
        self.queue_store = Some(store);
        self
    }

    pub fn audio(mut self, audio: Arc<dyn AudioDriver>) -> Self {
        self.audio = Some(audio);
        self
    }

    pub fn presenter(mut self, presenter: Arc<dyn Presenter>) -> Self {
        self.presenter = Some(presenter);
        self
    }

    /// Offer a platform-managed alarm backend. Used only if it reports
    /// itself available at build time.
    pub fn managed_alarms(mut self, service: Arc<dyn ManagedAlarmService>) -> Self {
        self.managed = Some(service);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn priority(mut self, priority: Arc<dyn PriorityStrategy>) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Visibility at launch. Defaults to foreground.
    pub fn visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    /// Wire every service.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid or the alarm store
    /// or notification gateway is missing.
    pub fn build(self) -> Result<AlarmEngine> {
        self.config.validate()?;
        let alarms = self
            .alarms
            .ok_or_else(|| EngineError::Custom("an alarm store is required".to_string()))?;
        let gateway = self
            .gateway
            .ok_or_else(|| EngineError::Custom("a notification gateway is required".to_string()))?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let priority = self
            .priority
            .unwrap_or_else(|| Arc::new(TieredPriorityStrategy::new(self.config.chain.lengths())));
        let queue_store = self
            .queue_store
            .unwrap_or_else(|| Arc::new(MemoryQueueStore::new()));
        let audio = self.audio.unwrap_or_else(|| Arc::new(SilentAudioDriver));
        let presenter = self.presenter.unwrap_or_else(|| Arc::new(LogPresenter));

        let notifications = Arc::new(NotificationScheduler::new(gateway));
        let queue = Arc::new(NotificationQueueManager::new(
            alarms.clone(),
            notifications.clone(),
            queue_store,
            priority,
            self.config.interval_calculator(),
            clock.clone(),
            self.config.queue_settings(),
        ));
        let scheduler = AlarmScheduler::probe(notifications, self.managed);
        let orchestrator = AlarmChainOrchestrator::new(
            queue.clone(),
            scheduler.clone(),
            Arc::new(ForegroundStrategy::new(audio)),
            Arc::new(BackgroundChainStrategy::new(queue.clone())),
            presenter,
            clock.clone(),
            self.visibility,
        );

        Ok(AlarmEngine {
            config: self.config,
            alarms,
            clock,
            queue,
            scheduler,
            orchestrator,
        })
    }
}

impl AlarmEngine {
    pub fn builder(config: EngineConfig) -> AlarmEngineBuilder {
        AlarmEngineBuilder {
            config,
            alarms: None,
            gateway: None,
            queue_store: None,
            audio: None,
            presenter: None,
            managed: None,
            clock: None,
            priority: None,
            visibility: Visibility::default(),
        }
    }

    /// Launch sequence: restore the snapshot, reconcile, fill the queue.
    pub async fn start(&self) -> Result<ScheduleReport> {
        let sync = self.queue.restore().await;
        info!(
            pending = sync.pending,
            lost = sync.lost.len(),
            backend = ?self.scheduler.kind(),
            "engine starting"
        );
        self.queue.refill().await
    }

    /// Call after the host created, edited, enabled or disabled alarms.
    pub async fn alarms_changed(&self) -> Result<ScheduleReport> {
        self.queue.refill().await
    }

    /// An alarm fired for the occurrence anchored at `scheduled_time`.
    pub async fn fire(
        &self,
        alarm_id: &AlarmId,
        scheduled_time: DateTime<Utc>,
    ) -> Result<Option<AlarmEvent>> {
        let alarm = self
            .alarms
            .fetch_alarm(alarm_id)?
            .ok_or_else(|| StoreError::NotFound(alarm_id.to_string()))?;
        self.orchestrator
            .handle_alarm_fired(AlarmContext::from_alarm(&alarm, scheduled_time))
            .await
    }

    /// The notification service delivered one of our notifications.
    pub async fn handle_delivered(
        &self,
        content: &NotificationContent,
    ) -> Result<Option<AlarmEvent>> {
        let Some(alarm_id) = content.user_info.get("alarm_id") else {
            warn!(title = %content.title, "delivered notification without alarm id");
            return Ok(None);
        };
        let alarm_id = AlarmId::new(alarm_id.as_str());
        let scheduled_time = content
            .user_info
            .get("occurrence")
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|| self.clock.now());

        let context = match self.alarms.fetch_alarm(&alarm_id)? {
            Some(alarm) => AlarmContext::from_alarm(&alarm, scheduled_time),
            None => AlarmContext::new(alarm_id, content.title.clone(), None, scheduled_time),
        };
        self.orchestrator.handle_chain_delivery(context).await
    }

    /// Snooze the ringing alarm. Without `minutes`, the alarm's own snooze
    /// length applies, then the configured default.
    pub async fn snooze(&self, minutes: Option<u32>) -> Result<Option<AlarmEvent>> {
        let Some(context) = self.orchestrator.active_context().await else {
            return Ok(None);
        };
        let minutes = match minutes {
            Some(m) => m,
            None => self
                .alarms
                .fetch_alarm(&context.alarm_id)?
                .and_then(|a| a.snooze_minutes)
                .unwrap_or(self.config.snooze.default_minutes),
        };
        self.orchestrator.handle_snooze(minutes, None).await
    }

    /// Withdraw everything registered for an alarm the host deleted or
    /// disabled, silencing it first if it is ringing.
    pub async fn remove_alarm(&self, alarm_id: &AlarmId) -> Result<Option<AlarmEvent>> {
        if self.orchestrator.is_alarm_active(alarm_id).await {
            self.orchestrator.handle_dismiss().await?;
        }
        if let Err(e) = self.scheduler.cancel_snooze(alarm_id).await {
            warn!(alarm_id = %alarm_id, error = %e, "failed to cancel snooze");
        }
        let withdrawn = self.queue.remove_alarm(alarm_id).await;
        Ok(Some(AlarmEvent::ChainCancelled {
            alarm_id: alarm_id.clone(),
            withdrawn,
            at: self.clock.now(),
        }))
    }

    /// Silence the ringing alarm and withdraw every pending registration.
    /// The next refill starts from an empty notification service.
    pub async fn reset(&self) -> Result<usize> {
        if let Some(context) = self.orchestrator.active_context().await {
            self.orchestrator.handle_dismiss().await?;
            if let Err(e) = self.scheduler.cancel_snooze(&context.alarm_id).await {
                warn!(alarm_id = %context.alarm_id, error = %e, "failed to cancel snooze");
            }
        }
        Ok(self.queue.clear_all().await)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn queue(&self) -> &Arc<NotificationQueueManager> {
        &self.queue
    }

    pub fn orchestrator(&self) -> &AlarmChainOrchestrator {
        &self.orchestrator
    }

    pub fn scheduler_kind(&self) -> SchedulerKind {
        self.scheduler.kind()
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alarm::{Alarm, MemoryAlarmStore};
    use crate::clock::FixedClock;
    use crate::gateway::InMemoryNotificationCenter;
    use crate::testing::RecordingManagedAlarms;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 7, 0, 0).unwrap()
    }

    fn config() -> EngineConfig {
        let mut cfg = EngineConfig::default();
        cfg.clock.utc_offset_minutes = Some(0);
        cfg
    }

    #[test]
    fn build_requires_store_and_gateway() {
        let result = AlarmEngine::builder(config()).build();
        assert!(matches!(result, Err(EngineError::Custom(_))));
    }

    #[test]
    fn build_rejects_invalid_config() {
        let mut cfg = config();
        cfg.queue.max_external_slots = 0;
        let result = AlarmEngine::builder(cfg)
            .alarm_store(Arc::new(MemoryAlarmStore::new()))
            .gateway(Arc::new(InMemoryNotificationCenter::default()))
            .build();
        assert!(matches!(result, Err(EngineError::Config(_))));
    }

    #[tokio::test]
    async fn start_fills_the_queue() {
        let center = Arc::new(InMemoryNotificationCenter::default());
        let engine = AlarmEngine::builder(config())
            .alarm_store(Arc::new(MemoryAlarmStore::with_alarms([Alarm::new("a", 8, 0)])))
            .gateway(center.clone())
            .clock(Arc::new(FixedClock::new(now())))
            .build()
            .unwrap();
        assert_eq!(engine.scheduler_kind(), SchedulerKind::Notification);

        let report = engine.start().await.unwrap();
        assert_eq!(report.registered.len(), 15);
        assert_eq!(center.pending_count(), 15);
    }

    #[tokio::test]
    async fn snooze_uses_alarm_length_then_default() {
        let clock = Arc::new(FixedClock::new(now()));
        let managed = Arc::new(RecordingManagedAlarms::new(true));
        let engine = AlarmEngine::builder(config())
            .alarm_store(Arc::new(MemoryAlarmStore::with_alarms([
                Alarm::new("a", 7, 0).with_snooze(5),
                Alarm::new("b", 7, 0),
            ])))
            .gateway(Arc::new(InMemoryNotificationCenter::default()))
            .managed_alarms(managed.clone())
            .clock(clock.clone())
            .build()
            .unwrap();
        assert_eq!(engine.scheduler_kind(), SchedulerKind::Managed);

        engine.fire(&"a".into(), now()).await.unwrap();
        engine.snooze(None).await.unwrap();
        engine.fire(&"b".into(), now()).await.unwrap();
        engine.snooze(None).await.unwrap();

        assert_eq!(
            managed.scheduled(),
            vec![
                (AlarmId::from("a"), now() + Duration::minutes(5)),
                (AlarmId::from("b"), now() + Duration::minutes(9)),
            ]
        );
    }

    #[tokio::test]
    async fn reset_silences_and_empties_the_service() {
        let center = Arc::new(InMemoryNotificationCenter::default());
        let engine = AlarmEngine::builder(config())
            .alarm_store(Arc::new(MemoryAlarmStore::with_alarms([
                Alarm::new("a", 7, 0),
                Alarm::new("b", 8, 0),
            ])))
            .gateway(center.clone())
            .clock(Arc::new(FixedClock::new(now())))
            .build()
            .unwrap();
        engine.start().await.unwrap();
        engine.fire(&"a".into(), now()).await.unwrap();

        engine.reset().await.unwrap();
        assert_eq!(center.pending_count(), 0);
        assert!(engine.orchestrator().active_context().await.is_none());

        let report = engine.alarms_changed().await.unwrap();
        assert_eq!(report.registered.len(), 30);
    }

    #[tokio::test]
    async fn firing_unknown_alarm_is_an_error() {
        let engine = AlarmEngine::builder(config())
            .alarm_store(Arc::new(MemoryAlarmStore::new()))
            .gateway(Arc::new(InMemoryNotificationCenter::default()))
            .build()
            .unwrap();
        assert!(matches!(
            engine.fire(&"ghost".into(), now()).await,
            Err(EngineError::Store(StoreError::NotFound(_)))
        ));
    }
}
