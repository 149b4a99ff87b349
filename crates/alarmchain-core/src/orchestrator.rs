//! Top-level alarm state machine.
//!
//! ```text
//! Idle --fired--> Alerting(context) --dismiss | mission complete | snooze--> Idle
//! ```
//!
//! Visibility (foreground/background) is tracked on its own axis, also while
//! idle, and decides which playback strategy runs while alerting. Every entry
//! point takes the same lock, so lifecycle signals arriving twice or out of
//! order collapse into no-ops (`Ok(None)`).

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::alarm::{AlarmId, AudioRef};
use crate::clock::Clock;
use crate::error::{EngineError, Result};
use crate::events::AlarmEvent;
use crate::gateway::AlarmScheduler;
use crate::playback::{AlarmContext, AlarmPlaybackStrategy, StrategyKind, Visibility};
use crate::queue::{same_occurrence, NotificationQueueManager};

/// Finished occurrences remembered for stale-delivery suppression.
const FINISHED_MEMORY: usize = 8;

/// Alarm UI.
pub trait Presenter: Send + Sync {
    fn present_alarm(&self, context: &AlarmContext);

    fn dismiss(&self);

    fn transition_to_mission_complete(&self);
}

/// Presenter that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPresenter;

impl Presenter for LogPresenter {
    fn present_alarm(&self, context: &AlarmContext) {
        info!(alarm_id = %context.alarm_id, title = %context.title, "presenting alarm");
    }

    fn dismiss(&self) {
        info!("alarm UI dismissed");
    }

    fn transition_to_mission_complete(&self) {
        info!("alarm UI switched to mission complete");
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorSnapshot {
    pub context: Option<AlarmContext>,
    pub visibility: Visibility,
    pub strategy: Option<StrategyKind>,
}

#[derive(Debug, Default)]
struct OrchestratorState {
    context: Option<AlarmContext>,
    visibility: Visibility,
    strategy: Option<StrategyKind>,
    finished: VecDeque<(AlarmId, DateTime<Utc>)>,
}

impl OrchestratorState {
    fn remember_finished(&mut self, context: &AlarmContext) {
        if self.finished.len() == FINISHED_MEMORY {
            self.finished.pop_front();
        }
        self.finished
            .push_back((context.alarm_id.clone(), context.scheduled_time));
    }

    fn forget_finished(&mut self, context: &AlarmContext) {
        self.finished.retain(|(id, at)| {
            !(id == &context.alarm_id && same_occurrence(*at, context.scheduled_time))
        });
    }

    fn is_finished(&self, context: &AlarmContext) -> bool {
        self.finished.iter().any(|(id, at)| {
            id == &context.alarm_id && same_occurrence(*at, context.scheduled_time)
        })
    }
}

#[derive(Clone, Copy)]
enum Ending {
    Dismissed,
    MissionComplete,
}

pub struct AlarmChainOrchestrator {
    queue: Arc<NotificationQueueManager>,
    scheduler: AlarmScheduler,
    foreground: Arc<dyn AlarmPlaybackStrategy>,
    background: Arc<dyn AlarmPlaybackStrategy>,
    presenter: Arc<dyn Presenter>,
    clock: Arc<dyn Clock>,
    state: Mutex<OrchestratorState>,
}

impl AlarmChainOrchestrator {
    pub fn new(
        queue: Arc<NotificationQueueManager>,
        scheduler: AlarmScheduler,
        foreground: Arc<dyn AlarmPlaybackStrategy>,
        background: Arc<dyn AlarmPlaybackStrategy>,
        presenter: Arc<dyn Presenter>,
        clock: Arc<dyn Clock>,
        visibility: Visibility,
    ) -> Self {
        Self {
            queue,
            scheduler,
            foreground,
            background,
            presenter,
            clock,
            state: Mutex::new(OrchestratorState {
                visibility,
                ..OrchestratorState::default()
            }),
        }
    }

    /// An alarm started ringing. A repeated signal for the ringing alarm is
    /// dropped; a signal for another alarm replaces the ringing one.
    pub async fn handle_alarm_fired(&self, context: AlarmContext) -> Result<Option<AlarmEvent>> {
        let mut state = self.state.lock().await;
        self.fire_locked(&mut state, context).await
    }

    /// A chain notification was delivered. Links of an occurrence the user
    /// already ended are ignored; anything else counts as the alarm firing.
    pub async fn handle_chain_delivery(&self, context: AlarmContext) -> Result<Option<AlarmEvent>> {
        let mut state = self.state.lock().await;
        if state.is_finished(&context) {
            debug!(
                alarm_id = %context.alarm_id,
                occurrence = %context.scheduled_time,
                "ignoring chain link of finished occurrence"
            );
            return Ok(None);
        }
        self.fire_locked(&mut state, context).await
    }

    pub async fn app_did_enter_foreground(&self) -> Result<Option<AlarmEvent>> {
        self.set_visibility(Visibility::Foreground).await
    }

    pub async fn app_did_enter_background(&self) -> Result<Option<AlarmEvent>> {
        self.set_visibility(Visibility::Background).await
    }

    pub async fn handle_dismiss(&self) -> Result<Option<AlarmEvent>> {
        self.end(Ending::Dismissed).await
    }

    pub async fn handle_mission_complete(&self) -> Result<Option<AlarmEvent>> {
        self.end(Ending::MissionComplete).await
    }

    /// End the ringing alarm and ring it again in `minutes`. `audio`
    /// overrides the ringing alarm's sound for the snoozed occurrence.
    ///
    /// If the snooze cannot be registered the alarm keeps ringing with the
    /// strategy for the current visibility, and the error is returned.
    pub async fn handle_snooze(
        &self,
        minutes: u32,
        audio: Option<AudioRef>,
    ) -> Result<Option<AlarmEvent>> {
        if minutes == 0 {
            return Err(EngineError::InvalidSnooze(minutes));
        }

        let (context, fire_date) = {
            let mut state = self.state.lock().await;
            let Some(context) = state.context.take() else {
                debug!("snooze while idle ignored");
                return Ok(None);
            };
            // Chain slots are released first so the snooze entry fits.
            self.stop_locked(&mut state, &context).await;

            let fire_date = self.clock.now() + Duration::minutes(i64::from(minutes));
            let audio = audio.or_else(|| context.audio.clone());
            if let Err(e) = self
                .scheduler
                .schedule_snooze(&context.alarm_id, &context.title, audio.as_ref(), fire_date)
                .await
            {
                warn!(alarm_id = %context.alarm_id, error = %e, "snooze registration failed, alarm keeps ringing");
                state.forget_finished(&context);
                let kind = state.visibility.strategy_kind();
                state.context = Some(context.clone());
                self.start_strategy(&mut state, kind, &context).await;
                return Err(e.into());
            }
            self.presenter.dismiss();
            (context, fire_date)
        };

        info!(alarm_id = %context.alarm_id, minutes, fire_date = %fire_date, "alarm snoozed");
        self.refill_freed_slots().await;
        Ok(Some(AlarmEvent::AlarmSnoozed {
            alarm_id: context.alarm_id,
            minutes,
            fire_date,
            backend: self.scheduler.kind(),
            at: self.clock.now(),
        }))
    }

    pub async fn is_alarm_active(&self, alarm_id: &AlarmId) -> bool {
        self.state
            .lock()
            .await
            .context
            .as_ref()
            .is_some_and(|c| &c.alarm_id == alarm_id)
    }

    pub async fn active_context(&self) -> Option<AlarmContext> {
        self.state.lock().await.context.clone()
    }

    pub async fn visibility(&self) -> Visibility {
        self.state.lock().await.visibility
    }

    pub async fn snapshot(&self) -> OrchestratorSnapshot {
        let state = self.state.lock().await;
        OrchestratorSnapshot {
            context: state.context.clone(),
            visibility: state.visibility,
            strategy: state.strategy,
        }
    }

    fn strategy(&self, kind: StrategyKind) -> &Arc<dyn AlarmPlaybackStrategy> {
        match kind {
            StrategyKind::Foreground => &self.foreground,
            StrategyKind::BackgroundChain => &self.background,
        }
    }

    async fn fire_locked(
        &self,
        state: &mut OrchestratorState,
        context: AlarmContext,
    ) -> Result<Option<AlarmEvent>> {
        let mut superseded = None;
        if let Some(active) = state.context.take() {
            if active.alarm_id == context.alarm_id {
                debug!(alarm_id = %context.alarm_id, "duplicate fire signal dropped");
                state.context = Some(active);
                return Ok(None);
            }
            info!(
                previous = %active.alarm_id,
                alarm_id = %context.alarm_id,
                "new alarm replaces the ringing one"
            );
            self.stop_locked(state, &active).await;
            superseded = Some(active.alarm_id);
        }

        let kind = state.visibility.strategy_kind();
        state.context = Some(context.clone());
        self.start_strategy(state, kind, &context).await;
        self.presenter.present_alarm(&context);
        info!(alarm_id = %context.alarm_id, strategy = ?kind, "alarm fired");

        Ok(Some(AlarmEvent::AlarmFired {
            alarm_id: context.alarm_id,
            scheduled_time: context.scheduled_time,
            strategy: kind,
            superseded,
            at: self.clock.now(),
        }))
    }

    async fn set_visibility(&self, visibility: Visibility) -> Result<Option<AlarmEvent>> {
        let mut state = self.state.lock().await;
        if state.visibility == visibility {
            return Ok(None);
        }
        state.visibility = visibility;

        let Some(context) = state.context.clone() else {
            debug!(?visibility, "visibility changed while idle");
            return Ok(None);
        };
        let to = visibility.strategy_kind();
        let from = state.strategy;
        if from == Some(to) {
            return Ok(None);
        }

        if let Some(from) = from {
            self.strategy(from).deactivate().await;
        }
        self.queue
            .cancel_chain(&context.alarm_id, context.scheduled_time)
            .await;
        state.strategy = Some(to);
        self.activate(to, &context).await;
        info!(alarm_id = %context.alarm_id, ?from, ?to, "playback strategy switched");

        Ok(Some(AlarmEvent::StrategySwitched {
            alarm_id: context.alarm_id,
            from,
            to,
            visibility,
            at: self.clock.now(),
        }))
    }

    async fn end(&self, ending: Ending) -> Result<Option<AlarmEvent>> {
        let context = {
            let mut state = self.state.lock().await;
            let Some(context) = state.context.take() else {
                return Ok(None);
            };
            self.stop_locked(&mut state, &context).await;
            match ending {
                Ending::Dismissed => self.presenter.dismiss(),
                Ending::MissionComplete => self.presenter.transition_to_mission_complete(),
            }
            context
        };

        self.refill_freed_slots().await;
        let at = self.clock.now();
        let alarm_id = context.alarm_id;
        info!(alarm_id = %alarm_id, "alarm ended");
        Ok(Some(match ending {
            Ending::Dismissed => AlarmEvent::AlarmDismissed { alarm_id, at },
            Ending::MissionComplete => AlarmEvent::MissionCompleted { alarm_id, at },
        }))
    }

    /// Activate `kind` for the ringing alarm. Links of the occurrence are
    /// withdrawn when the strategy rings without them.
    async fn start_strategy(
        &self,
        state: &mut OrchestratorState,
        kind: StrategyKind,
        context: &AlarmContext,
    ) {
        state.strategy = Some(kind);
        self.activate(kind, context).await;
        if !self.strategy(kind).requires_chain_notifications() {
            self.queue
                .cancel_chain(&context.alarm_id, context.scheduled_time)
                .await;
        }
    }

    /// Activation failures are logged, not returned: the alarm is already
    /// ringing and must still reach the presenter.
    async fn activate(&self, kind: StrategyKind, context: &AlarmContext) {
        if let Err(e) = self.strategy(kind).activate(context).await {
            error!(alarm_id = %context.alarm_id, strategy = ?kind, error = %e, "strategy activation failed");
        }
    }

    async fn stop_locked(&self, state: &mut OrchestratorState, context: &AlarmContext) {
        if let Some(kind) = state.strategy.take() {
            self.strategy(kind).deactivate().await;
        }
        self.queue
            .cancel_chain(&context.alarm_id, context.scheduled_time)
            .await;
        state.remember_finished(context);
    }

    async fn refill_freed_slots(&self) {
        let batch = self.queue.settings().quick_refill_batch;
        match self.queue.quick_refill(batch).await {
            Ok(report) => debug!(registered = report.registered.len(), "freed slots refilled"),
            Err(e) => warn!(error = %e, "refill after alarm end failed"),
        }
    }
}
