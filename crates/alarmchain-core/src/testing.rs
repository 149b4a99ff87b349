//! Fakes for the engine's collaborators.
//!
//! Compiled for the crate's own tests and, behind the `test-util` feature,
//! for integration tests. They record what they were asked to do instead of
//! doing it.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::alarm::{AlarmId, AudioRef};
use crate::error::{EngineError, GatewayError, PersistenceError, Result};
use crate::gateway::ManagedAlarmService;
use crate::orchestrator::Presenter;
use crate::playback::{AlarmContext, AudioDriver};
use crate::queue::{PriorityStrategy, PriorityTier, QueueState, QueueStore};

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioCall {
    Play { looping: bool },
    Stop,
    StartVibration,
    StopVibration,
}

/// Audio driver that records calls. `failing()` makes every `play` fail.
#[derive(Debug, Default)]
pub struct RecordingAudio {
    calls: Mutex<Vec<AudioCall>>,
    fail_play: bool,
}

impl RecordingAudio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_play: true,
        }
    }

    pub fn calls(&self) -> Vec<AudioCall> {
        lock(&self.calls).clone()
    }

    /// Whether sound is currently playing, judged from the call sequence.
    pub fn is_playing(&self) -> bool {
        lock(&self.calls)
            .iter()
            .rev()
            .find(|c| matches!(c, AudioCall::Play { .. } | AudioCall::Stop))
            .is_some_and(|c| matches!(c, AudioCall::Play { .. }))
    }
}

impl AudioDriver for RecordingAudio {
    fn play(&self, _audio: Option<&AudioRef>, looping: bool) -> Result<()> {
        if self.fail_play {
            return Err(EngineError::Playback("audio device unavailable".to_string()));
        }
        lock(&self.calls).push(AudioCall::Play { looping });
        Ok(())
    }

    fn stop(&self) {
        lock(&self.calls).push(AudioCall::Stop);
    }

    fn start_vibration(&self) {
        lock(&self.calls).push(AudioCall::StartVibration);
    }

    fn stop_vibration(&self) {
        lock(&self.calls).push(AudioCall::StopVibration);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenterCall {
    Present(AlarmId),
    Dismiss,
    MissionComplete,
}

#[derive(Debug, Default)]
pub struct RecordingPresenter {
    calls: Mutex<Vec<PresenterCall>>,
}

impl RecordingPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<PresenterCall> {
        lock(&self.calls).clone()
    }
}

impl Presenter for RecordingPresenter {
    fn present_alarm(&self, context: &AlarmContext) {
        lock(&self.calls).push(PresenterCall::Present(context.alarm_id.clone()));
    }

    fn dismiss(&self) {
        lock(&self.calls).push(PresenterCall::Dismiss);
    }

    fn transition_to_mission_complete(&self) {
        lock(&self.calls).push(PresenterCall::MissionComplete);
    }
}

/// Priority strategy with a fixed answer, optionally overridden for
/// specific occurrence fire dates.
#[derive(Debug, Clone)]
pub struct FixedPriorityStrategy {
    tier: PriorityTier,
    chain_count: u32,
    overrides: BTreeMap<DateTime<Utc>, PriorityTier>,
}

impl FixedPriorityStrategy {
    pub fn new(tier: PriorityTier, chain_count: u32) -> Self {
        Self {
            tier,
            chain_count,
            overrides: BTreeMap::new(),
        }
    }

    pub fn with_override(mut self, fire_date: DateTime<Utc>, tier: PriorityTier) -> Self {
        self.overrides.insert(fire_date, tier);
        self
    }
}

impl PriorityStrategy for FixedPriorityStrategy {
    fn calculate_priority(&self, fire_date: DateTime<Utc>, _now: DateTime<Utc>) -> PriorityTier {
        self.overrides.get(&fire_date).copied().unwrap_or(self.tier)
    }

    fn chain_count(&self, _tier: PriorityTier) -> u32 {
        self.chain_count
    }
}

/// Queue store whose every operation fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingQueueStore;

impl FailingQueueStore {
    fn error() -> PersistenceError {
        PersistenceError::Io {
            path: PathBuf::from("queue_state.json"),
            source: std::io::Error::other("disk full"),
        }
    }
}

#[async_trait]
impl QueueStore for FailingQueueStore {
    async fn save(&self, _state: &QueueState) -> Result<(), PersistenceError> {
        Err(Self::error())
    }

    async fn load(&self) -> Result<Option<QueueState>, PersistenceError> {
        Err(Self::error())
    }
}

/// Managed alarm service that records requests.
#[derive(Debug, Default)]
pub struct RecordingManagedAlarms {
    available: bool,
    scheduled: Mutex<Vec<(AlarmId, DateTime<Utc>)>>,
    cancelled: Mutex<Vec<AlarmId>>,
}

impl RecordingManagedAlarms {
    pub fn new(available: bool) -> Self {
        Self {
            available,
            ..Self::default()
        }
    }

    pub fn scheduled(&self) -> Vec<(AlarmId, DateTime<Utc>)> {
        lock(&self.scheduled).clone()
    }

    pub fn cancelled(&self) -> Vec<AlarmId> {
        lock(&self.cancelled).clone()
    }
}

#[async_trait]
impl ManagedAlarmService for RecordingManagedAlarms {
    fn is_available(&self) -> bool {
        self.available
    }

    async fn schedule(
        &self,
        alarm_id: &AlarmId,
        fire_date: DateTime<Utc>,
        _title: &str,
    ) -> Result<(), GatewayError> {
        if !self.available {
            return Err(GatewayError::Unavailable("managed alarms unsupported".to_string()));
        }
        lock(&self.scheduled).push((alarm_id.clone(), fire_date));
        Ok(())
    }

    async fn cancel(&self, alarm_id: &AlarmId) -> Result<(), GatewayError> {
        lock(&self.cancelled).push(alarm_id.clone());
        Ok(())
    }
}
