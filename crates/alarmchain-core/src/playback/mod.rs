//! How a ringing alarm is made audible.
//!
//! In the foreground the process plays the sound itself. In the background
//! it may be suspended at any moment, so the alarm keeps ringing through
//! the chain of pre-registered notifications instead.

mod background;
mod foreground;

pub use background::BackgroundChainStrategy;
pub use foreground::ForegroundStrategy;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::alarm::{Alarm, AlarmId, AudioRef};
use crate::error::Result;

/// The alarm that is currently ringing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmContext {
    pub alarm_id: AlarmId,
    pub title: String,
    pub audio: Option<AudioRef>,
    /// Anchor fire date of the ringing occurrence.
    pub scheduled_time: DateTime<Utc>,
}

impl AlarmContext {
    pub fn new(
        alarm_id: impl Into<AlarmId>,
        title: impl Into<String>,
        audio: Option<AudioRef>,
        scheduled_time: DateTime<Utc>,
    ) -> Self {
        Self {
            alarm_id: alarm_id.into(),
            title: title.into(),
            audio,
            scheduled_time,
        }
    }

    pub fn from_alarm(alarm: &Alarm, scheduled_time: DateTime<Utc>) -> Self {
        Self {
            alarm_id: alarm.id.clone(),
            title: alarm.title(),
            audio: alarm.audio.clone(),
            scheduled_time,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    #[default]
    Foreground,
    Background,
}

impl Visibility {
    pub fn strategy_kind(self) -> StrategyKind {
        match self {
            Visibility::Foreground => StrategyKind::Foreground,
            Visibility::Background => StrategyKind::BackgroundChain,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Foreground,
    BackgroundChain,
}

#[async_trait]
pub trait AlarmPlaybackStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// Whether the alarm depends on chain notifications while this strategy
    /// is active.
    fn requires_chain_notifications(&self) -> bool;

    async fn activate(&self, context: &AlarmContext) -> Result<()>;

    /// Stop whatever `activate` started. Safe to call when inactive.
    async fn deactivate(&self);
}

/// Local sound and haptics.
pub trait AudioDriver: Send + Sync {
    /// Start playing `audio` (the default alarm sound when `None`).
    fn play(&self, audio: Option<&AudioRef>, looping: bool) -> Result<()>;

    fn stop(&self);

    fn start_vibration(&self);

    fn stop_vibration(&self);
}

/// Audio driver that only logs. Used where no sound device exists.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentAudioDriver;

impl AudioDriver for SilentAudioDriver {
    fn play(&self, audio: Option<&AudioRef>, looping: bool) -> Result<()> {
        debug!(
            sound = audio.map(|a| a.name.as_str()).unwrap_or("default"),
            looping, "audio play"
        );
        Ok(())
    }

    fn stop(&self) {
        debug!("audio stop");
    }

    fn start_vibration(&self) {
        debug!("vibration start");
    }

    fn stop_vibration(&self) {
        debug!("vibration stop");
    }
}
