use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{AlarmContext, AlarmPlaybackStrategy, AudioDriver, StrategyKind};
use crate::alarm::AlarmId;
use crate::error::Result;

/// Plays the alarm locally: looping sound plus vibration. No chain.
pub struct ForegroundStrategy {
    audio: Arc<dyn AudioDriver>,
    playing: Mutex<Option<AlarmId>>,
}

impl ForegroundStrategy {
    pub fn new(audio: Arc<dyn AudioDriver>) -> Self {
        Self {
            audio,
            playing: Mutex::new(None),
        }
    }
}

#[async_trait]
impl AlarmPlaybackStrategy for ForegroundStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Foreground
    }

    fn requires_chain_notifications(&self) -> bool {
        false
    }

    async fn activate(&self, context: &AlarmContext) -> Result<()> {
        let mut playing = self.playing.lock().await;
        if playing.as_ref() == Some(&context.alarm_id) {
            return Ok(());
        }
        if playing.is_some() {
            self.audio.stop();
            self.audio.stop_vibration();
        }

        // Vibration still signals the alarm when the sound cannot start.
        self.audio.start_vibration();
        *playing = Some(context.alarm_id.clone());
        if let Err(e) = self.audio.play(context.audio.as_ref(), true) {
            warn!(alarm_id = %context.alarm_id, error = %e, "local playback failed");
            return Err(e);
        }
        debug!(alarm_id = %context.alarm_id, "foreground playback started");
        Ok(())
    }

    async fn deactivate(&self) {
        let mut playing = self.playing.lock().await;
        if playing.take().is_some() {
            self.audio.stop();
            self.audio.stop_vibration();
            debug!("foreground playback stopped");
        }
    }
}
