//! Spacing between consecutive chain links.
//!
//! A link must not start before the previous link's sound has finished,
//! so the spacing is the estimated playback length plus a fixed gap.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::alarm::AudioRef;

/// PCM format assumed for recorded alarm sounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_channels")]
    pub channels: u16,
    #[serde(default = "default_bits_per_sample")]
    pub bits_per_sample: u16,
}

fn default_sample_rate() -> u32 {
    44_100
}
fn default_channels() -> u16 {
    2
}
fn default_bits_per_sample() -> u16 {
    16
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            channels: default_channels(),
            bits_per_sample: default_bits_per_sample(),
        }
    }
}

impl AudioFormat {
    pub fn bytes_per_second(&self) -> f64 {
        f64::from(self.sample_rate) * f64::from(self.channels) * f64::from(self.bits_per_sample)
            / 8.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChainIntervalCalculator {
    pub format: AudioFormat,
    /// Silence between the end of one link's sound and the next link.
    pub link_gap_secs: f64,
    /// Shortest playback length assumed for any sound.
    pub min_audio_secs: f64,
    /// Playback length assumed when the alarm has no custom sound.
    pub default_audio_secs: f64,
}

impl Default for ChainIntervalCalculator {
    fn default() -> Self {
        Self {
            format: AudioFormat::default(),
            link_gap_secs: 1.0,
            min_audio_secs: 1.0,
            default_audio_secs: 30.0,
        }
    }
}

impl ChainIntervalCalculator {
    /// Estimated playback length in seconds, floored at `min_audio_secs`.
    pub fn audio_duration_secs(&self, audio: Option<&AudioRef>) -> f64 {
        let bps = self.format.bytes_per_second();
        let secs = match audio {
            Some(a) if bps > 0.0 => a.byte_size as f64 / bps,
            _ => self.default_audio_secs,
        };
        secs.max(self.min_audio_secs)
    }

    /// Spacing between two consecutive links, millisecond precision.
    pub fn interval(&self, audio: Option<&AudioRef>) -> Duration {
        let secs = self.audio_duration_secs(audio) + self.link_gap_secs.max(0.0);
        Duration::milliseconds((secs * 1000.0).round() as i64)
    }

    /// Fire dates of `count` links starting at `anchor`.
    pub fn link_dates(
        &self,
        anchor: DateTime<Utc>,
        audio: Option<&AudioRef>,
        count: u32,
    ) -> Vec<DateTime<Utc>> {
        let step = self.interval(audio);
        (0..count).map(|i| anchor + step * i as i32).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn cd_quality_byte_rate() {
        assert_eq!(AudioFormat::default().bytes_per_second(), 176_400.0);
    }

    #[test]
    fn interval_is_duration_plus_gap() {
        let calc = ChainIntervalCalculator::default();
        // 6.2 s of 44.1 kHz stereo 16-bit
        let audio = AudioRef::new("wake.caf", 1_093_680);
        assert_eq!(calc.interval(Some(&audio)), Duration::milliseconds(7_200));
    }

    #[test]
    fn tiny_recordings_are_floored() {
        let calc = ChainIntervalCalculator::default();
        let audio = AudioRef::new("blip.caf", 100);
        assert_eq!(calc.interval(Some(&audio)), Duration::seconds(2));
        let empty = AudioRef::new("empty.caf", 0);
        assert_eq!(calc.interval(Some(&empty)), Duration::seconds(2));
    }

    #[test]
    fn default_sound_length_without_custom_audio() {
        let calc = ChainIntervalCalculator::default();
        assert_eq!(calc.interval(None), Duration::seconds(31));
    }

    #[test]
    fn link_dates_are_evenly_spaced() {
        let calc = ChainIntervalCalculator::default();
        let anchor = Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap();
        let dates = calc.link_dates(anchor, None, 3);
        assert_eq!(
            dates,
            vec![anchor, anchor + Duration::seconds(31), anchor + Duration::seconds(62)]
        );
        assert!(calc.link_dates(anchor, None, 0).is_empty());
    }
}
