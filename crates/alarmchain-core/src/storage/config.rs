//! TOML-based engine configuration.
//!
//! Stores the tunables of the scheduling engine:
//! - Pending-slot budget and refill batch size
//! - Chain lengths per priority tier and link spacing
//! - The sample format used to estimate audio length
//! - Default snooze length
//! - The wall-clock offset alarms are expanded in
//!
//! Configuration is stored at `~/.config/alarmchain/config.toml`.

use std::path::{Path, PathBuf};

use chrono::{FixedOffset, Local, Offset};
use serde::{Deserialize, Serialize};

use super::data_dir;
use crate::error::ConfigError;
use crate::queue::{AudioFormat, ChainIntervalCalculator, ChainLengths, QueueSettings};

/// Largest accepted offset from UTC, in minutes.
const MAX_OFFSET_MINUTES: i32 = 23 * 60 + 59;

/// Queue sizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_max_external_slots")]
    pub max_external_slots: usize,
    #[serde(default = "default_quick_refill_batch")]
    pub quick_refill_batch: usize,
}

/// Chain lengths and spacing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainConfig {
    #[serde(default = "default_critical")]
    pub critical: u32,
    #[serde(default = "default_high")]
    pub high: u32,
    #[serde(default = "default_medium")]
    pub medium: u32,
    #[serde(default = "default_low")]
    pub low: u32,
    #[serde(default = "default_one_sec")]
    pub link_gap_secs: f64,
    #[serde(default = "default_one_sec")]
    pub min_audio_secs: f64,
    #[serde(default = "default_audio_secs")]
    pub default_audio_secs: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnoozeConfig {
    #[serde(default = "default_snooze_minutes")]
    pub default_minutes: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClockConfig {
    /// Offset from UTC in minutes. The host's current offset when unset.
    #[serde(default)]
    pub utc_offset_minutes: Option<i32>,
}

/// Engine configuration.
///
/// Serialized to/from TOML at `~/.config/alarmchain/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub chain: ChainConfig,
    #[serde(default)]
    pub audio: AudioFormat,
    #[serde(default)]
    pub snooze: SnoozeConfig,
    #[serde(default)]
    pub clock: ClockConfig,
}

// Default functions
fn default_max_external_slots() -> usize {
    60
}
fn default_quick_refill_batch() -> usize {
    8
}
fn default_critical() -> u32 {
    15
}
fn default_high() -> u32 {
    15
}
fn default_medium() -> u32 {
    8
}
fn default_low() -> u32 {
    4
}
fn default_one_sec() -> f64 {
    1.0
}
fn default_audio_secs() -> f64 {
    30.0
}
fn default_snooze_minutes() -> u32 {
    9
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_external_slots: default_max_external_slots(),
            quick_refill_batch: default_quick_refill_batch(),
        }
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            critical: default_critical(),
            high: default_high(),
            medium: default_medium(),
            low: default_low(),
            link_gap_secs: default_one_sec(),
            min_audio_secs: default_one_sec(),
            default_audio_secs: default_audio_secs(),
        }
    }
}

impl Default for SnoozeConfig {
    fn default() -> Self {
        Self {
            default_minutes: default_snooze_minutes(),
        }
    }
}

impl ChainConfig {
    pub fn lengths(&self) -> ChainLengths {
        ChainLengths {
            critical: self.critical,
            high: self.high,
            medium: self.medium,
            low: self.low,
        }
        .normalized()
    }
}

fn invalid(key: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.into(),
    }
}

impl EngineConfig {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn parse_number(key: &str, value: &str) -> Result<serde_json::Value, ConfigError> {
        if let Ok(n) = value.parse::<i64>() {
            Ok(serde_json::Value::Number(n.into()))
        } else if let Ok(n) = value.parse::<f64>() {
            serde_json::Number::from_f64(n)
                .map(serde_json::Value::Number)
                .ok_or_else(|| invalid(key, format!("cannot parse '{value}' as number")))
        } else {
            Err(invalid(key, format!("cannot parse '{value}' as number")))
        }
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let mut parts = key.split('.').peekable();
        if key.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_none() {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value
                            .parse::<bool>()
                            .map_err(|e| invalid(key, e.to_string()))?,
                    ),
                    // Optional settings: "none" clears them.
                    serde_json::Value::Null | serde_json::Value::Number(_)
                        if value.eq_ignore_ascii_case("none") =>
                    {
                        serde_json::Value::Null
                    }
                    serde_json::Value::Number(_) => Self::parse_number(key, value)?,
                    serde_json::Value::Null => Self::parse_number(key, value)?,
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    /// Default location, `<data_dir>/config.toml`.
    pub fn path() -> Result<PathBuf, ConfigError> {
        let dir = data_dir().map_err(|e| ConfigError::LoadFailed {
            path: PathBuf::from("~/.config/alarmchain"),
            message: e.to_string(),
        })?;
        Ok(dir.join("config.toml"))
    }

    /// Load from the default location, writing defaults when absent.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    /// Load from `path`, writing defaults there when the file does not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let cfg: EngineConfig = toml::from_str(&content)
                    .map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
                cfg.validate()?;
                Ok(cfg)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    /// Persist to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))?;
        Ok(())
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue.max_external_slots == 0 {
            return Err(invalid("queue.max_external_slots", "must be at least 1"));
        }
        if self.queue.quick_refill_batch == 0 {
            return Err(invalid("queue.quick_refill_batch", "must be at least 1"));
        }
        if self.audio.sample_rate == 0 {
            return Err(invalid("audio.sample_rate", "must be positive"));
        }
        if self.audio.channels == 0 {
            return Err(invalid("audio.channels", "must be positive"));
        }
        if self.audio.bits_per_sample == 0 {
            return Err(invalid("audio.bits_per_sample", "must be positive"));
        }
        for (key, secs) in [
            ("chain.min_audio_secs", self.chain.min_audio_secs),
            ("chain.default_audio_secs", self.chain.default_audio_secs),
        ] {
            if !secs.is_finite() || secs <= 0.0 {
                return Err(invalid(key, "must be a positive number of seconds"));
            }
        }
        if !self.chain.link_gap_secs.is_finite() || self.chain.link_gap_secs < 0.0 {
            return Err(invalid("chain.link_gap_secs", "must not be negative"));
        }
        if self.snooze.default_minutes == 0 {
            return Err(invalid("snooze.default_minutes", "must be at least 1"));
        }
        if let Some(m) = self.clock.utc_offset_minutes {
            if m.abs() > MAX_OFFSET_MINUTES {
                return Err(invalid(
                    "clock.utc_offset_minutes",
                    format!("{m} is outside ±{MAX_OFFSET_MINUTES}"),
                ));
            }
        }
        Ok(())
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a value by dot-separated key. The result is validated but not saved.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json =
            serde_json::to_value(&*self).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: EngineConfig =
            serde_json::from_value(json).map_err(|e| invalid(key, e.to_string()))?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Offset alarms are expanded in.
    pub fn utc_offset(&self) -> FixedOffset {
        self.clock
            .utc_offset_minutes
            .and_then(|m| FixedOffset::east_opt(m * 60))
            .unwrap_or_else(|| Local::now().offset().fix())
    }

    pub fn queue_settings(&self) -> QueueSettings {
        QueueSettings {
            max_external_slots: self.queue.max_external_slots,
            quick_refill_batch: self.queue.quick_refill_batch,
            utc_offset: self.utc_offset(),
        }
    }

    pub fn interval_calculator(&self) -> ChainIntervalCalculator {
        ChainIntervalCalculator {
            format: self.audio,
            link_gap_secs: self.chain.link_gap_secs,
            min_audio_secs: self.chain.min_audio_secs,
            default_audio_secs: self.chain.default_audio_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_roundtrip() {
        let cfg = EngineConfig::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: EngineConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, cfg);
        assert_eq!(parsed.queue.max_external_slots, 60);
        assert_eq!(parsed.chain.lengths(), ChainLengths::default());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let cfg: EngineConfig = toml::from_str("[queue]\nmax_external_slots = 40\n").unwrap();
        assert_eq!(cfg.queue.max_external_slots, 40);
        assert_eq!(cfg.queue.quick_refill_batch, 8);
        assert_eq!(cfg.snooze.default_minutes, 9);
        assert_eq!(cfg.audio.sample_rate, 44_100);
        assert_eq!(cfg.clock.utc_offset_minutes, None);
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.get("queue.max_external_slots").as_deref(), Some("60"));
        assert_eq!(cfg.get("chain.link_gap_secs").as_deref(), Some("1.0"));
        assert_eq!(cfg.get("clock.utc_offset_minutes").as_deref(), Some("null"));
        assert!(cfg.get("queue.missing").is_none());
    }

    #[test]
    fn set_updates_nested_values() {
        let mut cfg = EngineConfig::default();
        cfg.set("queue.max_external_slots", "48").unwrap();
        cfg.set("chain.link_gap_secs", "0.5").unwrap();
        cfg.set("clock.utc_offset_minutes", "-300").unwrap();
        assert_eq!(cfg.queue.max_external_slots, 48);
        assert_eq!(cfg.chain.link_gap_secs, 0.5);
        assert_eq!(cfg.clock.utc_offset_minutes, Some(-300));
        assert_eq!(cfg.utc_offset(), FixedOffset::west_opt(5 * 3600).unwrap());

        cfg.set("clock.utc_offset_minutes", "none").unwrap();
        assert_eq!(cfg.clock.utc_offset_minutes, None);
    }

    #[test]
    fn set_rejects_unknown_keys_and_bad_values() {
        let mut cfg = EngineConfig::default();
        assert!(matches!(
            cfg.set("queue.nope", "1"),
            Err(ConfigError::UnknownKey(_))
        ));
        assert!(matches!(
            cfg.set("queue.max_external_slots", "lots"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            cfg.set("queue.max_external_slots", "0"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert_eq!(cfg, EngineConfig::default());
    }

    #[test]
    fn validate_rejects_unusable_values() {
        let mut cfg = EngineConfig::default();
        cfg.audio.sample_rate = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = EngineConfig::default();
        cfg.clock.utc_offset_minutes = Some(24 * 60);
        assert!(cfg.validate().is_err());

        let mut cfg = EngineConfig::default();
        cfg.chain.link_gap_secs = f64::NAN;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn load_from_writes_defaults_then_reads_them_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let first = EngineConfig::load_from(&path).unwrap();
        assert!(path.exists());

        let mut changed = first.clone();
        changed.set("snooze.default_minutes", "5").unwrap();
        changed.save_to(&path).unwrap();
        assert_eq!(EngineConfig::load_from(&path).unwrap().snooze.default_minutes, 5);
    }

    #[test]
    fn configured_values_flow_into_engine_settings() {
        let mut cfg = EngineConfig::default();
        cfg.set("clock.utc_offset_minutes", "540").unwrap();
        cfg.set("chain.default_audio_secs", "10").unwrap();
        let settings = cfg.queue_settings();
        assert_eq!(settings.max_external_slots, 60);
        assert_eq!(settings.utc_offset, FixedOffset::east_opt(9 * 3600).unwrap());
        assert_eq!(
            cfg.interval_calculator().interval(None),
            chrono::Duration::seconds(11)
        );
    }
}
