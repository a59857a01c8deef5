//! Configuration management for karaoke-player
//!
//! Two tiers:
//! 1. **TOML Bootstrap** (`TomlConfig`): tick cadence, preload timeout, event
//!    bus sizing, logging. Read once at startup.
//! 2. **Runtime settings** (`PlaybackSettings`): crossfade, continuous play,
//!    shuffle, repeat, volume, subtitles. Seeded from the `[playback]` table,
//!    then changed live through the controller; the playback core re-reads a
//!    snapshot at each tick.
//!
//! Every value is validated at configuration time. Out-of-range values are
//! rejected, never silently clamped.

use crate::error::{Error, Result};
use karaoke_common::FadeCurve;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Shortest allowed crossfade window (seconds)
pub const MIN_CROSSFADE_SECONDS: u32 = 1;

/// Longest allowed crossfade window (seconds)
pub const MAX_CROSSFADE_SECONDS: u32 = 20;

/// Fastest supported sampling cadence (10 Hz)
pub const MIN_TICK_INTERVAL_MS: u64 = 100;

/// Slowest supported sampling cadence (4 Hz)
pub const MAX_TICK_INTERVAL_MS: u64 = 250;

/// Crossfade window length, guaranteed to lie within 1-20 seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct CrossfadeDuration(u32);

impl CrossfadeDuration {
    /// Validate and wrap a duration in whole seconds
    pub fn new(seconds: u32) -> Result<Self> {
        if (MIN_CROSSFADE_SECONDS..=MAX_CROSSFADE_SECONDS).contains(&seconds) {
            Ok(Self(seconds))
        } else {
            Err(Error::InvalidCrossfadeDuration(seconds))
        }
    }

    pub fn seconds(&self) -> u32 {
        self.0
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.0 as f64
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_secs(self.0 as u64)
    }
}

impl Default for CrossfadeDuration {
    fn default() -> Self {
        Self(5)
    }
}

impl TryFrom<u32> for CrossfadeDuration {
    type Error = Error;

    fn try_from(seconds: u32) -> Result<Self> {
        Self::new(seconds)
    }
}

impl From<CrossfadeDuration> for u32 {
    fn from(duration: CrossfadeDuration) -> u32 {
        duration.0
    }
}

/// Validate a volume level (0.0-1.0)
pub fn validate_volume(level: f32) -> Result<f32> {
    if level.is_finite() && (0.0..=1.0).contains(&level) {
        Ok(level)
    } else {
        Err(Error::InvalidVolume(level))
    }
}

/// Runtime playback settings
///
/// Changes apply live: the core re-reads this snapshot at each decision point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackSettings {
    /// Fade between tracks instead of cutting
    pub crossfade_enabled: bool,
    /// Fade window length
    pub crossfade_duration: CrossfadeDuration,
    /// Advance automatically when a track ends
    pub continuous_playback_enabled: bool,
    /// Draw candidates from the remaining-unplayed pool at random
    pub shuffle_enabled: bool,
    /// Start over when the queue is exhausted
    pub repeat_enabled: bool,
    /// Master volume (0.0-1.0)
    pub global_volume: f32,
    /// Show subtitle/lyrics overlay when the track has one
    pub subtitles_enabled: bool,
    /// Audio ramp shape used while fading
    pub fade_curve: FadeCurve,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            crossfade_enabled: true,
            crossfade_duration: CrossfadeDuration::default(),
            continuous_playback_enabled: true,
            shuffle_enabled: false,
            repeat_enabled: false,
            global_volume: 0.75,
            subtitles_enabled: true,
            fade_curve: FadeCurve::Linear,
        }
    }
}

impl PlaybackSettings {
    /// Reject values outside their documented ranges
    ///
    /// The crossfade duration is already range-checked by its type.
    pub fn validate(&self) -> Result<()> {
        validate_volume(self.global_volume)?;
        Ok(())
    }
}

/// Tick loop and engine timing configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Scheduler tick / position sampling interval (100-250ms)
    pub tick_interval_ms: u64,
    /// A load not confirmed within this window is treated as failed
    pub preload_timeout_ms: u64,
    /// Interval between TimeChanged events while playing
    pub time_event_interval_ms: u64,
    /// EventBus channel capacity
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,
            preload_timeout_ms: 5000,
            time_event_interval_ms: 1000,
            event_capacity: 1000,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if !(MIN_TICK_INTERVAL_MS..=MAX_TICK_INTERVAL_MS).contains(&self.tick_interval_ms) {
            return Err(Error::InvalidTickInterval(self.tick_interval_ms));
        }
        if self.preload_timeout_ms == 0 {
            return Err(Error::Config("preload_timeout_ms must be positive".to_string()));
        }
        if self.event_capacity == 0 {
            return Err(Error::Config("event_capacity must be positive".to_string()));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn preload_timeout(&self) -> Duration {
        Duration::from_millis(self.preload_timeout_ms)
    }

    pub fn time_event_interval(&self) -> Duration {
        Duration::from_millis(self.time_event_interval_ms)
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub engine: EngineConfig,
    pub playback: PlaybackSettings,
    pub logging: LoggingConfig,
}

impl TomlConfig {
    /// Load from `path` (or defaults when absent) and validate
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config: TomlConfig = karaoke_common::config::load_toml_or_default(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.engine.validate()?;
        self.playback.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crossfade_duration_bounds() {
        assert!(CrossfadeDuration::new(0).is_err());
        assert!(CrossfadeDuration::new(21).is_err());
        assert_eq!(CrossfadeDuration::new(1).unwrap().seconds(), 1);
        assert_eq!(CrossfadeDuration::new(20).unwrap().seconds(), 20);
    }

    #[test]
    fn test_crossfade_duration_rejects_instead_of_clamping() {
        match CrossfadeDuration::new(45) {
            Err(Error::InvalidCrossfadeDuration(45)) => {}
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_volume() {
        assert!(validate_volume(0.0).is_ok());
        assert!(validate_volume(1.0).is_ok());
        assert!(validate_volume(1.01).is_err());
        assert!(validate_volume(-0.1).is_err());
        assert!(validate_volume(f32::NAN).is_err());
    }

    #[test]
    fn test_default_settings_are_valid() {
        let settings = PlaybackSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.crossfade_duration.seconds(), 5);
        assert!(settings.continuous_playback_enabled);
    }

    #[test]
    fn test_engine_config_defaults() {
        let engine = EngineConfig::default();
        assert!(engine.validate().is_ok());
        assert_eq!(engine.tick_interval(), Duration::from_millis(100));
        assert_eq!(engine.preload_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_tick_interval_bounds() {
        let engine = EngineConfig {
            tick_interval_ms: 50,
            ..EngineConfig::default()
        };
        assert!(matches!(engine.validate(), Err(Error::InvalidTickInterval(50))));

        let engine = EngineConfig {
            tick_interval_ms: 500,
            ..EngineConfig::default()
        };
        assert!(engine.validate().is_err());
    }

    #[test]
    fn test_parse_toml() {
        let toml_str = r#"
            [engine]
            tick_interval_ms = 200
            preload_timeout_ms = 3000

            [playback]
            crossfade_duration = 7
            shuffle_enabled = true
            fade_curve = "equal_power"

            [logging]
            level = "debug"
        "#;

        let config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.engine.tick_interval_ms, 200);
        assert_eq!(config.engine.event_capacity, 1000);
        assert_eq!(config.playback.crossfade_duration.seconds(), 7);
        assert!(config.playback.shuffle_enabled);
        assert!(config.playback.crossfade_enabled);
        assert_eq!(config.playback.fade_curve, FadeCurve::EqualPower);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_out_of_range_duration_in_toml_is_rejected() {
        let toml_str = r#"
            [playback]
            crossfade_duration = 30
        "#;

        assert!(toml::from_str::<TomlConfig>(toml_str).is_err());
    }

    #[test]
    fn test_out_of_range_volume_in_toml_is_rejected() {
        let toml_str = r#"
            [playback]
            global_volume = 1.5
        "#;

        let config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert!(matches!(config.validate(), Err(Error::InvalidVolume(_))));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = TomlConfig::load(Some(&dir.path().join("none.toml"))).unwrap();
        assert_eq!(config, TomlConfig::default());
    }
}
