//! Playback facade
//!
//! `PlaybackController` is the public contract of the player. It is a cheap,
//! cloneable handle to the core task:
//! - Arguments are validated on the caller's task; invalid input fails fast
//!   with no state change
//! - Transport commands go to the core with an acknowledgement, so a call
//!   returns once the core has applied it
//! - Settings changes go through the `watch` channel; unchanged values are
//!   idempotent no-ops that never reach the core
//!
//! Engine failures never surface here. They arrive as `PlaybackError` events.

use crate::config::{validate_volume, CrossfadeDuration, EngineConfig, PlaybackSettings, TomlConfig};
use crate::engine::EngineFactory;
use crate::error::{Error, Result};
use crate::playback::{AdvanceController, Command, ControlMessage, PlaybackCore};
use crate::source::TrackSource;
use crate::state::{PlayerStatus, SharedState};
use karaoke_common::events::{EventBus, KaraokeEvent};
use karaoke_common::{FadeCurve, MediaHandle};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::info;

/// Pending commands buffered between the facade and the core
const COMMAND_CHANNEL_CAPACITY: usize = 64;

/// Handle to a running playback core
#[derive(Clone)]
pub struct PlaybackController {
    commands: mpsc::Sender<ControlMessage>,
    settings: Arc<watch::Sender<PlaybackSettings>>,
    bus: EventBus,
    state: Arc<SharedState>,
}

impl PlaybackController {
    /// Start a core configured from a bootstrap TOML config
    pub fn spawn(
        factory: EngineFactory,
        source: Arc<dyn TrackSource>,
        config: &TomlConfig,
    ) -> Result<(Self, JoinHandle<()>)> {
        Self::spawn_with(
            factory,
            source,
            config.engine.clone(),
            config.playback.clone(),
            AdvanceController::new(),
        )
    }

    /// Start a core with explicit engine timing, initial settings and
    /// advance controller (e.g. a seeded shuffle)
    pub fn spawn_with(
        factory: EngineFactory,
        source: Arc<dyn TrackSource>,
        engine: EngineConfig,
        settings: PlaybackSettings,
        advance: AdvanceController,
    ) -> Result<(Self, JoinHandle<()>)> {
        engine.validate()?;
        settings.validate()?;

        let bus = EventBus::new(engine.event_capacity);
        let state = Arc::new(SharedState::new());
        let (settings_tx, settings_rx) = watch::channel(settings);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);

        let core = PlaybackCore::new(
            factory,
            source,
            settings_rx,
            engine,
            bus.clone(),
            Arc::clone(&state),
            advance,
        );
        let task = tokio::spawn(core.run(command_rx));

        info!("Playback controller started");
        Ok((
            Self {
                commands: command_tx,
                settings: Arc::new(settings_tx),
                bus,
                state,
            },
            task,
        ))
    }

    async fn send(&self, command: Command) -> Result<()> {
        let (message, done) = ControlMessage::new(command);
        self.commands
            .send(message)
            .await
            .map_err(|_| Error::ControllerStopped)?;
        done.await.map_err(|_| Error::ControllerStopped)
    }

    /// Apply a settings change; the core only hears about real changes
    async fn update_settings(
        &self,
        modify: impl FnOnce(&mut PlaybackSettings) -> bool,
    ) -> Result<()> {
        if self.commands.is_closed() {
            return Err(Error::ControllerStopped);
        }
        if self.settings.send_if_modified(modify) {
            self.send(Command::Reconfigure).await
        } else {
            Ok(())
        }
    }

    // ========================================
    // Transport
    // ========================================

    /// Load `handle` into the Active engine and start it when ready
    pub async fn play(&self, handle: MediaHandle) -> Result<()> {
        self.send(Command::Play(handle)).await
    }

    pub async fn pause(&self) -> Result<()> {
        self.send(Command::Pause).await
    }

    /// Continue after pause or stop, or leave a hold at end of track
    pub async fn resume(&self) -> Result<()> {
        self.send(Command::Resume).await
    }

    /// Stop both engines; Standby is silent and empty when this returns
    pub async fn stop(&self) -> Result<()> {
        self.send(Command::Stop).await
    }

    /// Reposition the Active track
    ///
    /// Targets past the end are clamped to the duration. Cancels a running
    /// fade.
    pub async fn seek(&self, seconds: f64) -> Result<()> {
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(Error::InvalidSeek(seconds));
        }
        self.send(Command::Seek(seconds)).await
    }

    /// Cut to the next candidate immediately
    pub async fn skip_next(&self) -> Result<()> {
        self.send(Command::SkipNext).await
    }

    /// Name the track to play next, replacing the predicted candidate
    pub async fn preload_next(&self, handle: MediaHandle) -> Result<()> {
        self.send(Command::PreloadNext(handle)).await
    }

    // ========================================
    // Settings
    // ========================================

    /// Set global volume (0.0-1.0)
    pub async fn set_volume(&self, level: f32) -> Result<()> {
        let level = validate_volume(level)?;
        self.update_settings(|s| {
            if s.global_volume == level {
                return false;
            }
            s.global_volume = level;
            true
        })
        .await
    }

    /// Turn crossfading on or off and set the window length (1-20 seconds)
    ///
    /// The duration is validated even when disabling.
    pub async fn enable_crossfade(&self, enabled: bool, duration_seconds: u32) -> Result<()> {
        let duration = CrossfadeDuration::new(duration_seconds)?;
        self.update_settings(|s| {
            if s.crossfade_enabled == enabled && s.crossfade_duration == duration {
                return false;
            }
            s.crossfade_enabled = enabled;
            s.crossfade_duration = duration;
            true
        })
        .await
    }

    pub async fn toggle_subtitles(&self, enabled: bool) -> Result<()> {
        self.update_settings(|s| {
            if s.subtitles_enabled == enabled {
                return false;
            }
            s.subtitles_enabled = enabled;
            true
        })
        .await
    }

    pub async fn set_shuffle(&self, enabled: bool) -> Result<()> {
        self.update_settings(|s| {
            if s.shuffle_enabled == enabled {
                return false;
            }
            s.shuffle_enabled = enabled;
            true
        })
        .await
    }

    pub async fn set_continuous(&self, enabled: bool) -> Result<()> {
        self.update_settings(|s| {
            if s.continuous_playback_enabled == enabled {
                return false;
            }
            s.continuous_playback_enabled = enabled;
            true
        })
        .await
    }

    pub async fn set_repeat(&self, enabled: bool) -> Result<()> {
        self.update_settings(|s| {
            if s.repeat_enabled == enabled {
                return false;
            }
            s.repeat_enabled = enabled;
            true
        })
        .await
    }

    pub async fn set_fade_curve(&self, curve: FadeCurve) -> Result<()> {
        self.update_settings(|s| {
            if s.fade_curve == curve {
                return false;
            }
            s.fade_curve = curve;
            true
        })
        .await
    }

    /// Current settings snapshot
    pub fn settings(&self) -> PlaybackSettings {
        self.settings.borrow().clone()
    }

    /// Sender for an external settings layer
    ///
    /// Values pushed here are applied at the next tick. A snapshot that
    /// fails validation is logged and skipped; the core keeps the last
    /// valid one.
    pub fn settings_sender(&self) -> Arc<watch::Sender<PlaybackSettings>> {
        Arc::clone(&self.settings)
    }

    // ========================================
    // Observation
    // ========================================

    /// Latest status snapshot published by the core
    pub async fn status(&self) -> PlayerStatus {
        self.state.get_status().await
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<KaraokeEvent> {
        self.bus.subscribe()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn shared_state(&self) -> Arc<SharedState> {
        Arc::clone(&self.state)
    }

    /// Stop both engines and end the core task
    pub async fn shutdown(&self) -> Result<()> {
        self.send(Command::Shutdown).await
    }
}
