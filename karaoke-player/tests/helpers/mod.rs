//! Shared test harness: a controller over simulated engines on virtual time

#![allow(dead_code)]

use karaoke_common::events::KaraokeEvent;
use karaoke_common::{MediaHandle, MediaType};
use karaoke_player::engine::SimulatedLibrary;
use karaoke_player::playback::AdvanceController;
use karaoke_player::{EngineConfig, PlayQueue, PlaybackController, PlaybackSettings, PlayerStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::TryRecvError};

pub fn track(name: &str, seconds: f64) -> MediaHandle {
    MediaHandle::new(format!("/songs/{}.mp4", name), seconds, MediaType::Video)
}

pub fn settings(crossfade_enabled: bool, crossfade_seconds: u32) -> PlaybackSettings {
    PlaybackSettings {
        crossfade_enabled,
        crossfade_duration: crossfade_seconds.try_into().unwrap(),
        ..PlaybackSettings::default()
    }
}

pub fn engine_config() -> EngineConfig {
    EngineConfig {
        event_capacity: 8192,
        ..EngineConfig::default()
    }
}

pub struct Harness {
    pub controller: PlaybackController,
    pub queue: Arc<PlayQueue>,
    pub library: SimulatedLibrary,
    events: broadcast::Receiver<KaraokeEvent>,
    pub log: Vec<KaraokeEvent>,
}

impl Harness {
    pub fn new(tracks: &[MediaHandle], settings: PlaybackSettings) -> Self {
        Self::with(tracks, settings, engine_config(), SimulatedLibrary::new())
    }

    pub fn with(
        tracks: &[MediaHandle],
        settings: PlaybackSettings,
        engine: EngineConfig,
        library: SimulatedLibrary,
    ) -> Self {
        let queue = Arc::new(PlayQueue::with_entries(tracks.iter().cloned()));
        let (controller, _task) = PlaybackController::spawn_with(
            library.factory(),
            queue.clone(),
            engine,
            settings,
            AdvanceController::with_seed(0x5eed),
        )
        .unwrap();
        let events = controller.subscribe();

        Self {
            controller,
            queue,
            library,
            events,
            log: Vec::new(),
        }
    }

    /// Let virtual time run, then collect emitted events
    pub async fn advance(&mut self, duration: Duration) {
        tokio::time::sleep(duration).await;
        self.collect();
    }

    pub async fn advance_secs(&mut self, seconds: f64) {
        self.advance(Duration::from_secs_f64(seconds)).await;
    }

    pub fn collect(&mut self) {
        loop {
            match self.events.try_recv() {
                Ok(event) => self.log.push(event),
                Err(TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
    }

    pub fn clear_log(&mut self) {
        self.collect();
        self.log.clear();
    }

    pub fn count(&self, event_type: &str) -> usize {
        self.log
            .iter()
            .filter(|e| e.event_type() == event_type)
            .count()
    }

    pub fn position_of(&self, predicate: impl Fn(&KaraokeEvent) -> bool) -> Option<usize> {
        self.log.iter().position(predicate)
    }

    /// Ids of tracks announced by MediaStarted, in order
    pub fn started(&self) -> Vec<karaoke_common::MediaId> {
        self.log
            .iter()
            .filter_map(|e| match e {
                KaraokeEvent::MediaStarted { media, .. } => Some(media.id),
                _ => None,
            })
            .collect()
    }

    /// Ids of tracks announced by MediaEnded, in order
    pub fn ended(&self) -> Vec<karaoke_common::MediaId> {
        self.log
            .iter()
            .filter_map(|e| match e {
                KaraokeEvent::MediaEnded { media, .. } => Some(media.id),
                _ => None,
            })
            .collect()
    }

    pub async fn status(&self) -> PlayerStatus {
        self.controller.status().await
    }
}

/// Structural invariants that must hold after every tick
pub fn assert_invariants(status: &PlayerStatus) {
    use karaoke_common::events::{EngineRole, PlaybackState};
    use karaoke_player::playback::CrossfadePhase;

    let active = status.active.as_ref().expect("active snapshot");
    let standby = status.standby.as_ref().expect("standby snapshot");

    assert_eq!(active.role, EngineRole::Active);
    assert_eq!(standby.role, EngineRole::Standby);
    assert_ne!(active.slot, standby.slot);

    if status.crossfade_phase != CrossfadePhase::Fading {
        assert_eq!(standby.volume, 0.0, "standby audible outside a fade");
        assert_ne!(standby.state, PlaybackState::Playing);
    }
}
