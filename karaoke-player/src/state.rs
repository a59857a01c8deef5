//! Shared player state
//!
//! Read-only view of the playback core, published by the core task after
//! every tick and command. Readers never block the core for long: the core
//! holds the write lock only to swap in a fresh snapshot.

use crate::engine::SlotSnapshot;
use crate::playback::CrossfadePhase;
use karaoke_common::events::PlaybackState;
use karaoke_common::MediaHandle;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

/// Snapshot of the playback core
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerStatus {
    /// Effective state (Active slot, or WaitingForNext)
    pub state: PlaybackState,

    /// Track in the Active slot
    pub current: Option<MediaHandle>,

    /// Active position in seconds
    pub position_seconds: f64,

    /// Active duration in seconds, once known
    pub duration_seconds: Option<f64>,

    pub active: Option<SlotSnapshot>,
    pub standby: Option<SlotSnapshot>,

    pub crossfade_phase: CrossfadePhase,

    /// Fade progress (0.0-1.0) while fading
    pub crossfade_progress: Option<f32>,
}

impl Default for PlayerStatus {
    fn default() -> Self {
        Self {
            state: PlaybackState::Stopped,
            current: None,
            position_seconds: 0.0,
            duration_seconds: None,
            active: None,
            standby: None,
            crossfade_phase: CrossfadePhase::Idle,
            crossfade_progress: None,
        }
    }
}

/// State shared between the core task and controller handles
pub struct SharedState {
    /// Latest published snapshot
    pub status: RwLock<PlayerStatus>,

    /// Scheduler ticks processed since startup
    pub ticks_total: AtomicU64,
}

impl SharedState {
    pub fn new() -> Self {
        Self {
            status: RwLock::new(PlayerStatus::default()),
            ticks_total: AtomicU64::new(0),
        }
    }

    /// Get the latest snapshot
    pub async fn get_status(&self) -> PlayerStatus {
        self.status.read().await.clone()
    }

    /// Replace the snapshot
    pub async fn set_status(&self, status: PlayerStatus) {
        *self.status.write().await = status;
    }

    /// Get effective playback state
    pub async fn get_playback_state(&self) -> PlaybackState {
        self.status.read().await.state
    }

    pub fn increment_ticks(&self) {
        self.ticks_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_ticks(&self) -> u64 {
        self.ticks_total.load(Ordering::Relaxed)
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}
