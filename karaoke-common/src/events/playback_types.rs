//! Playback-related type definitions
//!
//! Supporting types for playback state, engine roles and failure reporting.

use serde::{Deserialize, Serialize};

/// Playback state enumeration
///
/// Each engine slot carries one of the first five values. The effective
/// player state mirrors the Active slot, except `WaitingForNext`, which only
/// the effective state takes when the queue has nothing left to play.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
    Buffering,
    Error,
    /// Queue exhausted; distinct from Error
    WaitingForNext,
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Stopped => write!(f, "stopped"),
            PlaybackState::Playing => write!(f, "playing"),
            PlaybackState::Paused => write!(f, "paused"),
            PlaybackState::Buffering => write!(f, "buffering"),
            PlaybackState::Error => write!(f, "error"),
            PlaybackState::WaitingForNext => write!(f, "waiting_for_next"),
        }
    }
}

/// Role an engine slot currently holds
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EngineRole {
    /// Audible/visible engine
    Active,
    /// Silently pre-buffered engine
    Standby,
}

impl EngineRole {
    pub fn other(self) -> Self {
        match self {
            EngineRole::Active => EngineRole::Standby,
            EngineRole::Standby => EngineRole::Active,
        }
    }
}

impl std::fmt::Display for EngineRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineRole::Active => write!(f, "active"),
            EngineRole::Standby => write!(f, "standby"),
        }
    }
}

/// Physical engine slot (two exist for the controller's lifetime)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SlotId {
    A,
    B,
}

impl SlotId {
    pub fn index(self) -> usize {
        match self {
            SlotId::A => 0,
            SlotId::B => 1,
        }
    }

    pub fn from_index(index: usize) -> Self {
        if index == 0 {
            SlotId::A
        } else {
            SlotId::B
        }
    }
}

impl std::fmt::Display for SlotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SlotId::A => write!(f, "A"),
            SlotId::B => write!(f, "B"),
        }
    }
}

/// Engine failure taxonomy
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Corrupt or missing file
    LoadFailure,
    /// Output device unavailable
    DeviceFailure,
    /// Load did not complete within the preload timeout
    PreloadTimeout,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::LoadFailure => write!(f, "load failure"),
            FailureKind::DeviceFailure => write!(f, "device failure"),
            FailureKind::PreloadTimeout => write!(f, "preload timeout"),
        }
    }
}

/// Why a crossfade (or its preload) was abandoned
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// Standby failed to load, timed out, or lost its device
    PreloadFailed,
    /// User skipped to the next track
    ManualSkip,
    /// Playback stopped
    Stopped,
    /// Active was repositioned
    Seek,
    /// Queue mutation changed the predicted candidate
    QueueChanged,
    /// An explicit preload or play request replaced the candidate
    Replaced,
}

impl std::fmt::Display for CancelReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CancelReason::PreloadFailed => write!(f, "preload failed"),
            CancelReason::ManualSkip => write!(f, "manual skip"),
            CancelReason::Stopped => write!(f, "stopped"),
            CancelReason::Seek => write!(f, "seek"),
            CancelReason::QueueChanged => write!(f, "queue changed"),
            CancelReason::Replaced => write!(f, "replaced"),
        }
    }
}
