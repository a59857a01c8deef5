//! Event types for the karaoke playback core
//!
//! Provides the shared event definitions and the EventBus consumed by UI and
//! settings layers.

mod playback_types;

pub use playback_types::{CancelReason, EngineRole, FailureKind, PlaybackState, SlotId};

use crate::media::{MediaHandle, MediaId};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Playback core events
///
/// Events are broadcast via EventBus and can be serialized (tagged by `type`)
/// so a UI layer can forward them verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum KaraokeEvent {
    /// Effective playback state changed
    ///
    /// Mirrors the Active engine, or `WaitingForNext` when the queue ran dry.
    StateChanged {
        /// State before change
        old_state: PlaybackState,
        /// State after change
        new_state: PlaybackState,
        /// When state changed
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Active position update
    ///
    /// Emitted periodically while playing (configurable interval, default 1000ms)
    /// and once on every Play/Pause transition.
    TimeChanged {
        /// Track the position refers to
        media_id: MediaId,
        /// Current position in seconds
        position_seconds: f64,
        /// Track duration in seconds
        duration_seconds: f64,
        /// When sampled
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A track became Active and audible
    MediaStarted {
        /// Track now playing
        media: MediaHandle,
        /// When playback started
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Active track finished (natural end or crossfade completion)
    ///
    /// Triggers:
    /// - Advance: hand over to the next candidate
    /// - UI: mark the queue entry as sung
    MediaEnded {
        /// Track that ended
        media: MediaHandle,
        /// When it ended
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Engine failure for a track
    ///
    /// Never raised synchronously from a command; the offending track is
    /// session-marked unplayable and playback moves on.
    PlaybackError {
        /// Offending track
        media: MediaHandle,
        /// Failure classification
        kind: FailureKind,
        /// Human-readable reason
        reason: String,
        /// When the failure was observed
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Queue has nothing left to play
    ///
    /// NOTE: Distinct from an error. The core re-evaluates on the next queue mutation.
    WaitingForNext {
        /// When the queue ran dry
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Crossfade started
    CrossfadeStarted {
        /// Track fading out
        from_media_id: MediaId,
        /// Track fading in
        to_media_id: MediaId,
        /// Fade window length
        duration_seconds: u32,
        /// When the fade started
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Crossfade progress (emitted every tick while fading)
    CrossfadeProgress {
        /// Normalized progress (0.0-1.0)
        progress: f32,
        /// When sampled
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Crossfade completed and engine roles were swapped
    CrossfadeCompleted {
        /// Track that faded out (now stopped)
        from_media_id: MediaId,
        /// Track that faded in (now Active)
        to_media_id: MediaId,
        /// When the swap happened
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Pending crossfade or preload abandoned
    ///
    /// A recovery outcome, not an error: Active keeps playing at full level.
    CrossfadeCancelled {
        /// Active track at cancellation time
        from_media_id: Option<MediaId>,
        /// Standby candidate that was discarded
        to_media_id: Option<MediaId>,
        /// Why it was abandoned
        reason: CancelReason,
        /// When it was cancelled
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// An engine slot changed state
    EngineStateChanged {
        /// Physical slot
        slot: SlotId,
        /// Role the slot held when it changed
        role: EngineRole,
        /// Previous state
        old_state: PlaybackState,
        /// New state
        new_state: PlaybackState,
        /// When state changed
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Global volume changed
    VolumeChanged {
        /// Previous volume (0.0-1.0)
        old_volume: f32,
        /// New volume (0.0-1.0)
        new_volume: f32,
        /// When volume changed
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Subtitle/lyrics overlay toggled
    SubtitlesToggled {
        /// Whether subtitles are now shown
        enabled: bool,
        /// When toggled
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl KaraokeEvent {
    /// Event type name (matches the serialized `type` tag)
    pub fn event_type(&self) -> &'static str {
        match self {
            KaraokeEvent::StateChanged { .. } => "StateChanged",
            KaraokeEvent::TimeChanged { .. } => "TimeChanged",
            KaraokeEvent::MediaStarted { .. } => "MediaStarted",
            KaraokeEvent::MediaEnded { .. } => "MediaEnded",
            KaraokeEvent::PlaybackError { .. } => "PlaybackError",
            KaraokeEvent::WaitingForNext { .. } => "WaitingForNext",
            KaraokeEvent::CrossfadeStarted { .. } => "CrossfadeStarted",
            KaraokeEvent::CrossfadeProgress { .. } => "CrossfadeProgress",
            KaraokeEvent::CrossfadeCompleted { .. } => "CrossfadeCompleted",
            KaraokeEvent::CrossfadeCancelled { .. } => "CrossfadeCancelled",
            KaraokeEvent::EngineStateChanged { .. } => "EngineStateChanged",
            KaraokeEvent::VolumeChanged { .. } => "VolumeChanged",
            KaraokeEvent::SubtitlesToggled { .. } => "SubtitlesToggled",
        }
    }

    /// Serialize to a single JSON line
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block the tick loop)
/// - Multiple concurrent subscribers
/// - Automatic cleanup when subscribers drop
/// - Lagged message detection for slow subscribers
///
/// # Capacity Recommendations
///
/// - Desktop: 1000
/// - Testing: 100-1000
///
/// # Examples
///
/// ```
/// use karaoke_common::events::{EventBus, KaraokeEvent, PlaybackState};
///
/// let event_bus = EventBus::new(1000);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit(KaraokeEvent::StateChanged {
///     old_state: PlaybackState::Paused,
///     new_state: PlaybackState::Playing,
///     timestamp: chrono::Utc::now(),
/// }).ok();
///
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<KaraokeEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before dropping old events
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<KaraokeEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: KaraokeEvent,
    ) -> Result<usize, broadcast::error::SendError<KaraokeEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    ///
    /// The playback core uses this for every event: a headless core with no
    /// UI attached must keep running.
    pub fn emit_lossy(&self, event: KaraokeEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MediaType;

    #[test]
    fn test_eventbus_new() {
        let bus = EventBus::new(100);
        assert_eq!(bus.capacity(), 100);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_eventbus_subscribe() {
        let bus = EventBus::new(100);
        let _rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        let _rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[test]
    fn test_eventbus_emit_no_subscribers() {
        let bus = EventBus::new(100);
        let event = KaraokeEvent::WaitingForNext {
            timestamp: chrono::Utc::now(),
        };

        assert!(bus.emit(event).is_err());
    }

    #[tokio::test]
    async fn test_eventbus_emit_with_subscriber() {
        let bus = EventBus::new(100);
        let mut rx = bus.subscribe();

        let event = KaraokeEvent::StateChanged {
            old_state: PlaybackState::Paused,
            new_state: PlaybackState::Playing,
            timestamp: chrono::Utc::now(),
        };

        assert!(bus.emit(event).is_ok());

        match rx.recv().await.unwrap() {
            KaraokeEvent::StateChanged {
                old_state,
                new_state,
                ..
            } => {
                assert_eq!(old_state, PlaybackState::Paused);
                assert_eq!(new_state, PlaybackState::Playing);
            }
            other => panic!("Wrong event type received: {:?}", other),
        }
    }

    #[test]
    fn test_eventbus_emit_lossy() {
        let bus = EventBus::new(100);
        bus.emit_lossy(KaraokeEvent::CrossfadeProgress {
            progress: 0.5,
            timestamp: chrono::Utc::now(),
        });
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let media = MediaHandle::new("/songs/take_on_me.mp4", 225.0, MediaType::Video);
        let event = KaraokeEvent::PlaybackError {
            media,
            kind: FailureKind::LoadFailure,
            reason: "file not found".to_string(),
            timestamp: chrono::Utc::now(),
        };

        let json = event.to_json().unwrap();
        assert!(json.contains("\"type\":\"PlaybackError\""));
        assert!(json.contains("\"kind\":\"load_failure\""));

        let parsed: KaraokeEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.event_type(), "PlaybackError");
    }

    #[test]
    fn test_role_other() {
        assert_eq!(EngineRole::Active.other(), EngineRole::Standby);
        assert_eq!(EngineRole::Standby.other(), EngineRole::Active);
    }

    #[test]
    fn test_slot_index_roundtrip() {
        assert_eq!(SlotId::from_index(SlotId::A.index()), SlotId::A);
        assert_eq!(SlotId::from_index(SlotId::B.index()), SlotId::B);
    }
}
