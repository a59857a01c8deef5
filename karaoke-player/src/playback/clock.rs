//! Transition clock
//!
//! Sampled once per tick while the Active track plays. Decides when the
//! crossfade should begin: at `duration - crossfade` seconds, once per track,
//! provided the Standby candidate is ready. A candidate still loading at
//! trigger time gets one sampling interval of grace; after that the clock
//! gives up on fading this track and the hand-over happens abruptly at the
//! natural end.

use karaoke_common::MediaId;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Readiness of the Standby slot as seen by the clock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StandbyReadiness {
    /// No candidate (queue exhausted or preload discarded)
    Empty,
    /// Candidate assigned, load not yet confirmed
    Loading,
    /// Candidate loaded and playable
    Ready,
}

/// One position sample of the Active track
#[derive(Debug, Clone, Copy)]
pub struct ClockSample {
    pub media_id: MediaId,
    pub position: f64,
    pub duration: Option<f64>,
    pub crossfade_seconds: f64,
    pub standby: StandbyReadiness,
}

/// What the orchestrator should do after a sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockDecision {
    /// Nothing to do yet
    Idle,
    /// Trigger reached with Standby ready: start fading now
    Crossfade,
    /// Trigger reached, Standby still loading: check again next tick
    Defer,
    /// Grace expired: skip the fade for this track, switch at natural end
    AbruptSwitch,
}

/// Once-per-track crossfade trigger
#[derive(Debug)]
pub struct TransitionClock {
    interval: Duration,
    fired_for: Option<MediaId>,
    deferred_since: Option<Instant>,
}

impl TransitionClock {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            fired_for: None,
            deferred_since: None,
        }
    }

    /// Sampling interval (also the deferral grace period)
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Position at which the fade should start
    pub fn trigger_at(duration: f64, crossfade_seconds: f64) -> f64 {
        (duration - crossfade_seconds).max(0.0)
    }

    /// Re-arm for a new track or after a seek
    pub fn reset(&mut self) {
        self.fired_for = None;
        self.deferred_since = None;
    }

    /// Whether the clock already fired (fade or abrupt) for `media_id`
    pub fn has_fired(&self, media_id: MediaId) -> bool {
        self.fired_for == Some(media_id)
    }

    pub fn sample(&mut self, sample: ClockSample, now: Instant) -> ClockDecision {
        match self.fired_for {
            Some(id) if id == sample.media_id => return ClockDecision::Idle,
            Some(_) => self.reset(),
            None => {}
        }

        let Some(duration) = sample.duration else {
            return ClockDecision::Idle;
        };

        let trigger_at = Self::trigger_at(duration, sample.crossfade_seconds);
        if sample.position < trigger_at {
            self.deferred_since = None;
            return ClockDecision::Idle;
        }

        match sample.standby {
            StandbyReadiness::Empty => {
                self.deferred_since = None;
                ClockDecision::Idle
            }
            StandbyReadiness::Ready => {
                debug!(
                    "Crossfade trigger at {:.2}s (trigger point {:.2}s)",
                    sample.position, trigger_at
                );
                self.fired_for = Some(sample.media_id);
                self.deferred_since = None;
                ClockDecision::Crossfade
            }
            StandbyReadiness::Loading => match self.deferred_since {
                None => {
                    debug!("Standby not ready at trigger point, deferring one interval");
                    self.deferred_since = Some(now);
                    ClockDecision::Defer
                }
                Some(since) if now.duration_since(since) >= self.interval => {
                    debug!("Standby still not ready, abandoning fade for this track");
                    self.fired_for = Some(sample.media_id);
                    self.deferred_since = None;
                    ClockDecision::AbruptSwitch
                }
                Some(_) => ClockDecision::Defer,
            },
        }
    }
}
