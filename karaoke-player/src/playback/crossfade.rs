//! Crossfade orchestrator
//!
//! **State machine:**
//! ```text
//! Idle ──begin_preload──> Preloading ──start_fade──> Fading ──progress 1.0──> Completed ──> Idle
//!                              │                       │
//!                              └──────cancel───────────┴──> Cancelled ──> Idle
//! ```
//!
//! All transitions run on the playback core task, so the session needs no
//! locking. Engine volume is the curve level multiplied by the global volume.
//! Standby is silent and black whenever no fade is running.

use crate::config::CrossfadeDuration;
use crate::engine::EnginePool;
use karaoke_common::events::{CancelReason, EngineRole, EventBus, KaraokeEvent};
use karaoke_common::{FadeCurve, MediaHandle, MediaId};
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Orchestrator state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossfadePhase {
    /// No candidate in Standby
    Idle,
    /// Standby holds (or is loading) the next candidate
    Preloading,
    /// Both engines playing, levels ramping
    Fading,
    /// Fade finished and roles swapped (transient)
    Completed,
    /// Fade or preload abandoned (transient)
    Cancelled,
}

impl std::fmt::Display for CrossfadePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CrossfadePhase::Idle => write!(f, "idle"),
            CrossfadePhase::Preloading => write!(f, "preloading"),
            CrossfadePhase::Fading => write!(f, "fading"),
            CrossfadePhase::Completed => write!(f, "completed"),
            CrossfadePhase::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A running fade
#[derive(Debug, Clone)]
pub struct CrossfadeSession {
    pub from: MediaId,
    pub to: MediaId,
    pub started_at: Instant,
    pub duration: CrossfadeDuration,
    pub curve: FadeCurve,

    /// Fade time actually played (pauses excluded)
    pub elapsed: Duration,

    /// Normalized progress (0.0-1.0)
    pub progress: f32,

    last_step: Instant,
}

/// Result of a fade step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Still fading (or not fading at all)
    Continue,
    /// Fade reached 1.0; roles swapped
    Completed { from: MediaId, to: MediaId },
}

/// Drives Standby preload and the Active → Standby fade
#[derive(Debug)]
pub struct CrossfadeOrchestrator {
    phase: CrossfadePhase,
    session: Option<CrossfadeSession>,
    bus: EventBus,
}

impl CrossfadeOrchestrator {
    pub fn new(bus: EventBus) -> Self {
        Self {
            phase: CrossfadePhase::Idle,
            session: None,
            bus,
        }
    }

    pub fn phase(&self) -> CrossfadePhase {
        self.phase
    }

    pub fn is_fading(&self) -> bool {
        self.phase == CrossfadePhase::Fading
    }

    pub fn session(&self) -> Option<&CrossfadeSession> {
        self.session.as_ref()
    }

    /// Current fade progress, if fading
    pub fn progress(&self) -> Option<f32> {
        self.session.as_ref().map(|s| s.progress)
    }

    fn transition(&mut self, to: CrossfadePhase) {
        if self.phase != to {
            debug!("Crossfade {} -> {}", self.phase, to);
            self.phase = to;
        }
    }

    /// Idle/Preloading → Preloading: load `handle` into Standby
    ///
    /// Any previous Standby candidate is replaced. Ignored while fading.
    pub fn begin_preload(&mut self, pool: &mut EnginePool, handle: &MediaHandle, now: Instant) {
        if self.is_fading() {
            return;
        }
        pool.load_standby(handle, now);
        self.transition(CrossfadePhase::Preloading);
    }

    /// Preloading → Fading: start the Standby engine silent and black
    ///
    /// Returns `false` (and stays put) unless both slots hold a track and
    /// Standby is loaded.
    pub fn start_fade(
        &mut self,
        pool: &mut EnginePool,
        duration: CrossfadeDuration,
        curve: FadeCurve,
        now: Instant,
    ) -> bool {
        if self.is_fading() || !pool.is_ready(EngineRole::Standby) {
            return false;
        }
        let (Some(from), Some(to)) = (
            pool.media_id(EngineRole::Active),
            pool.media_id(EngineRole::Standby),
        ) else {
            return false;
        };

        pool.set_volume(EngineRole::Standby, 0.0);
        pool.set_opacity(EngineRole::Standby, 0.0);
        pool.play(EngineRole::Standby);

        self.session = Some(CrossfadeSession {
            from,
            to,
            started_at: now,
            duration,
            curve,
            elapsed: Duration::ZERO,
            progress: 0.0,
            last_step: now,
        });
        self.transition(CrossfadePhase::Fading);

        info!("Crossfade started ({}s, {})", duration.seconds(), curve);
        self.bus.emit_lossy(KaraokeEvent::CrossfadeStarted {
            from_media_id: from,
            to_media_id: to,
            duration_seconds: duration.seconds(),
            timestamp: chrono::Utc::now(),
        });
        true
    }

    /// Advance the fade by the time since the previous step
    ///
    /// Time only accumulates while `playing`, so a paused fade stays frozen.
    pub fn step(
        &mut self,
        pool: &mut EnginePool,
        global_volume: f32,
        playing: bool,
        now: Instant,
    ) -> StepOutcome {
        let Some(session) = self.session.as_mut() else {
            return StepOutcome::Continue;
        };

        let delta = now.saturating_duration_since(session.last_step);
        session.last_step = now;
        if playing {
            session.elapsed += delta;
        }

        let progress =
            (session.elapsed.as_secs_f64() / session.duration.as_secs_f64()).clamp(0.0, 1.0) as f32;
        session.progress = progress;
        let levels = session.curve.levels(progress);

        pool.set_volume(EngineRole::Active, levels.outgoing_volume * global_volume);
        pool.set_volume(EngineRole::Standby, levels.incoming_volume * global_volume);
        pool.set_opacity(EngineRole::Active, levels.outgoing_opacity);
        pool.set_opacity(EngineRole::Standby, levels.incoming_opacity);

        self.bus.emit_lossy(KaraokeEvent::CrossfadeProgress {
            progress,
            timestamp: chrono::Utc::now(),
        });

        if progress >= 1.0 {
            match self.complete(pool, global_volume) {
                Some((from, to)) => StepOutcome::Completed { from, to },
                None => StepOutcome::Continue,
            }
        } else {
            StepOutcome::Continue
        }
    }

    /// Fading → Completed → Idle: swap roles and retire the old Active
    ///
    /// Also used to finish early when the outgoing track ends or fails
    /// mid-fade. Returns the (from, to) pair.
    pub fn complete(
        &mut self,
        pool: &mut EnginePool,
        global_volume: f32,
    ) -> Option<(MediaId, MediaId)> {
        let session = self.session.take()?;

        pool.swap_roles();

        pool.set_volume(EngineRole::Standby, 0.0);
        pool.set_opacity(EngineRole::Standby, 0.0);
        pool.stop(EngineRole::Standby);
        pool.clear(EngineRole::Standby);

        pool.set_volume(EngineRole::Active, global_volume);
        pool.set_opacity(EngineRole::Active, 1.0);

        self.transition(CrossfadePhase::Completed);
        info!(
            "Crossfade completed after {:.2}s",
            session.elapsed.as_secs_f64()
        );
        self.bus.emit_lossy(KaraokeEvent::CrossfadeCompleted {
            from_media_id: session.from,
            to_media_id: session.to,
            timestamp: chrono::Utc::now(),
        });
        self.transition(CrossfadePhase::Idle);

        Some((session.from, session.to))
    }

    /// Preloading → Idle without a fade: cut straight to the Standby track
    ///
    /// Returns the (from, to) pair, or `None` when Standby is not loaded.
    pub fn switch_abrupt(
        &mut self,
        pool: &mut EnginePool,
        global_volume: f32,
    ) -> Option<(Option<MediaId>, MediaId)> {
        if self.is_fading() || !pool.is_ready(EngineRole::Standby) {
            return None;
        }
        let to = pool.media_id(EngineRole::Standby)?;
        let from = pool.media_id(EngineRole::Active);

        pool.stop(EngineRole::Active);
        pool.swap_roles();
        pool.clear(EngineRole::Standby);

        pool.set_volume(EngineRole::Active, global_volume);
        pool.set_opacity(EngineRole::Active, 1.0);
        pool.play(EngineRole::Active);

        self.transition(CrossfadePhase::Idle);
        Some((from, to))
    }

    /// Any state → Cancelled → Idle
    ///
    /// Active returns to full level; Standby is silenced, stopped and
    /// emptied before this returns. Emits `CrossfadeCancelled` when there was
    /// a candidate to discard.
    pub fn cancel(&mut self, pool: &mut EnginePool, reason: CancelReason, global_volume: f32) {
        let to = pool.media_id(EngineRole::Standby);
        let was_active = self.phase != CrossfadePhase::Idle || to.is_some();
        self.session = None;

        pool.set_volume(EngineRole::Standby, 0.0);
        pool.set_opacity(EngineRole::Standby, 0.0);
        pool.stop(EngineRole::Standby);
        pool.clear(EngineRole::Standby);

        if pool.handle(EngineRole::Active).is_some() {
            pool.set_volume(EngineRole::Active, global_volume);
            pool.set_opacity(EngineRole::Active, 1.0);
        }

        if !was_active {
            return;
        }

        self.transition(CrossfadePhase::Cancelled);
        info!("Crossfade cancelled: {}", reason);
        self.bus.emit_lossy(KaraokeEvent::CrossfadeCancelled {
            from_media_id: pool.media_id(EngineRole::Active),
            to_media_id: to,
            reason,
            timestamp: chrono::Utc::now(),
        });
        self.transition(CrossfadePhase::Idle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineSignal, LoadBehavior, SimulatedLibrary};
    use karaoke_common::events::PlaybackState;
    use karaoke_common::MediaType;
    use tokio::sync::mpsc;

    struct Fixture {
        pool: EnginePool,
        orchestrator: CrossfadeOrchestrator,
        signals: mpsc::UnboundedReceiver<EngineSignal>,
        bus: EventBus,
    }

    fn fixture() -> Fixture {
        let library = SimulatedLibrary::with_default(LoadBehavior::Ok { latency_ms: 10 });
        let (tx, rx) = mpsc::unbounded_channel();
        let bus = EventBus::new(1024);
        Fixture {
            pool: EnginePool::new(library.factory(), tx, bus.clone()),
            orchestrator: CrossfadeOrchestrator::new(bus.clone()),
            signals: rx,
            bus,
        }
    }

    fn track(name: &str, seconds: f64) -> MediaHandle {
        MediaHandle::new(format!("/songs/{}.mp4", name), seconds, MediaType::Video)
    }

    impl Fixture {
        async fn settle(&mut self) {
            tokio::time::sleep(Duration::from_millis(20)).await;
            while let Ok(signal) = self.signals.try_recv() {
                self.pool.accept_signal(&signal);
            }
        }

        /// Active playing `a` at full level, Standby holding `b`
        async fn playing_with_candidate(&mut self, a: &MediaHandle, b: &MediaHandle) {
            self.pool.load_active(a, Instant::now());
            self.settle().await;
            self.pool.set_volume(EngineRole::Active, 1.0);
            self.pool.set_opacity(EngineRole::Active, 1.0);
            self.pool.play(EngineRole::Active);
            self.orchestrator
                .begin_preload(&mut self.pool, b, Instant::now());
            self.settle().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fade_ramps_and_completes() {
        let mut f = fixture();
        let (a, b) = (track("a", 180.0), track("b", 200.0));
        f.playing_with_candidate(&a, &b).await;
        assert_eq!(f.orchestrator.phase(), CrossfadePhase::Preloading);

        let start = Instant::now();
        let duration = CrossfadeDuration::new(4).unwrap();
        assert!(f
            .orchestrator
            .start_fade(&mut f.pool, duration, FadeCurve::Linear, start));
        assert_eq!(f.pool.state(EngineRole::Standby), PlaybackState::Playing);

        let outcome = f.orchestrator.step(
            &mut f.pool,
            1.0,
            true,
            start + Duration::from_millis(1000),
        );
        assert_eq!(outcome, StepOutcome::Continue);
        assert!((f.pool.volume(EngineRole::Active) - 0.75).abs() < 1e-6);
        assert!((f.pool.volume(EngineRole::Standby) - 0.25).abs() < 1e-6);
        assert!((f.pool.opacity(EngineRole::Active) - 0.5).abs() < 1e-6);
        assert_eq!(f.pool.opacity(EngineRole::Standby), 0.0);

        let outcome = f.orchestrator.step(
            &mut f.pool,
            1.0,
            true,
            start + Duration::from_millis(4000),
        );
        assert_eq!(
            outcome,
            StepOutcome::Completed {
                from: a.id,
                to: b.id
            }
        );
        assert_eq!(f.orchestrator.phase(), CrossfadePhase::Idle);
        assert_eq!(f.pool.media_id(EngineRole::Active), Some(b.id));
        assert_eq!(f.pool.handle(EngineRole::Standby), None);
        assert_eq!(f.pool.volume(EngineRole::Active), 1.0);
        assert_eq!(f.pool.volume(EngineRole::Standby), 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_global_volume_scales_levels() {
        let mut f = fixture();
        f.playing_with_candidate(&track("a", 60.0), &track("b", 60.0))
            .await;

        let start = Instant::now();
        f.orchestrator.start_fade(
            &mut f.pool,
            CrossfadeDuration::new(2).unwrap(),
            FadeCurve::Linear,
            start,
        );
        f.orchestrator
            .step(&mut f.pool, 0.5, true, start + Duration::from_secs(1));

        assert!((f.pool.volume(EngineRole::Active) - 0.25).abs() < 1e-6);
        assert!((f.pool.volume(EngineRole::Standby) - 0.25).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_paused_fade_does_not_advance() {
        let mut f = fixture();
        f.playing_with_candidate(&track("a", 60.0), &track("b", 60.0))
            .await;

        let start = Instant::now();
        f.orchestrator.start_fade(
            &mut f.pool,
            CrossfadeDuration::new(5).unwrap(),
            FadeCurve::Linear,
            start,
        );
        f.orchestrator
            .step(&mut f.pool, 1.0, true, start + Duration::from_secs(1));
        f.orchestrator
            .step(&mut f.pool, 1.0, false, start + Duration::from_secs(30));

        let progress = f.orchestrator.progress().unwrap();
        assert!((progress - 0.2).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_restores_active_and_silences_standby() {
        let mut f = fixture();
        let (a, b) = (track("a", 60.0), track("b", 60.0));
        f.playing_with_candidate(&a, &b).await;
        let mut rx = f.bus.subscribe();

        let start = Instant::now();
        f.orchestrator.start_fade(
            &mut f.pool,
            CrossfadeDuration::new(5).unwrap(),
            FadeCurve::Linear,
            start,
        );
        f.orchestrator
            .step(&mut f.pool, 0.8, true, start + Duration::from_secs(2));

        f.orchestrator
            .cancel(&mut f.pool, CancelReason::ManualSkip, 0.8);

        assert_eq!(f.orchestrator.phase(), CrossfadePhase::Idle);
        assert!(f.orchestrator.session().is_none());
        assert_eq!(f.pool.volume(EngineRole::Active), 0.8);
        assert_eq!(f.pool.opacity(EngineRole::Active), 1.0);
        assert_eq!(f.pool.volume(EngineRole::Standby), 0.0);
        assert_eq!(f.pool.handle(EngineRole::Standby), None);
        assert_eq!(f.pool.media_id(EngineRole::Active), Some(a.id));

        let mut cancelled = None;
        while let Ok(event) = rx.try_recv() {
            if let KaraokeEvent::CrossfadeCancelled {
                from_media_id,
                to_media_id,
                reason,
                ..
            } = event
            {
                cancelled = Some((from_media_id, to_media_id, reason));
            }
        }
        assert_eq!(
            cancelled,
            Some((Some(a.id), Some(b.id), CancelReason::ManualSkip))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_when_idle_is_silent() {
        let mut f = fixture();
        let mut rx = f.bus.subscribe();

        f.orchestrator
            .cancel(&mut f.pool, CancelReason::Stopped, 1.0);

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_fade_requires_loaded_standby() {
        let mut f = fixture();
        let a = track("a", 60.0);
        f.pool.load_active(&a, Instant::now());
        f.settle().await;
        f.pool.play(EngineRole::Active);
        f.orchestrator
            .begin_preload(&mut f.pool, &track("b", 60.0), Instant::now());

        assert!(!f.orchestrator.start_fade(
            &mut f.pool,
            CrossfadeDuration::default(),
            FadeCurve::Linear,
            Instant::now()
        ));
        assert_eq!(f.orchestrator.phase(), CrossfadePhase::Preloading);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abrupt_switch_swaps_without_fade() {
        let mut f = fixture();
        let (a, b) = (track("a", 60.0), track("b", 60.0));
        f.playing_with_candidate(&a, &b).await;

        let switched = f.orchestrator.switch_abrupt(&mut f.pool, 0.6);

        assert_eq!(switched, Some((Some(a.id), b.id)));
        assert_eq!(f.pool.media_id(EngineRole::Active), Some(b.id));
        assert_eq!(f.pool.state(EngineRole::Active), PlaybackState::Playing);
        assert_eq!(f.pool.volume(EngineRole::Active), 0.6);
        assert_eq!(f.pool.handle(EngineRole::Standby), None);
        assert_eq!(f.orchestrator.phase(), CrossfadePhase::Idle);
    }
}
