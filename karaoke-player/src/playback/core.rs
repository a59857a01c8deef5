//! Playback core: the single task that owns both engines
//!
//! **Tick order:**
//! 1. Re-read the settings snapshot
//! 2. Drain queue-change notifications
//! 3. Drain engine signals (load outcomes, track ends, device loss)
//! 4. Expire loads that exceeded the preload timeout
//! 5. Step the running fade, or sample the transition clock
//! 6. Publish events and the status snapshot
//!
//! Commands are handled between ticks, in arrival order. Nothing else
//! touches the pool, the clock or the crossfade session, so none of them
//! need locking.

use super::advance::AdvanceController;
use super::clock::{ClockDecision, ClockSample, StandbyReadiness, TransitionClock};
use super::commands::{Command, ControlMessage};
use super::crossfade::{CrossfadeOrchestrator, StepOutcome};
use crate::config::{EngineConfig, PlaybackSettings};
use crate::engine::{EngineEvent, EngineFactory, EnginePool, EngineSignal, LoadStatus};
use crate::source::TrackSource;
use crate::state::{PlayerStatus, SharedState};
use karaoke_common::events::{
    CancelReason, EngineRole, EventBus, FailureKind, KaraokeEvent, PlaybackState,
};
use karaoke_common::{MediaHandle, MediaId};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Seek targets closer than this to the current position are ignored
const SEEK_TOLERANCE_SECONDS: f64 = 1e-3;

pub struct PlaybackCore {
    pool: EnginePool,
    clock: TransitionClock,
    crossfade: CrossfadeOrchestrator,
    advance: AdvanceController,
    source: Arc<dyn TrackSource>,

    /// Snapshot the core is currently acting on
    settings: PlaybackSettings,
    settings_rx: watch::Receiver<PlaybackSettings>,
    config: EngineConfig,

    signals_rx: mpsc::UnboundedReceiver<EngineSignal>,
    queue_rx: mpsc::UnboundedReceiver<()>,

    bus: EventBus,
    state: Arc<SharedState>,

    /// Queue exhausted; re-evaluated on queue mutation
    waiting: bool,

    /// Active ended with continuous playback off
    held_at_end: bool,

    /// Active is done; switch as soon as Standby is loaded
    pending_handover: bool,

    /// Start the Active engine once its load completes
    start_on_ready: bool,

    /// Paused during a pending hand-over; the next track loads but stays paused
    paused_on_handover: bool,

    /// Position to restore after a device-failure reload
    resume_at: Option<f64>,

    /// Tracks that already used their one device-failure retry
    device_retries: HashSet<MediaId>,

    reported_state: PlaybackState,
    last_time_event: Option<Instant>,
}

impl PlaybackCore {
    pub fn new(
        factory: EngineFactory,
        source: Arc<dyn TrackSource>,
        mut settings_rx: watch::Receiver<PlaybackSettings>,
        config: EngineConfig,
        bus: EventBus,
        state: Arc<SharedState>,
        mut advance: AdvanceController,
    ) -> Self {
        let (signal_tx, signals_rx) = mpsc::unbounded_channel();
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        source.on_queue_changed(Arc::new(move || {
            let _ = queue_tx.send(());
        }));

        let settings = settings_rx.borrow_and_update().clone();
        let mut pool = EnginePool::new(factory, signal_tx, bus.clone());
        pool.set_subtitles(settings.subtitles_enabled);
        if settings.shuffle_enabled {
            advance.refresh_pool(source.as_ref());
        }

        Self {
            pool,
            clock: TransitionClock::new(config.tick_interval()),
            crossfade: CrossfadeOrchestrator::new(bus.clone()),
            advance,
            source,
            settings,
            settings_rx,
            config,
            signals_rx,
            queue_rx,
            bus,
            state,
            waiting: false,
            held_at_end: false,
            pending_handover: false,
            start_on_ready: false,
            paused_on_handover: false,
            resume_at: None,
            device_retries: HashSet::new(),
            reported_state: PlaybackState::Stopped,
            last_time_event: None,
        }
    }

    /// Run until shutdown or until every controller handle is dropped
    pub async fn run(mut self, mut commands: mpsc::Receiver<ControlMessage>) {
        info!(
            "Playback core started (tick {}ms, preload timeout {}ms)",
            self.config.tick_interval_ms, self.config.preload_timeout_ms
        );

        let mut ticker = interval(self.config.tick_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                message = commands.recv() => {
                    let Some(ControlMessage { command, ack }) = message else {
                        info!("All controller handles dropped");
                        break;
                    };
                    let shutdown = matches!(command, Command::Shutdown);
                    self.handle_command(command, Instant::now());
                    self.publish(Instant::now()).await;
                    let _ = ack.send(());
                    if shutdown {
                        break;
                    }
                }

                _ = ticker.tick() => {
                    self.on_tick(Instant::now());
                    self.publish(Instant::now()).await;
                    self.state.increment_ticks();
                }
            }
        }

        self.pool.stop_all();
        info!("Playback core stopped");
    }

    // ========================================
    // Commands
    // ========================================

    fn handle_command(&mut self, command: Command, now: Instant) {
        self.refresh_settings(now);
        debug!("Command: {:?}", command);

        match command {
            Command::Play(handle) => self.play(handle, now),
            Command::Pause => self.pause(),
            Command::Resume => self.resume(now),
            Command::Stop => self.stop(),
            Command::Seek(seconds) => self.seek(seconds, now),
            Command::SkipNext => self.skip_next(now),
            Command::PreloadNext(handle) => self.preload_next(handle, now),
            Command::Reconfigure => {}
            Command::Shutdown => {
                self.cancel_crossfade(CancelReason::Stopped);
                self.pool.stop_all();
            }
        }
    }

    fn play(&mut self, handle: MediaHandle, now: Instant) {
        if self.pool.media_id(EngineRole::Active) == Some(handle.id)
            && !self.waiting
            && (self.pool.state(EngineRole::Active) == PlaybackState::Playing
                || (self.pool.is_loading(EngineRole::Active) && self.start_on_ready))
        {
            return;
        }

        info!("Play requested: {}", handle.display_name());
        self.cancel_crossfade(CancelReason::Replaced);
        self.pool.stop_all();
        self.reset_flow();
        self.pool.load_active(&handle, now);
        self.start_on_ready = true;
    }

    fn pause(&mut self) {
        if self.pending_handover {
            self.paused_on_handover = true;
            return;
        }
        if self.pool.is_loading(EngineRole::Active) {
            self.start_on_ready = false;
        }
        if self.pool.state(EngineRole::Active) != PlaybackState::Playing {
            return;
        }
        self.pool.pause(EngineRole::Active);
        if self.crossfade.is_fading() {
            self.pool.pause(EngineRole::Standby);
        }
    }

    fn resume(&mut self, now: Instant) {
        if self.waiting {
            self.try_start_next(now);
            return;
        }
        if self.held_at_end {
            self.hand_over(now);
            return;
        }
        if self.pending_handover {
            self.paused_on_handover = false;
            return;
        }

        match self.pool.state(EngineRole::Active) {
            PlaybackState::Paused => {
                self.pool.play(EngineRole::Active);
                if self.crossfade.is_fading() {
                    self.pool.play(EngineRole::Standby);
                }
            }
            PlaybackState::Stopped if self.pool.is_ready(EngineRole::Active) => {
                self.pool
                    .set_volume(EngineRole::Active, self.settings.global_volume);
                self.pool.set_opacity(EngineRole::Active, 1.0);
                self.pool.play(EngineRole::Active);
                self.sync_standby(CancelReason::QueueChanged, now);
            }
            PlaybackState::Buffering if self.pool.is_loading(EngineRole::Active) => {
                self.start_on_ready = true;
            }
            _ => {}
        }
    }

    fn stop(&mut self) {
        self.cancel_crossfade(CancelReason::Stopped);
        self.pool.stop_all();
        self.reset_flow();
    }

    fn seek(&mut self, seconds: f64, now: Instant) {
        if !self.pool.is_ready(EngineRole::Active) {
            return;
        }
        let target = match self.pool.duration(EngineRole::Active) {
            Some(duration) => seconds.min(duration),
            None => seconds,
        };
        if (self.pool.position(EngineRole::Active) - target).abs() < SEEK_TOLERANCE_SECONDS {
            return;
        }

        if self.crossfade.is_fading() {
            self.cancel_crossfade(CancelReason::Seek);
        }
        debug!("Seek to {:.2}s", target);
        self.pool.seek(EngineRole::Active, target);
        self.clock.reset();
        self.held_at_end = false;
        self.sync_standby(CancelReason::QueueChanged, now);
    }

    fn skip_next(&mut self, now: Instant) {
        info!("Skip to next requested");
        if self.crossfade.is_fading() {
            self.cancel_crossfade(CancelReason::ManualSkip);
        }
        self.pool.stop(EngineRole::Active);
        self.start_on_ready = false;
        self.resume_at = None;
        if self.waiting {
            self.try_start_next(now);
        } else {
            self.hand_over(now);
        }
    }

    fn preload_next(&mut self, handle: MediaHandle, now: Instant) {
        if self.pool.media_id(EngineRole::Standby) == Some(handle.id) {
            return;
        }

        info!("Preload requested: {}", handle.display_name());
        self.advance.pin(handle.clone());

        if self.waiting {
            self.try_start_next(now);
        } else if self.crossfade.is_fading() {
            debug!("Fade in progress, candidate applies to the following track");
        } else if self.pool.handle(EngineRole::Active).is_none() {
            self.crossfade.begin_preload(&mut self.pool, &handle, now);
        } else {
            self.sync_standby(CancelReason::Replaced, now);
        }
    }

    // ========================================
    // Tick
    // ========================================

    fn on_tick(&mut self, now: Instant) {
        self.refresh_settings(now);
        self.drain_queue_changes(now);
        self.drain_engine_signals(now);
        self.check_load_timeouts(now);

        if self.crossfade.is_fading() {
            self.step_fade(now);
        } else {
            self.sample_clock(now);
        }
    }

    fn refresh_settings(&mut self, now: Instant) {
        if !self.settings_rx.has_changed().unwrap_or(false) {
            return;
        }
        let next = self.settings_rx.borrow_and_update().clone();
        if let Err(e) = next.validate() {
            warn!("Ignoring settings update: {}", e);
            return;
        }
        self.apply_settings(next, now);
    }

    fn apply_settings(&mut self, next: PlaybackSettings, now: Instant) {
        if next == self.settings {
            return;
        }
        let previous = std::mem::replace(&mut self.settings, next);
        let current = self.settings.clone();

        if previous.global_volume != current.global_volume {
            info!(
                "Volume {:.2} -> {:.2}",
                previous.global_volume, current.global_volume
            );
            if !self.crossfade.is_fading() && self.pool.handle(EngineRole::Active).is_some() {
                self.pool
                    .set_volume(EngineRole::Active, current.global_volume);
            }
            self.bus.emit_lossy(KaraokeEvent::VolumeChanged {
                old_volume: previous.global_volume,
                new_volume: current.global_volume,
                timestamp: chrono::Utc::now(),
            });
        }

        if previous.subtitles_enabled != current.subtitles_enabled {
            info!("Subtitles {}", if current.subtitles_enabled { "on" } else { "off" });
            self.pool.set_subtitles(current.subtitles_enabled);
            self.bus.emit_lossy(KaraokeEvent::SubtitlesToggled {
                enabled: current.subtitles_enabled,
                timestamp: chrono::Utc::now(),
            });
        }

        if previous.crossfade_enabled != current.crossfade_enabled
            || previous.crossfade_duration != current.crossfade_duration
            || previous.fade_curve != current.fade_curve
        {
            info!(
                "Crossfade {} ({}s, {})",
                if current.crossfade_enabled { "enabled" } else { "disabled" },
                current.crossfade_duration.seconds(),
                current.fade_curve
            );
        }

        let shuffle_changed = previous.shuffle_enabled != current.shuffle_enabled;
        if shuffle_changed {
            info!("Shuffle {}", if current.shuffle_enabled { "on" } else { "off" });
            if current.shuffle_enabled {
                self.advance.refresh_pool(self.source.as_ref());
            }
            self.advance.clear_prediction();
        }
        if shuffle_changed || previous.repeat_enabled != current.repeat_enabled {
            self.sync_standby(CancelReason::QueueChanged, now);
        }

        if !previous.continuous_playback_enabled && current.continuous_playback_enabled {
            info!("Continuous playback on");
            if self.held_at_end {
                self.hand_over(now);
            } else if self.waiting {
                self.try_start_next(now);
            }
        }
    }

    fn drain_queue_changes(&mut self, now: Instant) {
        let mut changed = false;
        while self.queue_rx.try_recv().is_ok() {
            changed = true;
        }
        if !changed {
            return;
        }

        debug!("Queue changed");
        if self.settings.shuffle_enabled {
            self.advance.refresh_pool(self.source.as_ref());
        }
        if self.waiting {
            if self.settings.continuous_playback_enabled {
                self.try_start_next(now);
            }
            return;
        }
        self.sync_standby(CancelReason::QueueChanged, now);
    }

    fn drain_engine_signals(&mut self, now: Instant) {
        while let Ok(signal) = self.signals_rx.try_recv() {
            let Some(role) = self.pool.accept_signal(&signal) else {
                continue;
            };
            match role {
                EngineRole::Active => self.on_active_signal(signal.event, now),
                EngineRole::Standby => self.on_standby_signal(signal.event, now),
            }
        }
    }

    fn check_load_timeouts(&mut self, now: Instant) {
        let timeout = self.config.preload_timeout();

        for role in [EngineRole::Active, EngineRole::Standby] {
            let LoadStatus::Loading { since } = self.pool.load_status(role) else {
                continue;
            };
            if now.duration_since(since) < timeout {
                continue;
            }

            warn!("{} engine load timed out", role);
            self.pool.abort_load(role);
            let reason = format!(
                "load not confirmed within {}ms",
                self.config.preload_timeout_ms
            );
            match role {
                EngineRole::Active => self.on_active_failed(FailureKind::PreloadTimeout, reason, now),
                EngineRole::Standby => {
                    self.on_standby_failed(FailureKind::PreloadTimeout, reason, now)
                }
            }
        }
    }

    fn step_fade(&mut self, now: Instant) {
        let outgoing = self.pool.handle(EngineRole::Active).cloned();
        let playing = self.pool.state(EngineRole::Active) == PlaybackState::Playing;

        let outcome =
            self.crossfade
                .step(&mut self.pool, self.settings.global_volume, playing, now);

        if let StepOutcome::Completed { .. } = outcome {
            if let Some(media) = outgoing {
                self.bus.emit_lossy(KaraokeEvent::MediaEnded {
                    media,
                    timestamp: chrono::Utc::now(),
                });
            }
            self.on_track_started(now);
        }
    }

    fn sample_clock(&mut self, now: Instant) {
        if !self.settings.crossfade_enabled
            || !self.settings.continuous_playback_enabled
            || self.pending_handover
            || self.held_at_end
            || self.pool.state(EngineRole::Active) != PlaybackState::Playing
        {
            return;
        }
        let Some(media_id) = self.pool.media_id(EngineRole::Active) else {
            return;
        };

        let standby = if self.pool.is_ready(EngineRole::Standby) {
            StandbyReadiness::Ready
        } else if self.pool.is_loading(EngineRole::Standby) {
            StandbyReadiness::Loading
        } else {
            StandbyReadiness::Empty
        };

        let sample = ClockSample {
            media_id,
            position: self.pool.position(EngineRole::Active),
            duration: self.pool.duration(EngineRole::Active),
            crossfade_seconds: self.settings.crossfade_duration.as_secs_f64(),
            standby,
        };

        match self.clock.sample(sample, now) {
            ClockDecision::Crossfade => {
                self.crossfade.start_fade(
                    &mut self.pool,
                    self.settings.crossfade_duration,
                    self.settings.fade_curve,
                    now,
                );
            }
            ClockDecision::AbruptSwitch => {
                info!("Next track not ready at trigger point, switching without fade at track end");
            }
            ClockDecision::Defer | ClockDecision::Idle => {}
        }
    }

    // ========================================
    // Engine signals
    // ========================================

    fn on_active_signal(&mut self, event: EngineEvent, now: Instant) {
        match event {
            EngineEvent::Loaded { .. } => self.on_active_loaded(now),
            EngineEvent::LoadFailed { kind, reason } => self.on_active_failed(kind, reason, now),
            EngineEvent::Ended => self.on_active_ended(now),
            EngineEvent::DeviceLost { reason } => {
                self.on_active_failed(FailureKind::DeviceFailure, reason, now)
            }
        }
    }

    fn on_standby_signal(&mut self, event: EngineEvent, now: Instant) {
        match event {
            EngineEvent::Loaded { .. } => {
                debug!("Standby ready");
                if self.pending_handover {
                    self.hand_over(now);
                }
            }
            EngineEvent::LoadFailed { kind, reason } => self.on_standby_failed(kind, reason, now),
            EngineEvent::DeviceLost { reason } => {
                self.on_standby_failed(FailureKind::DeviceFailure, reason, now)
            }
            EngineEvent::Ended => {
                // Incoming track finished before the fade did
                if !self.crossfade.is_fading() {
                    return;
                }
                let outgoing = self.pool.handle(EngineRole::Active).cloned();
                if self
                    .crossfade
                    .complete(&mut self.pool, self.settings.global_volume)
                    .is_some()
                {
                    if let Some(media) = outgoing {
                        self.bus.emit_lossy(KaraokeEvent::MediaEnded {
                            media,
                            timestamp: chrono::Utc::now(),
                        });
                    }
                    self.on_track_started(now);
                    self.on_active_ended(now);
                }
            }
        }
    }

    fn on_active_loaded(&mut self, now: Instant) {
        if let Some(position) = self.resume_at.take() {
            info!("Active engine reloaded, resuming at {:.1}s", position);
            self.pool.seek(EngineRole::Active, position);
            self.pool
                .set_volume(EngineRole::Active, self.settings.global_volume);
            self.pool.set_opacity(EngineRole::Active, 1.0);
            self.pool.play(EngineRole::Active);
            return;
        }
        if !self.start_on_ready {
            return;
        }

        self.start_on_ready = false;
        self.pool
            .set_volume(EngineRole::Active, self.settings.global_volume);
        self.pool.set_opacity(EngineRole::Active, 1.0);
        self.pool.play(EngineRole::Active);
        self.on_track_started(now);
    }

    fn on_active_ended(&mut self, now: Instant) {
        let Some(media) = self.pool.handle(EngineRole::Active).cloned() else {
            return;
        };
        info!("Track ended: {}", media.display_name());
        self.bus.emit_lossy(KaraokeEvent::MediaEnded {
            media,
            timestamp: chrono::Utc::now(),
        });

        if self.crossfade.is_fading() {
            if self
                .crossfade
                .complete(&mut self.pool, self.settings.global_volume)
                .is_some()
            {
                self.on_track_started(now);
            }
            return;
        }

        if !self.settings.continuous_playback_enabled {
            info!("Continuous playback off, holding at end of track");
            self.held_at_end = true;
            return;
        }

        self.hand_over(now);
    }

    fn on_active_failed(&mut self, kind: FailureKind, reason: String, now: Instant) {
        let Some(media) = self.pool.handle(EngineRole::Active).cloned() else {
            return;
        };
        warn!("Active engine failed on {}: {} ({})", media.display_name(), reason, kind);

        if self.crossfade.is_fading() {
            self.emit_playback_error(media, kind, reason);
            if self
                .crossfade
                .complete(&mut self.pool, self.settings.global_volume)
                .is_some()
            {
                self.on_track_started(now);
            }
            return;
        }

        if kind == FailureKind::DeviceFailure && self.device_retries.insert(media.id) {
            let position = self.pool.position(EngineRole::Active);
            self.emit_playback_error(
                media.clone(),
                kind,
                format!("{}; retrying at {:.1}s", reason, position),
            );
            self.resume_at = Some(position);
            self.pool.load_active(&media, now);
            return;
        }

        self.emit_playback_error(media.clone(), kind, reason);
        self.mark_unplayable(media.id);
        self.start_on_ready = false;
        self.resume_at = None;
        self.hand_over(now);
    }

    fn on_standby_failed(&mut self, kind: FailureKind, reason: String, now: Instant) {
        let Some(media) = self.pool.handle(EngineRole::Standby).cloned() else {
            return;
        };
        warn!("Standby failed on {}: {} ({})", media.display_name(), reason, kind);

        let id = media.id;
        self.emit_playback_error(media, kind, reason);
        self.cancel_crossfade(CancelReason::PreloadFailed);
        self.mark_unplayable(id);

        if self.pending_handover {
            self.hand_over(now);
        } else {
            self.sync_standby(CancelReason::PreloadFailed, now);
        }
    }

    // ========================================
    // Advancing
    // ========================================

    /// Move to the next candidate without a fade
    ///
    /// Uses the Standby candidate when it is loaded, waits for it when it is
    /// still loading, otherwise asks the advance controller for one.
    fn hand_over(&mut self, now: Instant) {
        self.held_at_end = false;

        if self.pool.is_ready(EngineRole::Standby) && !self.crossfade.is_fading() {
            self.pending_handover = false;
            let paused = std::mem::take(&mut self.paused_on_handover);
            if self
                .crossfade
                .switch_abrupt(&mut self.pool, self.settings.global_volume)
                .is_some()
            {
                if paused {
                    debug!("Hand-over completed while paused");
                    self.pool.pause(EngineRole::Active);
                }
                self.on_track_started(now);
            }
            return;
        }

        if self.pool.is_loading(EngineRole::Standby) {
            debug!("Next track still loading");
            self.pending_handover = true;
            return;
        }

        match self.advance.predict(self.source.as_ref(), &self.settings) {
            Some(handle) => {
                self.crossfade.begin_preload(&mut self.pool, &handle, now);
                self.pending_handover = true;
            }
            None => self.enter_waiting(),
        }
    }

    /// Leave WaitingForNext if the queue now has a candidate
    fn try_start_next(&mut self, now: Instant) {
        let Some(handle) = self.advance.predict(self.source.as_ref(), &self.settings) else {
            return;
        };
        info!("Next track available: {}", handle.display_name());
        self.waiting = false;
        self.crossfade.begin_preload(&mut self.pool, &handle, now);
        self.pending_handover = true;
    }

    fn enter_waiting(&mut self) {
        self.cancel_crossfade(CancelReason::QueueChanged);
        self.pool.stop_all();
        self.pending_handover = false;
        self.paused_on_handover = false;
        self.held_at_end = false;
        self.start_on_ready = false;

        if !self.waiting {
            info!("Queue exhausted, waiting for next track");
            self.waiting = true;
            self.bus.emit_lossy(KaraokeEvent::WaitingForNext {
                timestamp: chrono::Utc::now(),
            });
        }
    }

    /// Bookkeeping once a track is Active and audible
    fn on_track_started(&mut self, now: Instant) {
        let Some(media) = self.pool.handle(EngineRole::Active).cloned() else {
            return;
        };
        info!("Now playing: {}", media.display_name());

        self.waiting = false;
        self.held_at_end = false;
        self.pending_handover = false;
        self.start_on_ready = false;
        self.resume_at = None;
        self.last_time_event = None;
        self.clock.reset();

        self.advance.note_started(media.id);
        self.source.commit(media.id);
        self.bus.emit_lossy(KaraokeEvent::MediaStarted {
            media,
            timestamp: chrono::Utc::now(),
        });

        self.sync_standby(CancelReason::QueueChanged, now);
    }

    /// Make Standby hold the advance controller's current prediction
    fn sync_standby(&mut self, reason: CancelReason, now: Instant) {
        if self.crossfade.is_fading() || self.waiting {
            return;
        }
        if self.pool.handle(EngineRole::Active).is_none() && !self.pending_handover {
            return;
        }

        let candidate = self.advance.predict(self.source.as_ref(), &self.settings);
        let loaded = self.pool.media_id(EngineRole::Standby);
        if candidate.as_ref().map(|h| h.id) == loaded {
            return;
        }

        if loaded.is_some() {
            self.cancel_crossfade(reason);
        }
        match candidate {
            Some(handle) => {
                debug!("Preloading {}", handle.display_name());
                self.crossfade.begin_preload(&mut self.pool, &handle, now);
            }
            None if self.pending_handover => self.enter_waiting(),
            None => {}
        }
    }

    // ========================================
    // Helpers
    // ========================================

    fn cancel_crossfade(&mut self, reason: CancelReason) {
        self.crossfade
            .cancel(&mut self.pool, reason, self.settings.global_volume);
    }

    fn reset_flow(&mut self) {
        self.waiting = false;
        self.held_at_end = false;
        self.pending_handover = false;
        self.start_on_ready = false;
        self.paused_on_handover = false;
        self.resume_at = None;
        self.clock.reset();
    }

    fn mark_unplayable(&mut self, id: MediaId) {
        self.advance.mark_unplayable(id);
        self.source.mark_unplayable(id);
    }

    fn emit_playback_error(&self, media: MediaHandle, kind: FailureKind, reason: String) {
        self.bus.emit_lossy(KaraokeEvent::PlaybackError {
            media,
            kind,
            reason,
            timestamp: chrono::Utc::now(),
        });
    }

    fn effective_state(&self) -> PlaybackState {
        if self.waiting {
            PlaybackState::WaitingForNext
        } else if self.pending_handover && self.paused_on_handover {
            PlaybackState::Paused
        } else if self.pending_handover {
            PlaybackState::Buffering
        } else if self.pool.handle(EngineRole::Active).is_none() {
            PlaybackState::Stopped
        } else {
            self.pool.state(EngineRole::Active)
        }
    }

    fn emit_time(&mut self, now: Instant) {
        let Some(media_id) = self.pool.media_id(EngineRole::Active) else {
            return;
        };
        self.bus.emit_lossy(KaraokeEvent::TimeChanged {
            media_id,
            position_seconds: self.pool.position(EngineRole::Active),
            duration_seconds: self.pool.duration(EngineRole::Active).unwrap_or(0.0),
            timestamp: chrono::Utc::now(),
        });
        self.last_time_event = Some(now);
    }

    fn snapshot(&self) -> PlayerStatus {
        PlayerStatus {
            state: self.effective_state(),
            current: self.pool.handle(EngineRole::Active).cloned(),
            position_seconds: self.pool.position(EngineRole::Active),
            duration_seconds: self.pool.duration(EngineRole::Active),
            active: Some(self.pool.snapshot(EngineRole::Active)),
            standby: Some(self.pool.snapshot(EngineRole::Standby)),
            crossfade_phase: self.crossfade.phase(),
            crossfade_progress: self.crossfade.progress(),
        }
    }

    /// Emit state/time events and publish the status snapshot
    async fn publish(&mut self, now: Instant) {
        let effective = self.effective_state();
        if effective != self.reported_state {
            let old_state = self.reported_state;
            info!("Playback state: {} -> {}", old_state, effective);
            self.reported_state = effective;
            self.bus.emit_lossy(KaraokeEvent::StateChanged {
                old_state,
                new_state: effective,
                timestamp: chrono::Utc::now(),
            });
            if old_state == PlaybackState::Playing || effective == PlaybackState::Playing {
                self.emit_time(now);
            }
        } else if effective == PlaybackState::Playing {
            let due = self
                .last_time_event
                .map_or(true, |last| now.duration_since(last) >= self.config.time_event_interval());
            if due {
                self.emit_time(now);
            }
        }

        self.state.set_status(self.snapshot()).await;
    }
}
