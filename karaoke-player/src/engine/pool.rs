//! Engine pool: two render engines in Active/Standby roles
//!
//! **Responsibilities:**
//! - Own exactly two engine slots for the controller's lifetime
//! - Map roles to slots; `swap_roles` flips the mapping without touching slot internals
//! - Track per-slot load status, playback state, volume and opacity
//! - Filter stale engine signals by load ticket
//! - Emit `EngineStateChanged` on every slot state transition

use super::{EngineEvent, EngineFactory, EngineSignal, EngineSignals, LoadTicket, RenderEngine};
use karaoke_common::events::{EngineRole, EventBus, KaraokeEvent, PlaybackState, SlotId};
use karaoke_common::{MediaHandle, MediaId};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info};

/// Load progress of a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    /// No media assigned
    Empty,
    /// Load requested, outcome not yet reported
    Loading { since: Instant },
    /// Engine confirmed the media is playable
    Ready,
    /// Engine reported a failure (or the load timed out)
    Failed,
}

/// Read-only view of one slot for status reporting
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotSnapshot {
    pub slot: SlotId,
    pub role: EngineRole,
    pub media_id: Option<MediaId>,
    pub state: PlaybackState,
    pub ready: bool,
    pub volume: f32,
    pub opacity: f32,
    pub position_seconds: f64,
    pub duration_seconds: Option<f64>,
}

struct EngineSlot {
    id: SlotId,
    engine: Box<dyn RenderEngine>,
    handle: Option<MediaHandle>,
    ticket: LoadTicket,
    load: LoadStatus,
    state: PlaybackState,
    volume: f32,
    opacity: f32,
    duration: Option<f64>,
}

/// Two engine slots behind a role mapping
pub struct EnginePool {
    slots: [EngineSlot; 2],

    /// Index of the Active slot; the other slot is Standby
    active_index: usize,

    next_ticket: u64,
    subtitles_enabled: bool,
    bus: EventBus,
}

impl EnginePool {
    /// Instantiate both engines
    ///
    /// The factory is called exactly twice; slots are never recreated.
    pub fn new(
        mut factory: EngineFactory,
        signal_tx: mpsc::UnboundedSender<EngineSignal>,
        bus: EventBus,
    ) -> Self {
        let mut make_slot = |id: SlotId| {
            let mut engine = factory(EngineSignals::new(id, signal_tx.clone()));
            engine.set_volume(0.0);
            engine.set_opacity(0.0);
            EngineSlot {
                id,
                engine,
                handle: None,
                ticket: LoadTicket(0),
                load: LoadStatus::Empty,
                state: PlaybackState::Stopped,
                volume: 0.0,
                opacity: 0.0,
                duration: None,
            }
        };

        let slots = [make_slot(SlotId::A), make_slot(SlotId::B)];
        info!("Engine pool created (slot A active, slot B standby)");

        Self {
            slots,
            active_index: 0,
            next_ticket: 0,
            subtitles_enabled: true,
            bus,
        }
    }

    fn index(&self, role: EngineRole) -> usize {
        match role {
            EngineRole::Active => self.active_index,
            EngineRole::Standby => 1 - self.active_index,
        }
    }

    fn slot(&self, role: EngineRole) -> &EngineSlot {
        &self.slots[self.index(role)]
    }

    fn slot_mut(&mut self, role: EngineRole) -> &mut EngineSlot {
        let index = self.index(role);
        &mut self.slots[index]
    }

    /// Physical slot currently holding `role`
    pub fn slot_id(&self, role: EngineRole) -> SlotId {
        self.slot(role).id
    }

    /// Role currently held by `slot`
    pub fn role_of(&self, slot: SlotId) -> EngineRole {
        if slot.index() == self.active_index {
            EngineRole::Active
        } else {
            EngineRole::Standby
        }
    }

    fn set_state(&mut self, role: EngineRole, new_state: PlaybackState) {
        let slot = self.slot_mut(role);
        let old_state = slot.state;
        if old_state == new_state {
            return;
        }
        slot.state = new_state;
        let slot_id = slot.id;

        debug!("Engine {} ({}) {} -> {}", slot_id, role, old_state, new_state);
        self.bus.emit_lossy(KaraokeEvent::EngineStateChanged {
            slot: slot_id,
            role,
            old_state,
            new_state,
            timestamp: chrono::Utc::now(),
        });
    }

    /// Begin loading into the Active slot
    pub fn load_active(&mut self, handle: &MediaHandle, now: Instant) -> LoadTicket {
        self.load(EngineRole::Active, handle, now)
    }

    /// Begin loading into the Standby slot (silent, black)
    pub fn load_standby(&mut self, handle: &MediaHandle, now: Instant) -> LoadTicket {
        self.load(EngineRole::Standby, handle, now)
    }

    fn load(&mut self, role: EngineRole, handle: &MediaHandle, now: Instant) -> LoadTicket {
        self.next_ticket += 1;
        let ticket = LoadTicket(self.next_ticket);
        let subtitles = self.subtitles_enabled && handle.has_subtitles;

        let slot = self.slot_mut(role);
        slot.engine.unload();
        slot.handle = Some(handle.clone());
        slot.ticket = ticket;
        slot.load = LoadStatus::Loading { since: now };
        slot.duration = None;
        slot.volume = 0.0;
        slot.opacity = 0.0;
        slot.engine.set_volume(0.0);
        slot.engine.set_opacity(0.0);
        slot.engine.set_subtitles(subtitles);
        slot.engine.load(handle, ticket);

        info!("Loading {} into {} engine", handle.display_name(), role);
        self.set_state(role, PlaybackState::Buffering);
        ticket
    }

    /// Apply an engine signal to slot bookkeeping
    ///
    /// Returns the role of the reporting slot, or `None` when the signal is
    /// stale (superseded load, cleared slot, or an outcome already recorded).
    pub fn accept_signal(&mut self, signal: &EngineSignal) -> Option<EngineRole> {
        let role = self.role_of(signal.slot);
        let slot = &self.slots[signal.slot.index()];

        if slot.handle.is_none() || slot.ticket != signal.ticket {
            debug!("Dropping stale {:?} from engine {}", signal.event, signal.slot);
            return None;
        }

        let loading = matches!(slot.load, LoadStatus::Loading { .. });
        match &signal.event {
            EngineEvent::Loaded { duration_seconds } => {
                if !loading {
                    return None;
                }
                let slot = self.slot_mut(role);
                let nominal = slot.handle.as_ref().map(|h| h.duration_seconds);
                slot.duration = duration_seconds.or_else(|| slot.engine.duration()).or(nominal);
                slot.load = LoadStatus::Ready;
                self.set_state(role, PlaybackState::Stopped);
            }
            EngineEvent::LoadFailed { .. } => {
                if !loading {
                    return None;
                }
                self.slot_mut(role).load = LoadStatus::Failed;
                self.set_state(role, PlaybackState::Error);
            }
            EngineEvent::Ended => {
                if slot.load != LoadStatus::Ready {
                    return None;
                }
                self.set_state(role, PlaybackState::Stopped);
            }
            EngineEvent::DeviceLost { .. } => {
                self.set_state(role, PlaybackState::Error);
            }
        }
        Some(role)
    }

    /// Give up on a load that never reported back
    ///
    /// The slot keeps its handle (for reporting) but any late outcome for
    /// this load is ignored.
    pub fn abort_load(&mut self, role: EngineRole) {
        if !self.is_loading(role) {
            return;
        }
        let slot = self.slot_mut(role);
        slot.engine.unload();
        slot.load = LoadStatus::Failed;
        self.set_state(role, PlaybackState::Error);
    }

    /// Start rendering a slot whose media is loaded
    pub fn play(&mut self, role: EngineRole) {
        if self.slot(role).load != LoadStatus::Ready {
            return;
        }
        self.slot_mut(role).engine.play();
        self.set_state(role, PlaybackState::Playing);
    }

    pub fn pause(&mut self, role: EngineRole) {
        if self.slot(role).state != PlaybackState::Playing {
            return;
        }
        self.slot_mut(role).engine.pause();
        self.set_state(role, PlaybackState::Paused);
    }

    /// Stop rendering; loaded media stays assigned
    pub fn stop(&mut self, role: EngineRole) {
        if self.slot(role).handle.is_none() {
            return;
        }
        self.slot_mut(role).engine.stop();
        if self.slot(role).load == LoadStatus::Ready {
            self.set_state(role, PlaybackState::Stopped);
        }
    }

    pub fn stop_all(&mut self) {
        self.stop(EngineRole::Active);
        self.stop(EngineRole::Standby);
    }

    /// Stop, silence and release a slot's media
    ///
    /// Returns the handle the slot held.
    pub fn clear(&mut self, role: EngineRole) -> Option<MediaHandle> {
        let slot = self.slot_mut(role);
        slot.engine.set_volume(0.0);
        slot.engine.set_opacity(0.0);
        slot.engine.unload();
        slot.volume = 0.0;
        slot.opacity = 0.0;
        slot.load = LoadStatus::Empty;
        slot.duration = None;
        let handle = slot.handle.take();
        self.set_state(role, PlaybackState::Stopped);
        handle
    }

    pub fn seek(&mut self, role: EngineRole, seconds: f64) {
        if self.slot(role).load == LoadStatus::Ready {
            self.slot_mut(role).engine.seek(seconds);
        }
    }

    pub fn set_volume(&mut self, role: EngineRole, level: f32) {
        let slot = self.slot_mut(role);
        slot.volume = level;
        slot.engine.set_volume(level);
    }

    pub fn set_opacity(&mut self, role: EngineRole, level: f32) {
        let slot = self.slot_mut(role);
        slot.opacity = level;
        slot.engine.set_opacity(level);
    }

    /// Show/hide subtitles on both engines (only where the media has them)
    pub fn set_subtitles(&mut self, enabled: bool) {
        self.subtitles_enabled = enabled;
        for slot in self.slots.iter_mut() {
            let available = slot.handle.as_ref().map(|h| h.has_subtitles).unwrap_or(false);
            slot.engine.set_subtitles(enabled && available);
        }
    }

    /// Exchange Active and Standby
    ///
    /// Only the role mapping changes; both engines keep running untouched.
    pub fn swap_roles(&mut self) {
        self.active_index = 1 - self.active_index;
        debug!(
            "Roles swapped: slot {} active, slot {} standby",
            self.slot_id(EngineRole::Active),
            self.slot_id(EngineRole::Standby)
        );
    }

    pub fn position(&self, role: EngineRole) -> f64 {
        let slot = self.slot(role);
        if slot.handle.is_some() {
            slot.engine.position()
        } else {
            0.0
        }
    }

    pub fn duration(&self, role: EngineRole) -> Option<f64> {
        self.slot(role).duration
    }

    pub fn handle(&self, role: EngineRole) -> Option<&MediaHandle> {
        self.slot(role).handle.as_ref()
    }

    pub fn media_id(&self, role: EngineRole) -> Option<MediaId> {
        self.slot(role).handle.as_ref().map(|h| h.id)
    }

    pub fn load_status(&self, role: EngineRole) -> LoadStatus {
        self.slot(role).load
    }

    pub fn is_ready(&self, role: EngineRole) -> bool {
        self.slot(role).load == LoadStatus::Ready
    }

    pub fn is_loading(&self, role: EngineRole) -> bool {
        matches!(self.slot(role).load, LoadStatus::Loading { .. })
    }

    pub fn state(&self, role: EngineRole) -> PlaybackState {
        self.slot(role).state
    }

    pub fn volume(&self, role: EngineRole) -> f32 {
        self.slot(role).volume
    }

    pub fn opacity(&self, role: EngineRole) -> f32 {
        self.slot(role).opacity
    }

    pub fn snapshot(&self, role: EngineRole) -> SlotSnapshot {
        let slot = self.slot(role);
        SlotSnapshot {
            slot: slot.id,
            role,
            media_id: slot.handle.as_ref().map(|h| h.id),
            state: slot.state,
            ready: slot.load == LoadStatus::Ready,
            volume: slot.volume,
            opacity: slot.opacity,
            position_seconds: self.position(role),
            duration_seconds: slot.duration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineFactory, RenderEngine};
    use karaoke_common::MediaType;
    use std::sync::{Arc, Mutex};

    /// Records every command it receives
    struct RecordingEngine {
        log: Arc<Mutex<Vec<String>>>,
        slot: SlotId,
    }

    impl RecordingEngine {
        fn record(&self, entry: &str) {
            self.log.lock().unwrap().push(format!("{}:{}", self.slot, entry));
        }
    }

    impl RenderEngine for RecordingEngine {
        fn load(&mut self, _handle: &MediaHandle, ticket: LoadTicket) {
            self.record(&format!("load#{}", ticket.0));
        }
        fn play(&mut self) {
            self.record("play");
        }
        fn pause(&mut self) {
            self.record("pause");
        }
        fn stop(&mut self) {
            self.record("stop");
        }
        fn unload(&mut self) {
            self.record("unload");
        }
        fn seek(&mut self, _seconds: f64) {
            self.record("seek");
        }
        fn set_volume(&mut self, _level: f32) {}
        fn set_opacity(&mut self, _level: f32) {}
        fn set_subtitles(&mut self, _enabled: bool) {}
        fn position(&self) -> f64 {
            0.0
        }
        fn duration(&self) -> Option<f64> {
            None
        }
    }

    fn test_pool() -> (EnginePool, Arc<Mutex<Vec<String>>>, EventBus) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let factory_log = Arc::clone(&log);
        let factory: EngineFactory = Box::new(move |signals: EngineSignals| {
            Box::new(RecordingEngine {
                log: Arc::clone(&factory_log),
                slot: signals.slot(),
            }) as Box<dyn RenderEngine>
        });
        let (tx, _rx) = mpsc::unbounded_channel();
        let bus = EventBus::new(100);
        (EnginePool::new(factory, tx, bus.clone()), log, bus)
    }

    fn handle(name: &str) -> MediaHandle {
        MediaHandle::new(format!("/songs/{}.mp4", name), 180.0, MediaType::Video)
    }

    fn loaded(slot: SlotId, ticket: LoadTicket) -> EngineSignal {
        EngineSignal {
            slot,
            ticket,
            event: EngineEvent::Loaded {
                duration_seconds: None,
            },
        }
    }

    #[tokio::test]
    async fn test_exactly_one_active_slot_across_swaps() {
        let (mut pool, _log, _bus) = test_pool();

        for _ in 0..5 {
            let active = pool.slot_id(EngineRole::Active);
            let standby = pool.slot_id(EngineRole::Standby);
            assert_ne!(active, standby);
            assert_eq!(pool.role_of(active), EngineRole::Active);
            assert_eq!(pool.role_of(standby), EngineRole::Standby);
            pool.swap_roles();
        }
    }

    #[tokio::test]
    async fn test_swap_does_not_touch_engines() {
        let (mut pool, log, _bus) = test_pool();
        let a = handle("a");
        let ticket = pool.load_active(&a, Instant::now());
        pool.accept_signal(&loaded(SlotId::A, ticket));
        log.lock().unwrap().clear();

        pool.swap_roles();

        assert!(log.lock().unwrap().is_empty());
        assert_eq!(pool.media_id(EngineRole::Standby), Some(a.id));
        assert_eq!(pool.handle(EngineRole::Active), None);
    }

    #[tokio::test]
    async fn test_loaded_signal_marks_ready_with_nominal_duration() {
        let (mut pool, _log, _bus) = test_pool();
        let b = handle("b");
        let ticket = pool.load_standby(&b, Instant::now());
        assert!(pool.is_loading(EngineRole::Standby));
        assert_eq!(pool.state(EngineRole::Standby), PlaybackState::Buffering);

        let role = pool.accept_signal(&loaded(SlotId::B, ticket));

        assert_eq!(role, Some(EngineRole::Standby));
        assert!(pool.is_ready(EngineRole::Standby));
        assert_eq!(pool.duration(EngineRole::Standby), Some(180.0));
        assert_eq!(pool.volume(EngineRole::Standby), 0.0);
    }

    #[tokio::test]
    async fn test_stale_ticket_is_ignored() {
        let (mut pool, _log, _bus) = test_pool();
        let first = pool.load_standby(&handle("b"), Instant::now());
        let _second = pool.load_standby(&handle("c"), Instant::now());

        assert_eq!(pool.accept_signal(&loaded(SlotId::B, first)), None);
        assert!(pool.is_loading(EngineRole::Standby));
    }

    #[tokio::test]
    async fn test_signal_after_clear_is_ignored() {
        let (mut pool, _log, _bus) = test_pool();
        let ticket = pool.load_standby(&handle("b"), Instant::now());
        pool.clear(EngineRole::Standby);

        assert_eq!(pool.accept_signal(&loaded(SlotId::B, ticket)), None);
        assert_eq!(pool.load_status(EngineRole::Standby), LoadStatus::Empty);
    }

    #[tokio::test]
    async fn test_play_requires_ready() {
        let (mut pool, _log, _bus) = test_pool();
        let ticket = pool.load_active(&handle("a"), Instant::now());

        pool.play(EngineRole::Active);
        assert_eq!(pool.state(EngineRole::Active), PlaybackState::Buffering);

        pool.accept_signal(&loaded(SlotId::A, ticket));
        pool.play(EngineRole::Active);
        assert_eq!(pool.state(EngineRole::Active), PlaybackState::Playing);
    }

    #[tokio::test]
    async fn test_state_change_events() {
        let (mut pool, _log, bus) = test_pool();
        let mut rx = bus.subscribe();

        let ticket = pool.load_active(&handle("a"), Instant::now());
        pool.accept_signal(&loaded(SlotId::A, ticket));
        pool.play(EngineRole::Active);
        pool.play(EngineRole::Active);

        let mut transitions = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let KaraokeEvent::EngineStateChanged {
                old_state,
                new_state,
                role,
                ..
            } = event
            {
                assert_eq!(role, EngineRole::Active);
                transitions.push((old_state, new_state));
            }
        }

        assert_eq!(
            transitions,
            vec![
                (PlaybackState::Stopped, PlaybackState::Buffering),
                (PlaybackState::Buffering, PlaybackState::Stopped),
                (PlaybackState::Stopped, PlaybackState::Playing),
            ]
        );
    }

    #[tokio::test]
    async fn test_load_failure_marks_error() {
        let (mut pool, _log, _bus) = test_pool();
        let ticket = pool.load_standby(&handle("broken"), Instant::now());

        let role = pool.accept_signal(&EngineSignal {
            slot: SlotId::B,
            ticket,
            event: EngineEvent::LoadFailed {
                kind: karaoke_common::events::FailureKind::LoadFailure,
                reason: "corrupt".to_string(),
            },
        });

        assert_eq!(role, Some(EngineRole::Standby));
        assert_eq!(pool.load_status(EngineRole::Standby), LoadStatus::Failed);
        assert_eq!(pool.state(EngineRole::Standby), PlaybackState::Error);
    }
}
