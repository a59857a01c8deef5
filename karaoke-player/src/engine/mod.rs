//! Render engine abstraction and the two-slot engine pool
//!
//! **Module Structure:**
//! - `mod.rs`: `RenderEngine` trait and the asynchronous signal plumbing
//! - `pool.rs`: `EnginePool` (Active/Standby slots, O(1) role swap)
//! - `simulated.rs`: timer-driven engine for tests and the headless runner
//!
//! A render engine is an opaque black box with its own threads. Commands are
//! fire-and-forget; outcomes (load succeeded, load failed, track ended,
//! device lost) come back as `EngineSignal`s on an mpsc channel that the
//! playback core drains at tick boundaries.

mod pool;
pub mod simulated;

pub use pool::{EnginePool, LoadStatus, SlotSnapshot};
pub use simulated::{LoadBehavior, SimulatedEngine, SimulatedLibrary};

use karaoke_common::events::{FailureKind, SlotId};
use karaoke_common::MediaHandle;
use tokio::sync::mpsc;

/// Identifies one load request on one slot
///
/// Every signal carries the ticket of the load it belongs to, so reports for
/// a load that was since replaced or aborted are recognised as stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoadTicket(pub u64);

/// Outcome reported by an engine
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Media is buffered and ready to play
    Loaded {
        /// Duration discovered while loading, if the engine knows it
        duration_seconds: Option<f64>,
    },
    /// Media could not be loaded
    LoadFailed { kind: FailureKind, reason: String },
    /// Playback reached the natural end of the media
    Ended,
    /// Output device became unavailable during playback
    DeviceLost { reason: String },
}

/// Engine report tagged with its slot and load ticket
#[derive(Debug, Clone)]
pub struct EngineSignal {
    pub slot: SlotId,
    pub ticket: LoadTicket,
    pub event: EngineEvent,
}

/// Sending half handed to each engine at construction
#[derive(Debug, Clone)]
pub struct EngineSignals {
    slot: SlotId,
    tx: mpsc::UnboundedSender<EngineSignal>,
}

impl EngineSignals {
    pub fn new(slot: SlotId, tx: mpsc::UnboundedSender<EngineSignal>) -> Self {
        Self { slot, tx }
    }

    pub fn slot(&self) -> SlotId {
        self.slot
    }

    /// Queue a report for the next tick
    ///
    /// Silently dropped when the playback core has shut down.
    pub fn send(&self, ticket: LoadTicket, event: EngineEvent) {
        let _ = self.tx.send(EngineSignal {
            slot: self.slot,
            ticket,
            event,
        });
    }
}

/// One media-rendering engine instance
///
/// Implementations must not block: `load` starts an asynchronous load whose
/// outcome is reported through the `EngineSignals` given at construction.
pub trait RenderEngine: Send {
    /// Begin loading `handle`; report `Loaded`/`LoadFailed` with `ticket`
    fn load(&mut self, handle: &MediaHandle, ticket: LoadTicket);

    /// Start or resume rendering the loaded media
    fn play(&mut self);

    /// Freeze at the current position
    fn pause(&mut self);

    /// Stop rendering and rewind; the media stays loaded
    fn stop(&mut self);

    /// Stop and release the loaded media (also abandons a pending load)
    fn unload(&mut self);

    /// Reposition within the loaded media
    fn seek(&mut self, seconds: f64);

    /// Audio gain (0.0-1.0)
    fn set_volume(&mut self, level: f32);

    /// Picture opacity (0.0 = black, 1.0 = fully visible)
    fn set_opacity(&mut self, level: f32);

    /// Show or hide the subtitle/lyrics overlay
    fn set_subtitles(&mut self, enabled: bool);

    /// Current position in seconds
    fn position(&self) -> f64;

    /// Duration of the loaded media, once known
    fn duration(&self) -> Option<f64>;
}

/// Builds the engine for a slot; called exactly twice per pool
pub type EngineFactory = Box<dyn FnMut(EngineSignals) -> Box<dyn RenderEngine> + Send>;
