//! Timer-driven render engine
//!
//! Renders nothing. Position advances with `tokio::time`, loads complete (or
//! fail, or hang) after a scripted latency, and `Ended` is reported when the
//! position reaches the nominal duration. Under a paused test runtime the
//! whole engine runs on virtual time.

use super::{EngineEvent, EngineFactory, EngineSignals, LoadTicket, RenderEngine};
use karaoke_common::events::FailureKind;
use karaoke_common::{MediaHandle, MediaId};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Scripted outcome of loading one track
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LoadBehavior {
    /// Load succeeds after `latency_ms`
    Ok { latency_ms: u64 },
    /// Load fails (corrupt or missing file) after `after_ms`
    Fail { after_ms: u64 },
    /// Load never reports back
    Hang,
    /// Load succeeds, then the output device is lost at `at_seconds` of playback
    DeviceLoss { latency_ms: u64, at_seconds: f64 },
}

impl Default for LoadBehavior {
    fn default() -> Self {
        LoadBehavior::Ok { latency_ms: 200 }
    }
}

#[derive(Default)]
struct LibraryInner {
    default: LoadBehavior,
    overrides: HashMap<MediaId, LoadBehavior>,
    loads: HashMap<MediaId, usize>,
}

/// Shared table of load behaviors, consulted by every simulated engine
#[derive(Clone, Default)]
pub struct SimulatedLibrary {
    inner: Arc<Mutex<LibraryInner>>,
}

impl SimulatedLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Library whose unlisted tracks use `behavior`
    pub fn with_default(behavior: LoadBehavior) -> Self {
        let library = Self::default();
        library.lock().default = behavior;
        library
    }

    fn lock(&self) -> MutexGuard<'_, LibraryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Script the outcome for one track (applies to subsequent loads)
    pub fn set(&self, id: MediaId, behavior: LoadBehavior) {
        self.lock().overrides.insert(id, behavior);
    }

    /// Record a load request and return the behavior to simulate
    fn begin_load(&self, id: MediaId) -> LoadBehavior {
        let mut inner = self.lock();
        *inner.loads.entry(id).or_insert(0) += 1;
        inner
            .overrides
            .get(&id)
            .cloned()
            .unwrap_or_else(|| inner.default.clone())
    }

    /// How many times any engine was asked to load `id`
    pub fn load_count(&self, id: MediaId) -> usize {
        self.lock().loads.get(&id).copied().unwrap_or(0)
    }

    /// Engine factory for an `EnginePool`
    pub fn factory(&self) -> EngineFactory {
        let library = self.clone();
        Box::new(move |signals: EngineSignals| {
            Box::new(SimulatedEngine::new(library.clone(), signals)) as Box<dyn super::RenderEngine>
        })
    }
}

struct Loaded {
    id: MediaId,
    duration: f64,
    device_loss_at: Option<f64>,
}

struct EngineInner {
    ticket: LoadTicket,
    loaded: Option<Loaded>,

    /// Bumped on every load/unload; pending load tasks compare against it
    load_generation: u64,

    /// Bumped on every play/pause/stop/seek; pending end timers compare against it
    timer_generation: u64,

    base_position: f64,
    playing_since: Option<Instant>,
    volume: f32,
    opacity: f32,
    subtitles: bool,
}

impl EngineInner {
    fn position(&self) -> f64 {
        let duration = self.loaded.as_ref().map(|l| l.duration).unwrap_or(0.0);
        let elapsed = self
            .playing_since
            .map(|since| since.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        (self.base_position + elapsed).min(duration)
    }

    fn freeze(&mut self) {
        self.base_position = self.position();
        self.playing_since = None;
        self.timer_generation += 1;
    }
}

/// Render engine stand-in driven by timers
pub struct SimulatedEngine {
    inner: Arc<Mutex<EngineInner>>,
    library: SimulatedLibrary,
    signals: EngineSignals,
}

impl SimulatedEngine {
    pub fn new(library: SimulatedLibrary, signals: EngineSignals) -> Self {
        Self {
            inner: Arc::new(Mutex::new(EngineInner {
                ticket: LoadTicket(0),
                loaded: None,
                load_generation: 0,
                timer_generation: 0,
                base_position: 0.0,
                playing_since: None,
                volume: 0.0,
                opacity: 0.0,
                subtitles: false,
            })),
            library,
            signals,
        }
    }

    fn lock(&self) -> MutexGuard<'_, EngineInner> {
        lock_inner(&self.inner)
    }

    /// Arm the timer for whichever comes first: natural end or device loss
    fn schedule_timer(&self, inner: &EngineInner) {
        let Some(loaded) = inner.loaded.as_ref() else {
            return;
        };

        let position = inner.base_position;
        let (at, event) = match loaded.device_loss_at {
            Some(loss) if loss >= position && loss < loaded.duration => (
                loss,
                EngineEvent::DeviceLost {
                    reason: "simulated output device lost".to_string(),
                },
            ),
            _ => (loaded.duration, EngineEvent::Ended),
        };

        let wait = Duration::from_secs_f64((at - position).max(0.0));
        let generation = inner.timer_generation;
        let ticket = inner.ticket;
        let shared = Arc::clone(&self.inner);
        let signals = self.signals.clone();

        tokio::spawn(async move {
            tokio::time::sleep(wait).await;
            {
                let mut inner = lock_inner(&shared);
                if inner.timer_generation != generation {
                    return;
                }
                inner.freeze();
                inner.base_position = at;
            }
            signals.send(ticket, event);
        });
    }
}

fn lock_inner(inner: &Mutex<EngineInner>) -> MutexGuard<'_, EngineInner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

impl RenderEngine for SimulatedEngine {
    fn load(&mut self, handle: &MediaHandle, ticket: LoadTicket) {
        let behavior = self.library.begin_load(handle.id);
        let generation = {
            let mut inner = self.lock();
            inner.freeze();
            inner.loaded = None;
            inner.base_position = 0.0;
            inner.ticket = ticket;
            inner.load_generation += 1;
            inner.load_generation
        };

        debug!(
            "Simulated engine {} loading {} ({:?})",
            self.signals.slot(),
            handle.display_name(),
            behavior
        );

        let (delay, outcome) = match behavior {
            LoadBehavior::Ok { latency_ms } => (latency_ms, Ok(None)),
            LoadBehavior::DeviceLoss {
                latency_ms,
                at_seconds,
            } => (latency_ms, Ok(Some(at_seconds))),
            LoadBehavior::Fail { after_ms } => (after_ms, Err(())),
            LoadBehavior::Hang => return,
        };

        let shared = Arc::clone(&self.inner);
        let signals = self.signals.clone();
        let id = handle.id;
        let duration = handle.duration_seconds;
        let path = handle.path.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            let event = {
                let mut inner = lock_inner(&shared);
                if inner.load_generation != generation {
                    return;
                }
                match outcome {
                    Ok(device_loss_at) => {
                        inner.loaded = Some(Loaded {
                            id,
                            duration,
                            device_loss_at,
                        });
                        EngineEvent::Loaded {
                            duration_seconds: Some(duration),
                        }
                    }
                    Err(()) => EngineEvent::LoadFailed {
                        kind: FailureKind::LoadFailure,
                        reason: format!("cannot decode {}", path.display()),
                    },
                }
            };
            signals.send(ticket, event);
        });
    }

    fn play(&mut self) {
        let inner_arc = Arc::clone(&self.inner);
        let mut inner = lock_inner(&inner_arc);
        if inner.loaded.is_none() || inner.playing_since.is_some() {
            return;
        }
        inner.timer_generation += 1;
        inner.playing_since = Some(Instant::now());
        self.schedule_timer(&inner);
    }

    fn pause(&mut self) {
        self.lock().freeze();
    }

    fn stop(&mut self) {
        let mut inner = self.lock();
        inner.freeze();
        inner.base_position = 0.0;
    }

    fn unload(&mut self) {
        let mut inner = self.lock();
        inner.freeze();
        inner.load_generation += 1;
        inner.loaded = None;
        inner.base_position = 0.0;
    }

    fn seek(&mut self, seconds: f64) {
        let inner_arc = Arc::clone(&self.inner);
        let mut inner = lock_inner(&inner_arc);
        let Some(duration) = inner.loaded.as_ref().map(|l| l.duration) else {
            return;
        };
        let was_playing = inner.playing_since.is_some();
        inner.freeze();
        inner.base_position = seconds.clamp(0.0, duration);
        if was_playing {
            inner.playing_since = Some(Instant::now());
            self.schedule_timer(&inner);
        }
    }

    fn set_volume(&mut self, level: f32) {
        self.lock().volume = level;
    }

    fn set_opacity(&mut self, level: f32) {
        self.lock().opacity = level;
    }

    fn set_subtitles(&mut self, enabled: bool) {
        self.lock().subtitles = enabled;
    }

    fn position(&self) -> f64 {
        self.lock().position()
    }

    fn duration(&self) -> Option<f64> {
        self.lock().loaded.as_ref().map(|l| l.duration)
    }
}

impl std::fmt::Debug for SimulatedEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("SimulatedEngine")
            .field("slot", &self.signals.slot())
            .field("media", &inner.loaded.as_ref().map(|l| l.id))
            .field("position", &inner.position())
            .field("volume", &inner.volume)
            .field("opacity", &inner.opacity)
            .field("subtitles", &inner.subtitles)
            .finish()
    }
}
