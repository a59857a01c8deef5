//! Playback orchestration
//!
//! **Module Structure:**
//! - `core.rs`: the task owning both engines (tick loop, command handling)
//! - `clock.rs`: transition clock (when to start fading)
//! - `crossfade.rs`: crossfade state machine and level ramps
//! - `advance.rs`: next-candidate selection (sequential, shuffle, repeat)
//! - `commands.rs`: messages from controller handles to the core

pub mod advance;
pub mod clock;
pub mod commands;
mod core;
pub mod crossfade;

pub use self::core::PlaybackCore;
pub use advance::AdvanceController;
pub use clock::{ClockDecision, TransitionClock};
pub use commands::{Command, ControlMessage};
pub use crossfade::{CrossfadeOrchestrator, CrossfadePhase, CrossfadeSession};
