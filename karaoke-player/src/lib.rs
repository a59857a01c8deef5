//! # Karaoke Player Library (karaoke-player)
//!
//! Playback orchestration core for a karaoke application.
//!
//! **Purpose:** Keep two render engines in Active/Standby roles, preload the
//! next track silently, crossfade at the track boundary (linear or
//! equal-power audio ramp, dip-to-black picture), and advance through the
//! queue sequentially or shuffled, skipping tracks that fail to load.
//!
//! **Architecture:** One tokio task owns both engines and runs a fixed-rate
//! tick. Engine reports and queue changes are drained at tick boundaries;
//! commands from `PlaybackController` handles are applied between ticks.

pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod playback;
pub mod playlist;
pub mod source;
pub mod state;

pub use config::{CrossfadeDuration, EngineConfig, PlaybackSettings, TomlConfig};
pub use controller::PlaybackController;
pub use error::{Error, Result};
pub use source::{PlayQueue, TrackSource};
pub use state::{PlayerStatus, SharedState};
