//! # Karaoke Common Library
//!
//! Shared vocabulary for the karaoke playback core and its collaborators:
//! - Media handles (the immutable description of a queued track)
//! - Event types (KaraokeEvent enum) and the broadcast EventBus
//! - Fade curve definitions for the crossfade ramp
//! - Configuration file discovery
//! - Common error type

pub mod config;
pub mod error;
pub mod events;
pub mod fade_curves;
pub mod media;

pub use error::{Error, Result};
pub use fade_curves::FadeCurve;
pub use media::{MediaHandle, MediaId, MediaType};
