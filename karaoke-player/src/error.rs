//! Error types for karaoke-player
//!
//! Only validation and lifecycle problems are returned as errors. Engine
//! failures (corrupt file, device loss, preload timeout) are reported as
//! asynchronous `PlaybackError` events and never surface here.

use thiserror::Error;

/// Main error type for karaoke-player
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Volume outside 0.0-1.0 (or not a number)
    #[error("Invalid volume {0}: must be within 0.0-1.0")]
    InvalidVolume(f32),

    /// Crossfade duration outside 1-20 seconds
    #[error("Invalid crossfade duration {0}s: must be within 1-20 seconds")]
    InvalidCrossfadeDuration(u32),

    /// Seek target negative or not a number
    #[error("Invalid seek position {0}s")]
    InvalidSeek(f64),

    /// Tick interval outside the supported sampling cadence
    #[error("Invalid tick interval {0}ms: must be within 100-250ms")]
    InvalidTickInterval(u64),

    /// Invalid request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Controller task is no longer running
    #[error("Playback controller stopped")]
    ControllerStopped,

    /// Shared library errors
    #[error(transparent)]
    Common(#[from] karaoke_common::Error),
}

/// Convenience Result type using karaoke-player Error
pub type Result<T> = std::result::Result<T, Error>;
