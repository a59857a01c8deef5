//! Playlist files for the headless runner
//!
//! ```toml
//! [[track]]
//! path = "songs/bohemian.mp4"
//! duration_seconds = 354.0
//! subtitles = true
//!
//! [[track]]
//! path = "songs/broken.mp3"
//! duration_seconds = 200.0
//! media_type = "audio"
//! load = { outcome = "fail", after_ms = 400 }
//! ```
//!
//! `load` scripts the simulated engine's behavior for that track.

use crate::engine::{LoadBehavior, SimulatedLibrary};
use crate::error::{Error, Result};
use crate::source::PlayQueue;
use karaoke_common::{MediaHandle, MediaType};
use serde::Deserialize;
use std::path::{Path, PathBuf};

fn default_media_type() -> MediaType {
    MediaType::Video
}

/// One playlist line
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PlaylistEntry {
    pub path: PathBuf,
    pub duration_seconds: f64,
    #[serde(default = "default_media_type")]
    pub media_type: MediaType,
    #[serde(default)]
    pub subtitles: bool,
    /// Simulated load outcome (library default when absent)
    #[serde(default)]
    pub load: Option<LoadBehavior>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Playlist {
    #[serde(default, rename = "track")]
    pub tracks: Vec<PlaylistEntry>,
}

impl Playlist {
    pub fn load(path: &Path) -> Result<Self> {
        let playlist: Playlist = karaoke_common::config::load_toml_file(path)?;
        playlist.validate()?;
        Ok(playlist)
    }

    pub fn validate(&self) -> Result<()> {
        for entry in &self.tracks {
            if !entry.duration_seconds.is_finite() || entry.duration_seconds <= 0.0 {
                return Err(Error::BadRequest(format!(
                    "track {} has invalid duration {}",
                    entry.path.display(),
                    entry.duration_seconds
                )));
            }
        }
        Ok(())
    }

    /// Build a queue, registering scripted load outcomes with `library`
    pub fn into_queue(self, library: &SimulatedLibrary) -> PlayQueue {
        let handles = self.tracks.into_iter().map(|entry| {
            let handle = MediaHandle::new(entry.path, entry.duration_seconds, entry.media_type)
                .with_subtitles(entry.subtitles);
            if let Some(behavior) = entry.load {
                library.set(handle.id, behavior);
            }
            handle
        });
        PlayQueue::with_entries(handles)
    }
}
