//! Media handle definitions
//!
//! A `MediaHandle` is the immutable description of one queued track. It is
//! created by the track source when a queue item is selected and is only ever
//! read by the playback core.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Stable identifier for a queued track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaId(Uuid);

impl MediaId {
    /// Generate a fresh random identifier
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for MediaId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MediaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of media a track renders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    /// Video karaoke track (picture + sound)
    Video,
    /// Audio-only track (typically with a lyrics/subtitle overlay)
    Audio,
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaType::Video => write!(f, "video"),
            MediaType::Audio => write!(f, "audio"),
        }
    }
}

/// Immutable description of a playable track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaHandle {
    /// Track identifier
    pub id: MediaId,
    /// Location of the media file
    pub path: PathBuf,
    /// Nominal duration in seconds (the engine may report a more precise value once loaded)
    pub duration_seconds: f64,
    /// Video or audio
    pub media_type: MediaType,
    /// Whether a subtitle/lyrics track is available
    pub has_subtitles: bool,
}

impl MediaHandle {
    /// Create a handle with a fresh identifier
    pub fn new(path: impl Into<PathBuf>, duration_seconds: f64, media_type: MediaType) -> Self {
        Self {
            id: MediaId::new(),
            path: path.into(),
            duration_seconds,
            media_type,
            has_subtitles: false,
        }
    }

    /// Builder-style subtitle flag
    pub fn with_subtitles(mut self, has_subtitles: bool) -> Self {
        self.has_subtitles = has_subtitles;
        self
    }

    /// Builder-style explicit identifier
    pub fn with_id(mut self, id: MediaId) -> Self {
        self.id = id;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name for log messages
    pub fn display_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.id.to_string())
    }
}
