//! Commands accepted by the playback core task

use karaoke_common::MediaHandle;
use tokio::sync::oneshot;

/// Requests handled between ticks
///
/// Settings changes are not commands: they travel through the settings
/// `watch` channel, and `Reconfigure` only asks the core to apply them now
/// instead of at the next tick.
#[derive(Debug, Clone)]
pub enum Command {
    /// Load and start `handle` on the Active engine
    Play(MediaHandle),
    Pause,
    Resume,
    /// Stop both engines; the Active track stays loaded
    Stop,
    /// Reposition the Active track (seconds, already validated)
    Seek(f64),
    /// Cut to the next candidate now
    SkipNext,
    /// Name the next candidate explicitly
    PreloadNext(MediaHandle),
    /// Apply the latest settings snapshot immediately
    Reconfigure,
    /// Stop everything and end the core task
    Shutdown,
}

/// Command plus its completion acknowledgement
#[derive(Debug)]
pub struct ControlMessage {
    pub command: Command,
    pub ack: oneshot::Sender<()>,
}

impl ControlMessage {
    pub fn new(command: Command) -> (Self, oneshot::Receiver<()>) {
        let (ack, done) = oneshot::channel();
        (Self { command, ack }, done)
    }
}
