//! Synchronization of the whiteboard replay with the native player

mod engine;
mod manager;
mod state;

use serde::Serialize;
use std::fmt;
use std::time::Duration;

use crate::stream::{NativePhase, WhitePhase, WhiteboardHandle};

pub use engine::{create_engine_channels, SyncEngine};
pub use manager::{PlayerSyncManager, PlayerSyncManagerBuilder};
pub use state::PauseReason;

/// Host notifications for buffering episodes.
///
/// Invoked synchronously while the core holds its lock; implementations must
/// not call back into the same [`PlayerSyncManager`].
pub trait SyncCallbacks: Send {
    /// Playback stalled because at least one stream is buffering
    fn on_buffering_start(&self);

    /// Both streams have recovered
    fn on_buffering_end(&self);
}

/// A pair of closures: `(on_buffering_start, on_buffering_end)`
impl<S, E> SyncCallbacks for (S, E)
where
    S: Fn() + Send,
    E: Fn() + Send,
{
    fn on_buffering_start(&self) {
        (self.0)()
    }

    fn on_buffering_end(&self) {
        (self.1)()
    }
}

/// Callbacks that ignore every notification
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCallbacks;

impl SyncCallbacks for NoopCallbacks {
    fn on_buffering_start(&self) {}

    fn on_buffering_end(&self) {}
}

/// Commands that can be sent to the sync engine
#[derive(Clone)]
pub enum EngineCommand {
    /// Host pressed play
    Play,
    /// Host pressed pause
    Pause,
    /// Host moved the timeline
    Seek(Duration),
    /// The native player reported a new phase
    NativePhaseChanged(NativePhase),
    /// The whiteboard replay reported a new phase
    WhitePhaseChanged(WhitePhase),
    /// The native player reached the end of its media
    NativeFinished,
    /// Bind a new whiteboard replay
    SetWhiteboard(WhiteboardHandle),
    /// Change the playback speed of both streams
    SetPlaybackSpeed(f64),
    /// Shutdown the engine
    Shutdown,
}

impl fmt::Debug for EngineCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineCommand::Play => write!(f, "Play"),
            EngineCommand::Pause => write!(f, "Pause"),
            EngineCommand::Seek(offset) => f.debug_tuple("Seek").field(offset).finish(),
            EngineCommand::NativePhaseChanged(phase) => {
                f.debug_tuple("NativePhaseChanged").field(phase).finish()
            }
            EngineCommand::WhitePhaseChanged(phase) => {
                f.debug_tuple("WhitePhaseChanged").field(phase).finish()
            }
            EngineCommand::NativeFinished => write!(f, "NativeFinished"),
            EngineCommand::SetWhiteboard(_) => write!(f, "SetWhiteboard(..)"),
            EngineCommand::SetPlaybackSpeed(speed) => {
                f.debug_tuple("SetPlaybackSpeed").field(speed).finish()
            }
            EngineCommand::Shutdown => write!(f, "Shutdown"),
        }
    }
}

/// Status updates published by the core and the engine
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SyncStatus {
    /// A buffering episode began (either stream)
    BufferingStarted,
    /// The buffering episode is over
    BufferingEnded,
    /// The native player entered buffering
    NativeBufferingStarted,
    /// The native player left buffering
    NativeBufferingEnded,
    /// The native player reached the end of its media
    NativeFinished,
    /// Whether both streams are now commanded to play
    PlayStateChanged { playing: bool },
    /// A whiteboard replay was bound
    WhiteboardBound,
    /// The whiteboard was moved to a new position
    Seeked { offset_ms: u64 },
    /// Playback speed applied to both streams
    PlaybackSpeedChanged { speed: f64 },
    /// A command failed
    Error { message: String },
    /// The engine stopped
    Stopped,
}
