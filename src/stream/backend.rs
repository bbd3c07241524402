//! Stream capability traits

use anyhow::Result;
use std::sync::Arc;

use super::{NativePhase, WhitePhase};

/// The remotely-driven whiteboard replay.
///
/// Implementations forward each call to the whiteboard engine. Commands may be
/// issued from any thread.
pub trait WhiteboardStream: Send + Sync {
    /// Resume the replay
    fn play(&self) -> Result<()>;

    /// Pause the replay
    fn pause(&self) -> Result<()>;

    /// Jump to a position in the recording, in milliseconds from its start
    fn seek(&self, offset_ms: u64) -> Result<()>;

    /// Current phase as last reported by the engine
    fn phase(&self) -> WhitePhase;

    /// Change the replay speed multiplier
    fn set_playback_speed(&self, _speed: f64) -> Result<()> {
        Ok(())
    }
}

/// The host's native audio/video player.
///
/// `play`, `pause` and `set_playback_speed` are only ever invoked by a
/// [`CommandDispatcher`](crate::dispatch::CommandDispatcher). The queries must
/// be answerable from any thread.
pub trait NativeMediaStream: Send + Sync {
    /// Start or resume playback
    fn play(&self) -> Result<()>;

    /// Pause playback
    fn pause(&self) -> Result<()>;

    /// Whether enough media is loaded to play without stalling
    fn has_enough_buffer(&self) -> bool;

    /// Current phase of the player
    fn phase(&self) -> NativePhase;

    /// Change the playback rate
    fn set_playback_speed(&self, _speed: f64) -> Result<()> {
        Ok(())
    }
}

/// Shared handle to a whiteboard replay
pub type WhiteboardHandle = Arc<dyn WhiteboardStream>;

/// Shared handle to a native player
pub type NativeHandle = Arc<dyn NativeMediaStream>;
