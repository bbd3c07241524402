//! Errors surfaced by the synchronization core

use thiserror::Error;

use crate::dispatch::DispatchError;

/// Failure while driving one of the two streams
#[derive(Debug, Error)]
pub enum SyncError {
    /// The whiteboard rejected a command
    #[error("whiteboard {command} failed: {source}")]
    Whiteboard {
        command: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// A native command could not be dispatched or failed inline
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// Playback speed must be a positive, finite multiplier
    #[error("invalid playback speed {0}")]
    InvalidPlaybackSpeed(f64),
}

impl SyncError {
    pub(crate) fn whiteboard(command: &'static str, source: anyhow::Error) -> Self {
        SyncError::Whiteboard { command, source }
    }
}
