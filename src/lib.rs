//! combine-player
//!
//! Keeps a whiteboard replay and a native media stream on one timeline. Either
//! stream buffering pauses the other; both resume together once nothing is
//! pending and the host has asked to play.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod sim;
pub mod stream;
pub mod sync;

pub use dispatch::{CommandDispatcher, DispatchError, NativeCommand};
pub use error::SyncError;
pub use stream::{
    NativeHandle, NativeMediaStream, NativePhase, WhiteboardHandle, WhiteboardStream, WhitePhase,
};
pub use sync::{
    create_engine_channels, EngineCommand, NoopCallbacks, PauseReason, PlayerSyncManager,
    PlayerSyncManagerBuilder, SyncCallbacks, SyncEngine, SyncStatus,
};
