//! The two streams kept in step: the whiteboard replay and the native player

mod backend;
mod phase;

pub use backend::*;
pub use phase::{NativePhase, WhitePhase};
