//! Pending conditions that gate playback

use bitflags::bitflags;
use std::fmt;

bitflags! {
    /// Why the combined player is not advancing.
    ///
    /// Any set flag vetoes playback; both streams may only be told to play
    /// when the set is empty.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PauseReason: u8 {
        /// The whiteboard replay is buffering or waiting for its first frame
        const WHITE_BUFFERING = 0b001;
        /// The native player is buffering or idle
        const NATIVE_BUFFERING = 0b010;
        /// The host asked for a pause
        const USER_PAUSED = 0b100;
    }
}

impl PauseReason {
    /// Either stream buffering
    pub const BUFFERING: Self = Self::WHITE_BUFFERING.union(Self::NATIVE_BUFFERING);

    /// Neither stream has reported readiness and nothing has been played yet
    pub const INIT: Self = Self::all();

    pub fn is_buffering(self) -> bool {
        self.intersects(Self::BUFFERING)
    }

    pub fn white_buffering(self) -> bool {
        self.contains(Self::WHITE_BUFFERING)
    }

    pub fn native_buffering(self) -> bool {
        self.contains(Self::NATIVE_BUFFERING)
    }

    pub fn user_paused(self) -> bool {
        self.contains(Self::USER_PAUSED)
    }

    /// No pending condition remains
    pub fn can_play(self) -> bool {
        self.is_empty()
    }
}

impl Default for PauseReason {
    fn default() -> Self {
        Self::INIT
    }
}

impl fmt::Display for PauseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "none");
        }

        let names: Vec<&str> = [
            (Self::USER_PAUSED, "user_paused"),
            (Self::WHITE_BUFFERING, "white_buffering"),
            (Self::NATIVE_BUFFERING, "native_buffering"),
        ]
        .into_iter()
        .filter(|(flag, _)| self.contains(*flag))
        .map(|(_, name)| name)
        .collect();
        write!(f, "{}", names.join("+"))
    }
}
