//! Playback phases reported by the two streams

use serde::{Deserialize, Serialize};

/// Phase of the whiteboard replay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WhitePhase {
    /// Replay created but the first frame has not been rendered yet
    WaitingFirstFrame,
    /// Replay is advancing
    Playing,
    /// Replay is paused
    Paused,
    /// Replay was stopped by the engine
    Stopped,
    /// Replay reached the end of the recording
    Ended,
    /// Replay is waiting for data
    Buffering,
}

impl WhitePhase {
    /// Phases in which the whiteboard cannot keep pace with the native stream
    pub fn is_buffering(self) -> bool {
        matches!(self, WhitePhase::WaitingFirstFrame | WhitePhase::Buffering)
    }

    /// Phases that mean the whiteboard has data and can resume on request
    pub fn is_ready(self) -> bool {
        matches!(self, WhitePhase::Playing | WhitePhase::Paused)
    }
}

/// Phase of the host's native media player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NativePhase {
    /// Playback has not started or has finished
    Idle,
    /// Playback is paused
    Paused,
    /// Playback is advancing
    Playing,
    /// Playback is waiting for data
    Buffering,
}

impl NativePhase {
    /// Idle counts as buffering: nothing is loaded yet.
    pub fn is_buffering(self) -> bool {
        matches!(self, NativePhase::Idle | NativePhase::Buffering)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_white_phase_classification() {
        assert!(WhitePhase::WaitingFirstFrame.is_buffering());
        assert!(WhitePhase::Buffering.is_buffering());
        assert!(WhitePhase::Playing.is_ready());
        assert!(WhitePhase::Paused.is_ready());

        for phase in [WhitePhase::Stopped, WhitePhase::Ended] {
            assert!(!phase.is_buffering());
            assert!(!phase.is_ready());
        }
    }

    #[test]
    fn test_native_idle_is_buffering() {
        assert!(NativePhase::Idle.is_buffering());
        assert!(NativePhase::Buffering.is_buffering());
        assert!(!NativePhase::Playing.is_buffering());
        assert!(!NativePhase::Paused.is_buffering());
    }

    #[test]
    fn test_phase_serialization() {
        let json = serde_json::to_string(&WhitePhase::WaitingFirstFrame).unwrap();
        assert_eq!(json, "\"waiting_first_frame\"");

        let phase: NativePhase = serde_json::from_str("\"buffering\"").unwrap();
        assert_eq!(phase, NativePhase::Buffering);
    }
}
