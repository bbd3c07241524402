//! In-memory streams
//!
//! Both simulated streams record every command they receive into a shared
//! [`CommandLog`] together with the name of the thread that issued it. Phases
//! and buffer sufficiency are set from the outside, the way a real engine or
//! player would report them.

use anyhow::{bail, Result};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::stream::{NativeMediaStream, NativePhase, WhitePhase, WhiteboardStream};

/// Which stream a command went to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    Whiteboard,
    Native,
}

/// A command as received by a simulated stream
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamCommand {
    Play,
    Pause,
    Seek(u64),
    SetPlaybackSpeed(f64),
}

/// One entry of a [`CommandLog`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordedCommand {
    pub stream: StreamKind,
    pub command: StreamCommand,
    /// Name of the thread the command ran on, if it has one
    pub thread: Option<String>,
}

/// Shared, ordered record of commands received by simulated streams
#[derive(Debug, Clone, Default)]
pub struct CommandLog {
    entries: Arc<Mutex<Vec<RecordedCommand>>>,
}

impl CommandLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, stream: StreamKind, command: StreamCommand) {
        let thread = std::thread::current().name().map(str::to_string);
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedCommand {
                stream,
                command,
                thread,
            });
    }

    /// Snapshot of every recorded command, oldest first
    pub fn entries(&self) -> Vec<RecordedCommand> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Commands received by one stream, oldest first
    pub fn commands_for(&self, stream: StreamKind) -> Vec<StreamCommand> {
        self.entries()
            .into_iter()
            .filter(|entry| entry.stream == stream)
            .map(|entry| entry.command)
            .collect()
    }

    /// Most recent command received by one stream
    pub fn last_for(&self, stream: StreamKind) -> Option<StreamCommand> {
        self.commands_for(stream).pop()
    }

    /// How many times `stream` received `command`
    pub fn count(&self, stream: StreamKind, command: StreamCommand) -> usize {
        self.commands_for(stream)
            .into_iter()
            .filter(|c| *c == command)
            .count()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Simulated whiteboard replay
#[derive(Debug)]
pub struct SimWhiteboard {
    phase: Mutex<WhitePhase>,
    position_ms: AtomicU64,
    speed: Mutex<f64>,
    failing: AtomicBool,
    log: CommandLog,
}

impl SimWhiteboard {
    pub fn new(phase: WhitePhase, log: CommandLog) -> Self {
        Self {
            phase: Mutex::new(phase),
            position_ms: AtomicU64::new(0),
            speed: Mutex::new(1.0),
            failing: AtomicBool::new(false),
            log,
        }
    }

    /// Change the phase the replay reports
    pub fn set_phase(&self, phase: WhitePhase) {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner) = phase;
    }

    /// Make every subsequent command fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Position of the last seek
    pub fn position_ms(&self) -> u64 {
        self.position_ms.load(Ordering::SeqCst)
    }

    pub fn playback_speed(&self) -> f64 {
        *self.speed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("simulated whiteboard failure");
        }
        Ok(())
    }
}

impl WhiteboardStream for SimWhiteboard {
    fn play(&self) -> Result<()> {
        self.check()?;
        self.log.record(StreamKind::Whiteboard, StreamCommand::Play);
        Ok(())
    }

    fn pause(&self) -> Result<()> {
        self.check()?;
        self.log.record(StreamKind::Whiteboard, StreamCommand::Pause);
        Ok(())
    }

    fn seek(&self, offset_ms: u64) -> Result<()> {
        self.check()?;
        self.position_ms.store(offset_ms, Ordering::SeqCst);
        self.log
            .record(StreamKind::Whiteboard, StreamCommand::Seek(offset_ms));
        Ok(())
    }

    fn phase(&self) -> WhitePhase {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_playback_speed(&self, speed: f64) -> Result<()> {
        self.check()?;
        *self.speed.lock().unwrap_or_else(PoisonError::into_inner) = speed;
        self.log
            .record(StreamKind::Whiteboard, StreamCommand::SetPlaybackSpeed(speed));
        Ok(())
    }
}

/// Simulated native media player
#[derive(Debug)]
pub struct SimNativePlayer {
    phase: Mutex<NativePhase>,
    enough_buffer: AtomicBool,
    failing: AtomicBool,
    log: CommandLog,
}

impl SimNativePlayer {
    pub fn new(phase: NativePhase, log: CommandLog) -> Self {
        Self {
            phase: Mutex::new(phase),
            enough_buffer: AtomicBool::new(!phase.is_buffering()),
            failing: AtomicBool::new(false),
            log,
        }
    }

    /// Change the phase the player reports
    pub fn set_phase(&self, phase: NativePhase) {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner) = phase;
    }

    pub fn set_enough_buffer(&self, enough: bool) {
        self.enough_buffer.store(enough, Ordering::SeqCst);
    }

    /// Make every subsequent command fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("simulated native player failure");
        }
        Ok(())
    }
}

impl NativeMediaStream for SimNativePlayer {
    fn play(&self) -> Result<()> {
        self.check()?;
        self.log.record(StreamKind::Native, StreamCommand::Play);
        Ok(())
    }

    fn pause(&self) -> Result<()> {
        self.check()?;
        self.log.record(StreamKind::Native, StreamCommand::Pause);
        Ok(())
    }

    fn has_enough_buffer(&self) -> bool {
        self.enough_buffer.load(Ordering::SeqCst)
    }

    fn phase(&self) -> NativePhase {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_playback_speed(&self, speed: f64) -> Result<()> {
        self.check()?;
        self.log
            .record(StreamKind::Native, StreamCommand::SetPlaybackSpeed(speed));
        Ok(())
    }
}
