//! Dual-stream playback synchronizer
//!
//! Keeps the whiteboard replay and the native player on one timeline. Three
//! independent conditions ([`PauseReason`]) can each veto playback: a user
//! pause, whiteboard buffering, and native buffering. Buffering on either side
//! immediately pauses the other side; both resume only once every condition
//! has cleared.
//!
//! All state lives behind one mutex that is held for a whole transition,
//! including the commands it issues and the callbacks it fires.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info};

use super::{NoopCallbacks, PauseReason, SyncCallbacks, SyncStatus};
use crate::dispatch::{CommandDispatcher, DispatchError, NativeCommand};
use crate::error::SyncError;
use crate::stream::{NativePhase, WhitePhase, WhiteboardHandle};

const STATUS_CHANNEL_CAPACITY: usize = 64;

/// Last command issued to a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Commanded {
    Play,
    Pause,
}

struct SyncCore {
    reason: PauseReason,
    whiteboard: Option<WhiteboardHandle>,
    native: Arc<CommandDispatcher>,
    callbacks: Box<dyn SyncCallbacks>,
    status_tx: broadcast::Sender<SyncStatus>,
    playback_speed: f64,
    white_commanded: Option<Commanded>,
    native_commanded: Option<Commanded>,
    /// Both streams were last commanded to play
    playing: bool,
}

impl SyncCore {
    fn play(&mut self) -> Result<(), SyncError> {
        self.reason.remove(PauseReason::USER_PAUSED);

        // The native player has to be running to fill its buffer
        self.play_native()?;
        if self.native.has_enough_buffer() && !self.reason.is_buffering() {
            self.play_whiteboard()?;
        }

        debug!("play: pending={}", self.reason);
        Ok(())
    }

    fn pause(&mut self) -> Result<(), SyncError> {
        self.reason.insert(PauseReason::USER_PAUSED);
        self.pause_native()?;
        self.pause_whiteboard()?;

        debug!("pause: pending={}", self.reason);
        Ok(())
    }

    fn seek(&mut self, offset: Duration) -> Result<(), SyncError> {
        let offset_ms = u64::try_from(offset.as_millis()).unwrap_or(u64::MAX);

        let Some(whiteboard) = &self.whiteboard else {
            debug!("No whiteboard bound, ignoring seek to {}ms", offset_ms);
            return Ok(());
        };

        whiteboard
            .seek(offset_ms)
            .map_err(|e| SyncError::whiteboard("seek", e))?;
        debug!("Whiteboard seeked to {}ms", offset_ms);
        self.emit(SyncStatus::Seeked { offset_ms });
        Ok(())
    }

    fn update_native_phase(&mut self, phase: NativePhase) -> Result<(), SyncError> {
        debug!("Native phase {:?} (pending={})", phase, self.reason);
        if phase.is_buffering() {
            self.native_start_buffering()
        } else {
            self.native_end_buffering()
        }
    }

    fn update_white_phase(&mut self, phase: WhitePhase) -> Result<(), SyncError> {
        debug!("Whiteboard phase {:?} (pending={})", phase, self.reason);
        if phase.is_buffering() {
            self.white_start_buffering()
        } else if phase.is_ready() {
            self.white_end_buffering()
        } else {
            debug!("Whiteboard phase {:?} leaves sync state unchanged", phase);
            Ok(())
        }
    }

    fn native_start_buffering(&mut self) -> Result<(), SyncError> {
        let was_buffering = self.reason.is_buffering();
        let was_native_buffering = self.reason.native_buffering();
        self.reason.insert(PauseReason::NATIVE_BUFFERING);

        if !was_native_buffering {
            self.emit(SyncStatus::NativeBufferingStarted);
        }
        if !was_buffering {
            self.buffering_started();
        }

        self.pause_whiteboard()
    }

    fn native_end_buffering(&mut self) -> Result<(), SyncError> {
        let was_buffering = self.reason.is_buffering();
        let was_native_buffering = self.reason.native_buffering();
        self.reason.remove(PauseReason::NATIVE_BUFFERING);

        if was_native_buffering {
            self.emit(SyncStatus::NativeBufferingEnded);
        }

        if self.reason.white_buffering() {
            // Hold the native player until the whiteboard catches up
            self.pause_native()?;
        } else if was_buffering {
            self.buffering_ended();
        }

        if self.reason.can_play() {
            self.play_both()?;
        }
        Ok(())
    }

    fn white_start_buffering(&mut self) -> Result<(), SyncError> {
        let was_buffering = self.reason.is_buffering();
        self.reason.insert(PauseReason::WHITE_BUFFERING);

        if !was_buffering {
            self.buffering_started();
        }

        self.pause_native()
    }

    fn white_end_buffering(&mut self) -> Result<(), SyncError> {
        let was_buffering = self.reason.is_buffering();
        self.reason.remove(PauseReason::WHITE_BUFFERING);

        if self.reason.native_buffering() {
            self.pause_whiteboard()?;
        } else if was_buffering {
            self.buffering_ended();
        }

        if self.reason.can_play() {
            self.play_both()?;
        } else if self.reason.user_paused() {
            self.pause_whiteboard()?;
            self.pause_native()?;
        }
        Ok(())
    }

    fn set_whiteboard(&mut self, whiteboard: WhiteboardHandle) -> Result<(), SyncError> {
        info!("Binding whiteboard replay (pending={})", self.reason);
        if self.whiteboard.is_some() {
            debug!("Releasing previous whiteboard replay without pausing it");
        }

        self.apply_whiteboard_speed(&whiteboard)?;

        let phase = whiteboard.phase();
        self.whiteboard = Some(whiteboard);
        self.white_commanded = None;
        self.emit(SyncStatus::WhiteboardBound);

        self.update_white_phase(phase)
    }

    /// Bring a newly bound whiteboard to the current speed
    fn apply_whiteboard_speed(&self, whiteboard: &WhiteboardHandle) -> Result<(), SyncError> {
        if self.playback_speed != 1.0 {
            whiteboard
                .set_playback_speed(self.playback_speed)
                .map_err(|e| SyncError::whiteboard("set_playback_speed", e))?;
        }
        Ok(())
    }

    fn native_finished(&self) {
        info!("Native player finished (pending={})", self.reason);
        self.emit(SyncStatus::NativeFinished);
    }

    fn set_playback_speed(&mut self, speed: f64) -> Result<(), SyncError> {
        if !speed.is_finite() || speed <= 0.0 {
            return Err(SyncError::InvalidPlaybackSpeed(speed));
        }

        self.playback_speed = speed;
        if let Some(whiteboard) = &self.whiteboard {
            whiteboard
                .set_playback_speed(speed)
                .map_err(|e| SyncError::whiteboard("set_playback_speed", e))?;
        }
        self.native.submit(NativeCommand::SetPlaybackSpeed(speed))?;

        info!("Playback speed set to {}", speed);
        self.emit(SyncStatus::PlaybackSpeedChanged { speed });
        Ok(())
    }

    fn play_both(&mut self) -> Result<(), SyncError> {
        self.play_native()?;
        self.play_whiteboard()
    }

    fn play_native(&mut self) -> Result<(), SyncError> {
        self.native.submit(NativeCommand::Play)?;
        self.native_commanded = Some(Commanded::Play);
        Ok(())
    }

    fn pause_native(&mut self) -> Result<(), SyncError> {
        self.native.submit(NativeCommand::Pause)?;
        self.native_commanded = Some(Commanded::Pause);
        Ok(())
    }

    fn play_whiteboard(&mut self) -> Result<(), SyncError> {
        if let Some(whiteboard) = &self.whiteboard {
            whiteboard
                .play()
                .map_err(|e| SyncError::whiteboard("play", e))?;
            self.white_commanded = Some(Commanded::Play);
        }
        Ok(())
    }

    fn pause_whiteboard(&mut self) -> Result<(), SyncError> {
        if let Some(whiteboard) = &self.whiteboard {
            whiteboard
                .pause()
                .map_err(|e| SyncError::whiteboard("pause", e))?;
            self.white_commanded = Some(Commanded::Pause);
        }
        Ok(())
    }

    fn buffering_started(&self) {
        info!("Buffering started (pending={})", self.reason);
        self.callbacks.on_buffering_start();
        self.emit(SyncStatus::BufferingStarted);
    }

    fn buffering_ended(&self) {
        info!("Buffering ended (pending={})", self.reason);
        self.callbacks.on_buffering_end();
        self.emit(SyncStatus::BufferingEnded);
    }

    /// Publish a change in the combined play state, if any
    fn publish_play_state(&mut self) {
        let white_playing = match self.whiteboard {
            Some(_) => self.white_commanded == Some(Commanded::Play),
            None => true,
        };
        let playing = white_playing && self.native_commanded == Some(Commanded::Play);

        if playing != self.playing {
            self.playing = playing;
            debug!("Combined play state: playing={}", playing);
            self.emit(SyncStatus::PlayStateChanged { playing });
        }
    }

    fn emit(&self, status: SyncStatus) {
        // No subscribers is fine
        let _ = self.status_tx.send(status);
    }
}

/// Keeps a whiteboard replay and a native player in step.
///
/// All methods take `&self` and may be called from any thread; share the
/// manager through an `Arc`.
pub struct PlayerSyncManager {
    core: Mutex<SyncCore>,
    native: Arc<CommandDispatcher>,
    status_tx: broadcast::Sender<SyncStatus>,
}

impl PlayerSyncManager {
    /// Start building a manager around the dispatcher that owns the native player
    pub fn builder(native: CommandDispatcher) -> PlayerSyncManagerBuilder {
        PlayerSyncManagerBuilder {
            native,
            whiteboard: None,
            callbacks: Box::new(NoopCallbacks),
            status_tx: None,
            playback_speed: 1.0,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SyncCore> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition<F>(&self, apply: F) -> Result<(), SyncError>
    where
        F: FnOnce(&mut SyncCore) -> Result<(), SyncError>,
    {
        let mut core = self.lock();
        let result = apply(&mut core);
        core.publish_play_state();
        result
    }

    /// Resume playback.
    ///
    /// The native player is always told to play. The whiteboard follows only
    /// when the native player already has enough buffer and nothing else is
    /// pending; otherwise it starts once native buffering ends.
    pub fn play(&self) -> Result<(), SyncError> {
        self.transition(SyncCore::play)
    }

    /// Pause both streams until the next [`play`](Self::play)
    pub fn pause(&self) -> Result<(), SyncError> {
        self.transition(SyncCore::pause)
    }

    /// Move the whiteboard to `offset` from the start of the recording.
    ///
    /// Only the whiteboard is seeked; the host seeks its own player. Any
    /// buffering this causes arrives later as phase updates.
    pub fn seek(&self, offset: Duration) -> Result<(), SyncError> {
        self.transition(|core| core.seek(offset))
    }

    /// Feed a phase change reported by the native player
    pub fn update_native_phase(&self, phase: NativePhase) -> Result<(), SyncError> {
        self.transition(|core| core.update_native_phase(phase))
    }

    /// Feed a phase change reported by the whiteboard replay
    pub fn update_white_phase(&self, phase: WhitePhase) -> Result<(), SyncError> {
        self.transition(|core| core.update_white_phase(phase))
    }

    /// Bind a new whiteboard replay and evaluate its current phase
    pub fn set_whiteboard_stream(&self, whiteboard: WhiteboardHandle) -> Result<(), SyncError> {
        self.transition(|core| core.set_whiteboard(whiteboard))
    }

    /// The native player reached the end of its media.
    ///
    /// Only reported to subscribers; the host follows up with the phase the
    /// player settles in.
    pub fn native_finished(&self) {
        self.lock().native_finished();
    }

    /// Change the playback speed of both streams. Pausing keeps the speed.
    pub fn set_playback_speed(&self, speed: f64) -> Result<(), SyncError> {
        self.transition(|core| core.set_playback_speed(speed))
    }

    pub fn playback_speed(&self) -> f64 {
        self.lock().playback_speed
    }

    /// Snapshot of the pending conditions
    pub fn pause_reason(&self) -> PauseReason {
        self.lock().reason
    }

    /// Whether both streams are currently commanded to play
    pub fn is_playing(&self) -> bool {
        self.lock().playing
    }

    pub fn has_whiteboard(&self) -> bool {
        self.lock().whiteboard.is_some()
    }

    /// Phase the native player reports right now
    pub fn native_phase(&self) -> NativePhase {
        self.native.phase()
    }

    /// Phase the bound whiteboard reports right now
    pub fn whiteboard_phase(&self) -> Option<WhitePhase> {
        self.lock().whiteboard.as_ref().map(|whiteboard| whiteboard.phase())
    }

    /// Receive status updates
    pub fn subscribe(&self) -> broadcast::Receiver<SyncStatus> {
        self.status_tx.subscribe()
    }

    /// Wait until every native command issued so far has run
    pub async fn flush_native(&self) -> Result<(), DispatchError> {
        self.native.flush().await
    }

    /// Blocking variant of [`flush_native`](Self::flush_native)
    pub fn flush_native_blocking(&self) -> Result<(), DispatchError> {
        self.native.flush_blocking()
    }
}

/// Builder for [`PlayerSyncManager`]
pub struct PlayerSyncManagerBuilder {
    native: CommandDispatcher,
    whiteboard: Option<WhiteboardHandle>,
    callbacks: Box<dyn SyncCallbacks>,
    status_tx: Option<broadcast::Sender<SyncStatus>>,
    playback_speed: f64,
}

impl PlayerSyncManagerBuilder {
    /// Whiteboard replay to bind right away
    pub fn whiteboard(mut self, whiteboard: WhiteboardHandle) -> Self {
        self.whiteboard = Some(whiteboard);
        self
    }

    /// Buffering start/end notifications
    pub fn callbacks(mut self, callbacks: impl SyncCallbacks + 'static) -> Self {
        self.callbacks = Box::new(callbacks);
        self
    }

    /// Publish status updates on an existing channel
    pub fn status_sender(mut self, status_tx: broadcast::Sender<SyncStatus>) -> Self {
        self.status_tx = Some(status_tx);
        self
    }

    pub fn playback_speed(mut self, speed: f64) -> Self {
        self.playback_speed = speed;
        self
    }

    /// Create the manager and evaluate the phases both streams report now
    pub fn build(self) -> Result<PlayerSyncManager, SyncError> {
        let speed = self.playback_speed;
        if !speed.is_finite() || speed <= 0.0 {
            return Err(SyncError::InvalidPlaybackSpeed(speed));
        }

        let status_tx = self
            .status_tx
            .unwrap_or_else(|| broadcast::channel(STATUS_CHANNEL_CAPACITY).0);
        let native = Arc::new(self.native);

        let mut core = SyncCore {
            reason: PauseReason::INIT,
            whiteboard: None,
            native: native.clone(),
            callbacks: self.callbacks,
            status_tx: status_tx.clone(),
            playback_speed: 1.0,
            white_commanded: None,
            native_commanded: None,
            playing: false,
        };

        if speed != 1.0 {
            core.set_playback_speed(speed)?;
        }

        core.update_native_phase(native.phase())?;
        if let Some(whiteboard) = self.whiteboard {
            core.apply_whiteboard_speed(&whiteboard)?;
            let phase = whiteboard.phase();
            core.whiteboard = Some(whiteboard);
            core.update_white_phase(phase)?;
        }
        core.publish_play_state();

        info!("Player sync ready (pending={})", core.reason);

        Ok(PlayerSyncManager {
            core: Mutex::new(core),
            native,
            status_tx,
        })
    }
}
