//! Synchronization engine
//!
//! Async front end for [`PlayerSyncManager`]. The engine owns the command
//! receiver, forwards host commands into the core, and optionally polls both
//! streams for phase changes so hosts without push notifications still get
//! buffering handled.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info};

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::stream::{NativePhase, WhitePhase};

use super::{EngineCommand, PlayerSyncManager, SyncStatus};

/// The synchronization engine drives one [`PlayerSyncManager`]
pub struct SyncEngine {
    /// Configuration
    config: SyncConfig,
    /// Core state machine
    manager: Arc<PlayerSyncManager>,
    /// Command receiver
    cmd_rx: mpsc::Receiver<EngineCommand>,
    /// Status broadcaster
    status_tx: broadcast::Sender<SyncStatus>,
    /// Last native phase fed into the core
    last_native_phase: Option<NativePhase>,
    /// Last whiteboard phase fed into the core
    last_white_phase: Option<WhitePhase>,
}

impl SyncEngine {
    /// Create a new sync engine
    pub fn new(
        config: SyncConfig,
        manager: Arc<PlayerSyncManager>,
        cmd_rx: mpsc::Receiver<EngineCommand>,
        status_tx: broadcast::Sender<SyncStatus>,
    ) -> Self {
        // The core evaluated both phases when it was built
        let last_native_phase = Some(manager.native_phase());
        let last_white_phase = manager.whiteboard_phase();

        Self {
            config,
            manager,
            cmd_rx,
            status_tx,
            last_native_phase,
            last_white_phase,
        }
    }

    /// Run the engine until `Shutdown` arrives or every sender is dropped
    pub async fn run(&mut self) -> Result<()> {
        info!(
            "Sync engine starting (poll interval {}ms)",
            self.config.poll_interval_ms
        );

        let mut poll_timer = match self.config.poll_interval_ms {
            0 => None,
            ms => Some(tokio::time::interval(Duration::from_millis(ms))),
        };

        loop {
            tokio::select! {
                // Handle commands
                cmd = self.cmd_rx.recv() => {
                    let Some(cmd) = cmd else {
                        info!("Command channel closed");
                        break;
                    };
                    if matches!(cmd, EngineCommand::Shutdown) {
                        info!("Shutdown command received");
                        break;
                    }

                    debug!("Engine command: {:?}", cmd);
                    if let Err(e) = self.handle_command(cmd) {
                        self.report_error(e);
                    }
                }

                // Poll both streams for phase changes (if enabled)
                _ = async {
                    match poll_timer.as_mut() {
                        Some(timer) => timer.tick().await,
                        None => std::future::pending().await,
                    }
                } => {
                    if let Err(e) = self.poll_phases() {
                        self.report_error(e);
                    }
                }
            }
        }

        self.manager.flush_native().await?;
        let _ = self.status_tx.send(SyncStatus::Stopped);
        info!("Sync engine stopped");
        Ok(())
    }

    fn handle_command(&mut self, cmd: EngineCommand) -> Result<(), SyncError> {
        match cmd {
            EngineCommand::Play => self.manager.play(),
            EngineCommand::Pause => self.manager.pause(),
            EngineCommand::Seek(offset) => self.manager.seek(offset),
            EngineCommand::NativePhaseChanged(phase) => {
                self.last_native_phase = Some(phase);
                self.manager.update_native_phase(phase)
            }
            EngineCommand::WhitePhaseChanged(phase) => {
                self.last_white_phase = Some(phase);
                self.manager.update_white_phase(phase)
            }
            EngineCommand::NativeFinished => {
                self.manager.native_finished();
                Ok(())
            }
            EngineCommand::SetWhiteboard(whiteboard) => {
                self.last_white_phase = Some(whiteboard.phase());
                self.manager.set_whiteboard_stream(whiteboard)
            }
            EngineCommand::SetPlaybackSpeed(speed) => self.manager.set_playback_speed(speed),
            EngineCommand::Shutdown => Ok(()),
        }
    }

    /// Feed phases that changed since the last observation into the core
    fn poll_phases(&mut self) -> Result<(), SyncError> {
        let native = self.manager.native_phase();
        if self.last_native_phase != Some(native) {
            debug!("Polled native phase change: {:?}", native);
            self.last_native_phase = Some(native);
            self.manager.update_native_phase(native)?;
        }

        if let Some(white) = self.manager.whiteboard_phase() {
            if self.last_white_phase != Some(white) {
                debug!("Polled whiteboard phase change: {:?}", white);
                self.last_white_phase = Some(white);
                self.manager.update_white_phase(white)?;
            }
        }

        Ok(())
    }

    fn report_error(&self, e: SyncError) {
        let message = e.to_string();
        error!("Sync command failed: {:#}", anyhow::Error::from(e));
        let _ = self.status_tx.send(SyncStatus::Error { message });
    }
}

/// Create command and status channels for the engine
pub fn create_engine_channels() -> (
    mpsc::Sender<EngineCommand>,
    mpsc::Receiver<EngineCommand>,
    broadcast::Sender<SyncStatus>,
    broadcast::Receiver<SyncStatus>,
) {
    let (cmd_tx, cmd_rx) = mpsc::channel(32);
    let (status_tx, status_rx) = broadcast::channel(16);
    (cmd_tx, cmd_rx, status_tx, status_rx)
}
