//! Command dispatcher for the native player
//!
//! Native players are generally not safe to drive from arbitrary threads, so
//! every play/pause/rate command goes through a [`CommandDispatcher`]. In
//! dedicated-thread mode the dispatcher owns one worker thread fed by a
//! single-consumer queue; commands run there in the order they were submitted.
//! A command submitted from the worker thread itself while the queue is empty
//! runs inline, so player callbacks that re-enter the core do not deadlock or
//! reorder anything.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::config::{DispatchMode, DispatcherConfig};
use crate::stream::{NativeHandle, NativeMediaStream, NativePhase};

/// A command for the native player
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NativeCommand {
    Play,
    Pause,
    SetPlaybackSpeed(f64),
}

impl NativeCommand {
    fn execute(self, native: &dyn NativeMediaStream) -> anyhow::Result<()> {
        match self {
            NativeCommand::Play => native.play(),
            NativeCommand::Pause => native.pause(),
            NativeCommand::SetPlaybackSpeed(speed) => native.set_playback_speed(speed),
        }
    }
}

impl fmt::Display for NativeCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NativeCommand::Play => write!(f, "play"),
            NativeCommand::Pause => write!(f, "pause"),
            NativeCommand::SetPlaybackSpeed(speed) => write!(f, "set_playback_speed({})", speed),
        }
    }
}

/// Dispatcher failures
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The worker thread has exited
    #[error("native command queue is closed")]
    Closed,

    #[error("failed to spawn native player thread: {0}")]
    Spawn(#[from] std::io::Error),

    /// An inline command was rejected by the player
    #[error("native {command} failed: {source}")]
    Command {
        command: NativeCommand,
        #[source]
        source: anyhow::Error,
    },
}

enum Job {
    Command(NativeCommand),
    Flush(oneshot::Sender<()>),
}

struct Worker {
    tx: mpsc::UnboundedSender<Job>,
    thread_id: ThreadId,
    handle: JoinHandle<()>,
}

/// Serializes commands for one native player onto its designated thread
pub struct CommandDispatcher {
    native: NativeHandle,
    /// `None` in caller-thread mode
    worker: Option<Worker>,
    /// Commands queued but not yet picked up by the worker
    pending: Arc<AtomicUsize>,
    /// Queued commands the player rejected
    failures: Arc<AtomicU64>,
}

impl CommandDispatcher {
    /// Start a dedicated worker thread that will own all native commands
    pub fn spawn(native: NativeHandle, thread_name: &str) -> Result<Self, DispatchError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));
        let failures = Arc::new(AtomicU64::new(0));

        let handle = {
            let native = native.clone();
            let pending = pending.clone();
            let failures = failures.clone();
            thread::Builder::new()
                .name(thread_name.to_string())
                .spawn(move || run_worker(native, rx, pending, failures))?
        };
        let thread_id = handle.thread().id();

        info!("Native player dispatcher started on thread {:?}", thread_name);

        Ok(Self {
            native,
            worker: Some(Worker {
                tx,
                thread_id,
                handle,
            }),
            pending,
            failures,
        })
    }

    /// Execute every command directly on whichever thread submits it.
    ///
    /// Only correct when the host already confines all calls into the core to
    /// the thread that owns the player.
    pub fn inline(native: NativeHandle) -> Self {
        Self {
            native,
            worker: None,
            pending: Arc::new(AtomicUsize::new(0)),
            failures: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Build a dispatcher in the mode selected by configuration
    pub fn from_config(native: NativeHandle, config: &DispatcherConfig) -> Result<Self, DispatchError> {
        match config.mode {
            DispatchMode::DedicatedThread => Self::spawn(native, &config.thread_name),
            DispatchMode::CallerThread => Ok(Self::inline(native)),
        }
    }

    /// Run `command` on the designated thread.
    ///
    /// Queued commands never report the player's result here; failures are
    /// logged on the worker and counted in [`failed_commands`](Self::failed_commands).
    pub fn submit(&self, command: NativeCommand) -> Result<(), DispatchError> {
        let Some(worker) = &self.worker else {
            return self.run_inline(command);
        };

        if thread::current().id() == worker.thread_id && self.pending.load(Ordering::SeqCst) == 0 {
            return self.run_inline(command);
        }

        self.pending.fetch_add(1, Ordering::SeqCst);
        if worker.tx.send(Job::Command(command)).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(DispatchError::Closed);
        }
        debug!("Queued native {}", command);
        Ok(())
    }

    fn run_inline(&self, command: NativeCommand) -> Result<(), DispatchError> {
        debug!("Executing native {} inline", command);
        command
            .execute(self.native.as_ref())
            .map_err(|source| DispatchError::Command { command, source })
    }

    /// Wait until every command submitted before this call has run.
    ///
    /// Returns immediately in caller-thread mode and on the worker thread.
    pub async fn flush(&self) -> Result<(), DispatchError> {
        match self.request_flush()? {
            Some(done) => done.await.map_err(|_| DispatchError::Closed),
            None => Ok(()),
        }
    }

    /// Blocking variant of [`flush`](Self::flush) for non-async callers
    pub fn flush_blocking(&self) -> Result<(), DispatchError> {
        match self.request_flush()? {
            Some(done) => done.blocking_recv().map_err(|_| DispatchError::Closed),
            None => Ok(()),
        }
    }

    fn request_flush(&self) -> Result<Option<oneshot::Receiver<()>>, DispatchError> {
        let Some(worker) = &self.worker else {
            return Ok(None);
        };
        if thread::current().id() == worker.thread_id {
            return Ok(None);
        }

        let (done_tx, done_rx) = oneshot::channel();
        worker
            .tx
            .send(Job::Flush(done_tx))
            .map_err(|_| DispatchError::Closed)?;
        Ok(Some(done_rx))
    }

    /// Buffer query, answered on the calling thread
    pub fn has_enough_buffer(&self) -> bool {
        self.native.has_enough_buffer()
    }

    /// Phase query, answered on the calling thread
    pub fn phase(&self) -> NativePhase {
        self.native.phase()
    }

    /// Whether commands run on a dedicated worker thread
    pub fn is_dedicated(&self) -> bool {
        self.worker.is_some()
    }

    /// Number of queued commands the player has rejected so far
    pub fn failed_commands(&self) -> u64 {
        self.failures.load(Ordering::SeqCst)
    }

    /// Close the queue, let the worker drain it, and join the thread
    pub fn shutdown(mut self) {
        self.stop_worker();
    }

    fn stop_worker(&mut self) {
        let Some(Worker {
            tx,
            thread_id,
            handle,
        }) = self.worker.take()
        else {
            return;
        };

        drop(tx);

        // Joining from the worker itself would never return
        if thread::current().id() == thread_id {
            return;
        }
        if handle.join().is_err() {
            warn!("Native player dispatcher thread panicked");
        }
    }
}

impl Drop for CommandDispatcher {
    fn drop(&mut self) {
        self.stop_worker();
    }
}

impl fmt::Debug for CommandDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandDispatcher")
            .field("dedicated", &self.is_dedicated())
            .field("pending", &self.pending.load(Ordering::SeqCst))
            .field("failures", &self.failed_commands())
            .finish()
    }
}

fn run_worker(
    native: NativeHandle,
    mut rx: mpsc::UnboundedReceiver<Job>,
    pending: Arc<AtomicUsize>,
    failures: Arc<AtomicU64>,
) {
    while let Some(job) = rx.blocking_recv() {
        match job {
            Job::Command(command) => {
                pending.fetch_sub(1, Ordering::SeqCst);
                debug!("Executing native {}", command);
                if let Err(e) = command.execute(native.as_ref()) {
                    failures.fetch_add(1, Ordering::SeqCst);
                    error!("Native {} failed: {:#}", command, e);
                }
            }
            Job::Flush(done) => {
                let _ = done.send(());
            }
        }
    }

    info!("Native player dispatcher stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{CommandLog, SimNativePlayer, StreamCommand, StreamKind};
    use std::sync::{OnceLock, Weak};

    fn sim_native(log: &CommandLog) -> Arc<SimNativePlayer> {
        Arc::new(SimNativePlayer::new(NativePhase::Paused, log.clone()))
    }

    #[test]
    fn test_dedicated_thread_runs_commands_in_order() {
        let log = CommandLog::new();
        let dispatcher = CommandDispatcher::spawn(sim_native(&log), "native-test").unwrap();

        for i in 0..50 {
            let command = if i % 2 == 0 {
                NativeCommand::Play
            } else {
                NativeCommand::Pause
            };
            dispatcher.submit(command).unwrap();
        }
        dispatcher.flush_blocking().unwrap();

        let entries = log.entries();
        assert_eq!(entries.len(), 50);
        for (i, entry) in entries.iter().enumerate() {
            let expected = if i % 2 == 0 {
                StreamCommand::Play
            } else {
                StreamCommand::Pause
            };
            assert_eq!(entry.command, expected);
            assert_eq!(entry.thread.as_deref(), Some("native-test"));
        }
    }

    #[test]
    fn test_inline_runs_on_caller_thread() {
        let log = CommandLog::new();
        let dispatcher = CommandDispatcher::inline(sim_native(&log));
        assert!(!dispatcher.is_dedicated());

        let caller = thread::Builder::new()
            .name("host-ui".to_string())
            .spawn(move || {
                dispatcher.submit(NativeCommand::Play).unwrap();
            })
            .unwrap();
        caller.join().unwrap();

        let entries = log.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].thread.as_deref(), Some("host-ui"));
    }

    #[test]
    fn test_inline_failure_is_returned() {
        let log = CommandLog::new();
        let native = sim_native(&log);
        native.set_failing(true);
        let dispatcher = CommandDispatcher::inline(native);

        let err = dispatcher.submit(NativeCommand::Pause).unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Command {
                command: NativeCommand::Pause,
                ..
            }
        ));
    }

    #[test]
    fn test_queued_failure_is_counted() {
        let log = CommandLog::new();
        let native = sim_native(&log);
        native.set_failing(true);
        let dispatcher = CommandDispatcher::spawn(native.clone(), "native-test").unwrap();

        dispatcher.submit(NativeCommand::Play).unwrap();
        dispatcher.flush_blocking().unwrap();
        assert_eq!(dispatcher.failed_commands(), 1);

        native.set_failing(false);
        dispatcher.submit(NativeCommand::Play).unwrap();
        dispatcher.flush_blocking().unwrap();
        assert_eq!(dispatcher.failed_commands(), 1);
        assert_eq!(log.count(StreamKind::Native, StreamCommand::Play), 1);
    }

    #[tokio::test]
    async fn test_async_flush() {
        let log = CommandLog::new();
        let dispatcher = CommandDispatcher::spawn(sim_native(&log), "native-test").unwrap();

        dispatcher
            .submit(NativeCommand::SetPlaybackSpeed(1.5))
            .unwrap();
        dispatcher.flush().await.unwrap();

        assert_eq!(
            log.last_for(StreamKind::Native),
            Some(StreamCommand::SetPlaybackSpeed(1.5))
        );
    }

    #[test]
    fn test_shutdown_drains_queue() {
        let log = CommandLog::new();
        let dispatcher = CommandDispatcher::spawn(sim_native(&log), "native-test").unwrap();

        for _ in 0..10 {
            dispatcher.submit(NativeCommand::Pause).unwrap();
        }
        dispatcher.shutdown();

        assert_eq!(log.count(StreamKind::Native, StreamCommand::Pause), 10);
    }

    /// Player whose `play` immediately asks its own dispatcher for a pause,
    /// the way a player callback re-entering the core would.
    struct ReentrantPlayer {
        inner: SimNativePlayer,
        dispatcher: OnceLock<Weak<CommandDispatcher>>,
    }

    impl NativeMediaStream for ReentrantPlayer {
        fn play(&self) -> anyhow::Result<()> {
            self.inner.play()?;
            if let Some(dispatcher) = self.dispatcher.get().and_then(Weak::upgrade) {
                dispatcher.submit(NativeCommand::Pause)?;
            }
            Ok(())
        }

        fn pause(&self) -> anyhow::Result<()> {
            self.inner.pause()
        }

        fn has_enough_buffer(&self) -> bool {
            self.inner.has_enough_buffer()
        }

        fn phase(&self) -> NativePhase {
            self.inner.phase()
        }
    }

    #[test]
    fn test_submit_from_worker_thread_runs_inline() {
        let log = CommandLog::new();
        let player = Arc::new(ReentrantPlayer {
            inner: SimNativePlayer::new(NativePhase::Paused, log.clone()),
            dispatcher: OnceLock::new(),
        });
        let dispatcher = Arc::new(CommandDispatcher::spawn(player.clone(), "native-test").unwrap());
        let _ = player.dispatcher.set(Arc::downgrade(&dispatcher));

        dispatcher.submit(NativeCommand::Play).unwrap();
        dispatcher.flush_blocking().unwrap();

        // The nested pause ran before play returned, on the same thread
        let entries = log.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].command, StreamCommand::Play);
        assert_eq!(entries[1].command, StreamCommand::Pause);
        assert!(entries
            .iter()
            .all(|e| e.thread.as_deref() == Some("native-test")));
    }

    #[test]
    fn test_from_config_selects_mode() {
        let log = CommandLog::new();
        let config = DispatcherConfig {
            mode: DispatchMode::CallerThread,
            ..DispatcherConfig::default()
        };
        let dispatcher = CommandDispatcher::from_config(sim_native(&log), &config).unwrap();
        assert!(!dispatcher.is_dedicated());

        let dispatcher =
            CommandDispatcher::from_config(sim_native(&log), &DispatcherConfig::default()).unwrap();
        assert!(dispatcher.is_dedicated());
    }
}
