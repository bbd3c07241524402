//! combine-player demo
//!
//! Wires simulated streams through the dispatcher, the sync core and the
//! engine, then plays a scripted session and prints every status update.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};

use combine_player::config::Config;
use combine_player::logging::init_logging;
use combine_player::sim::{CommandLog, SimNativePlayer, SimWhiteboard};
use combine_player::{
    create_engine_channels, CommandDispatcher, EngineCommand, NativePhase, PlayerSyncManager,
    SyncEngine, SyncStatus, WhitePhase,
};

/// Pause between scripted steps
const STEP_DELAY: Duration = Duration::from_millis(300);

struct Args {
    config: Option<PathBuf>,
    json: bool,
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }
    let args = parse_args(&args)?;

    // Load configuration
    let config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    // Initialize logging
    let _log_guard = init_logging(&config.logging)?;
    info!("combine-player starting...");
    info!("Configuration loaded from {:?}", config.config_path());

    // Create tokio runtime for async operations
    let runtime = Arc::new(tokio::runtime::Runtime::new()?);

    // Simulated streams sharing one command log
    let log = CommandLog::new();
    let white = Arc::new(SimWhiteboard::new(WhitePhase::WaitingFirstFrame, log.clone()));
    let native = Arc::new(SimNativePlayer::new(NativePhase::Idle, log.clone()));

    let dispatcher = CommandDispatcher::from_config(native.clone(), &config.dispatcher)
        .context("Failed to start native player dispatcher")?;

    // Create engine channels
    let (cmd_tx, cmd_rx, status_tx, status_rx) = create_engine_channels();

    let manager = Arc::new(
        PlayerSyncManager::builder(dispatcher)
            .whiteboard(white.clone())
            .callbacks((
                || info!("Host notified: buffering started"),
                || info!("Host notified: buffering ended"),
            ))
            .status_sender(status_tx.clone())
            .playback_speed(config.sync.playback_speed)
            .build()
            .context("Failed to create player sync manager")?,
    );

    let mut engine = SyncEngine::new(config.sync.clone(), manager.clone(), cmd_rx, status_tx);

    // Print status updates until the engine stops
    let printer = runtime.spawn(print_statuses(status_rx, args.json));

    // Spawn the sync engine on the tokio runtime
    let engine_runtime = runtime.clone();
    let engine_handle = std::thread::spawn(move || {
        engine_runtime.block_on(async move {
            if let Err(e) = engine.run().await {
                error!("Sync engine error: {:#}", e);
            }
        });
    });

    // Set up Ctrl+C handler that sends shutdown command
    let ctrl_c_tx = cmd_tx.clone();
    let ctrl_c_runtime = runtime.clone();
    ctrlc::set_handler(move || {
        info!("Ctrl+C received, shutting down...");
        let tx = ctrl_c_tx.clone();
        ctrl_c_runtime.spawn(async move {
            let _ = tx.send(EngineCommand::Shutdown).await;
        });
    })?;

    if let Err(e) = runtime.block_on(run_session(&cmd_tx, &white, &native)) {
        // The engine is gone; Ctrl+C already stopped it
        warn!("Scripted session ended early: {:#}", e);
    }

    runtime.block_on(async {
        let _ = cmd_tx.send(EngineCommand::Shutdown).await;
    });

    // Wait for engine thread to finish
    let _ = engine_handle.join();
    let _ = runtime.block_on(printer);

    info!(
        "Session complete: pending={}, {} stream commands issued",
        manager.pause_reason(),
        log.len()
    );
    Ok(())
}

/// Cold start, native buffering, cross buffering, user pause, seek, end of media
async fn run_session(
    cmd_tx: &mpsc::Sender<EngineCommand>,
    white: &SimWhiteboard,
    native: &SimNativePlayer,
) -> Result<()> {
    info!("Scene: cold start");
    send(cmd_tx, EngineCommand::Play).await?;
    white.set_phase(WhitePhase::Paused);
    send(cmd_tx, EngineCommand::WhitePhaseChanged(WhitePhase::Paused)).await?;
    native.set_enough_buffer(true);
    native.set_phase(NativePhase::Playing);
    send(cmd_tx, EngineCommand::NativePhaseChanged(NativePhase::Playing)).await?;

    info!("Scene: native buffering");
    native.set_phase(NativePhase::Buffering);
    send(cmd_tx, EngineCommand::NativePhaseChanged(NativePhase::Buffering)).await?;
    native.set_phase(NativePhase::Playing);
    send(cmd_tx, EngineCommand::NativePhaseChanged(NativePhase::Playing)).await?;

    info!("Scene: cross buffering");
    native.set_phase(NativePhase::Buffering);
    send(cmd_tx, EngineCommand::NativePhaseChanged(NativePhase::Buffering)).await?;
    white.set_phase(WhitePhase::Buffering);
    send(cmd_tx, EngineCommand::WhitePhaseChanged(WhitePhase::Buffering)).await?;
    native.set_phase(NativePhase::Playing);
    send(cmd_tx, EngineCommand::NativePhaseChanged(NativePhase::Playing)).await?;
    white.set_phase(WhitePhase::Playing);
    send(cmd_tx, EngineCommand::WhitePhaseChanged(WhitePhase::Playing)).await?;

    info!("Scene: user pause and seek");
    send(cmd_tx, EngineCommand::Pause).await?;
    send(cmd_tx, EngineCommand::Seek(Duration::from_secs(30))).await?;
    send(cmd_tx, EngineCommand::SetPlaybackSpeed(1.5)).await?;
    send(cmd_tx, EngineCommand::Play).await?;

    info!("Scene: end of media");
    send(cmd_tx, EngineCommand::NativeFinished).await?;
    native.set_phase(NativePhase::Idle);
    send(cmd_tx, EngineCommand::NativePhaseChanged(NativePhase::Idle)).await?;

    Ok(())
}

async fn send(cmd_tx: &mpsc::Sender<EngineCommand>, cmd: EngineCommand) -> Result<()> {
    cmd_tx
        .send(cmd)
        .await
        .context("Sync engine is no longer running")?;
    tokio::time::sleep(STEP_DELAY).await;
    Ok(())
}

async fn print_statuses(mut status_rx: broadcast::Receiver<SyncStatus>, json: bool) {
    loop {
        match status_rx.recv().await {
            Ok(status) => {
                if json {
                    match serde_json::to_string(&status) {
                        Ok(line) => println!("{}", line),
                        Err(e) => warn!("Failed to serialize status: {}", e),
                    }
                } else {
                    println!("{:?}", status);
                }
                if status == SyncStatus::Stopped {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Status printer lagged, skipped {} updates", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn parse_args(args: &[String]) -> Result<Args> {
    let mut parsed = Args {
        config: None,
        json: false,
    };

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--json" => parsed.json = true,
            "--config" | "-c" => {
                let path = iter.next().context("--config requires a path")?;
                parsed.config = Some(PathBuf::from(path));
            }
            other => anyhow::bail!("Unknown argument: {} (see --help)", other),
        }
    }

    Ok(parsed)
}

fn print_help() {
    println!("combine-player - Whiteboard replay and native media playback in sync");
    println!();
    println!("USAGE:");
    println!("    combine-player [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    -h, --help           Print this help message");
    println!("    -c, --config PATH    Load configuration from PATH");
    println!("        --json           Print status updates as JSON lines");
    println!();
    println!("ENVIRONMENT:");
    println!("    RUST_LOG                   Set log level (e.g., debug, info, warn)");
    println!("    COMBINE_PLAYER_LOG_PATH    Override the log directory");
}
