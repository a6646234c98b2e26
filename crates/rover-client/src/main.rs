//! # rover
//!
//! Command-line client for the rover link. Connects to the onboard
//! controller and either logs telemetry, runs wall avoidance, or relays
//! manual drive input from stdin.

#![deny(unsafe_code)]

mod keys;
mod shutdown;

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rover_core::logging::init_subscriber;
use rover_nav::{DriveConfig, DriveLoop, MineMap, Navigator, NavigatorConfig};
use rover_session::{
    CommandSink, Endpoint, Processor, ProcessorConfig, ProcessorReport, Session,
};
use rover_settings::RoverSettings;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::keys::DriveInput;
use crate::shutdown::ShutdownCoordinator;

/// How long queued telemetry may take to drain after the controller hangs up.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Rover link client.
#[derive(Parser, Debug)]
#[command(name = "rover", version, about = "Rover link client")]
struct Cli {
    /// Controller host (overrides settings).
    #[arg(long, global = true)]
    host: Option<String>,

    /// Controller WebSocket port (overrides settings).
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Settings file (default `~/.rover/settings.json`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Log filter when `RUST_LOG` is unset (overrides settings).
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Mode,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Log every telemetry frame.
    Monitor,
    /// Log telemetry and steer away from walls.
    Autopilot,
    /// Drive from stdin: w/a/s/d hold, x release, m mark mine, q quit.
    Drive,
}

/// What ended the main wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    Interrupted,
    LinkClosed,
    OperatorQuit,
}

/// Settings after file, env and command-line layers.
fn resolve_settings(cli: &Cli) -> Result<RoverSettings> {
    let path = cli
        .settings
        .clone()
        .unwrap_or_else(rover_settings::settings_path);
    let mut settings = rover_settings::load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;

    if let Some(host) = &cli.host {
        settings.controller.host.clone_from(host);
    }
    if let Some(port) = cli.port {
        settings.controller.port = port;
    }
    if let Some(level) = &cli.log_level {
        settings.logging.level.clone_from(level);
    }
    settings.validate().context("Invalid command-line override")?;
    Ok(settings)
}

fn navigator_config(settings: &RoverSettings) -> NavigatorConfig {
    let nav = &settings.navigation;
    NavigatorConfig {
        wall_threshold: nav.wall_threshold,
        turn_repeats: nav.turn_repeats,
        forward_repeats: nav.forward_repeats,
        repeat_interval: nav.repeat_interval(),
    }
}

fn drive_config(settings: &RoverSettings) -> DriveConfig {
    let drive = &settings.drive;
    DriveConfig {
        command_interval: drive.command_interval(),
        robot_speed: drive.robot_speed,
        rotation_speed: drive.rotation_speed,
        map_half_extent: drive.map_half_extent,
    }
}

/// Forward stdin lines from a detached thread so a blocked read never holds
/// up runtime shutdown.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    let _reader = std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

async fn operator_loop(
    mut lines: mpsc::UnboundedReceiver<String>,
    drive: Arc<DriveLoop>,
    map: Arc<MineMap>,
    token: CancellationToken,
) {
    loop {
        let line = tokio::select! {
            () = token.cancelled() => break,
            line = lines.recv() => line,
        };
        let Some(line) = line else {
            info!("stdin closed");
            break;
        };
        match DriveInput::parse(&line) {
            Some(DriveInput::Hold(direction)) => drive.hold(direction),
            Some(DriveInput::Release) => drive.release(),
            Some(DriveInput::MarkMine) => {
                if !map.mark_at_pose() {
                    info!("mine already marked here");
                }
            }
            Some(DriveInput::Quit) => break,
            None => warn!(input = %line.trim(), "unknown key"),
        }
    }
    drive.release();
    token.cancel();
}

/// Wait up to `grace` for the processor to finish on its own.
///
/// Returns `false` if it is still running, in which case `task` has not
/// completed and can still be awaited.
async fn drain_processor(task: &mut JoinHandle<ProcessorReport>, grace: Duration) -> bool {
    match tokio::time::timeout(grace, task).await {
        Ok(Ok(report)) => {
            info!(?report, "processor drained");
            true
        }
        Ok(Err(error)) => {
            warn!(%error, "processor task failed");
            true
        }
        Err(_elapsed) => {
            warn!("processor did not drain in {grace:?}");
            false
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let settings = resolve_settings(&cli)?;
    init_subscriber(&settings.logging.level);

    let endpoint = Endpoint::new(settings.controller.host.clone(), settings.controller.port);
    let (session, inbound) = Session::new(endpoint);
    let session = Arc::new(session);

    session
        .start()
        .await
        .with_context(|| format!("Failed to connect to {}", session.endpoint().url()))?;
    session.await_open().await?;

    let coordinator = ShutdownCoordinator::new();
    let mut handles: Vec<JoinHandle<()>> = Vec::new();
    let sink: Arc<dyn CommandSink> = session.clone();

    let processor = Arc::new(Processor::new(ProcessorConfig {
        exit_on_close: true,
    }));
    processor.on_message_fn("telemetry-log", |message| {
        info!(
            distance = ?message.distance,
            x = ?message.x,
            y = ?message.y,
            mine = message.mine_detected(),
            "telemetry"
        );
        Ok(())
    });

    let mut navigator = None;
    match cli.command {
        Mode::Monitor => {}
        Mode::Autopilot => {
            let nav = Arc::new(Navigator::new(navigator_config(&settings), Arc::clone(&sink)));
            processor.on_message(nav.clone());
            navigator = Some(nav);
        }
        Mode::Drive => {
            let map = Arc::new(MineMap::new());
            processor.on_message(map.clone());
            let drive = Arc::new(DriveLoop::new(
                drive_config(&settings),
                Arc::clone(&sink),
                Arc::clone(&map),
            ));

            handles.push(tokio::spawn({
                let drive = Arc::clone(&drive);
                let token = coordinator.token();
                async move { drive.run(token).await }
            }));
            handles.push(tokio::spawn(operator_loop(
                spawn_stdin_reader(),
                drive,
                Arc::clone(&map),
                coordinator.token(),
            )));
            println!("w/a/s/d + Enter to drive, x to stop, m to mark a mine, q to quit");
        }
    }

    let mut processor_task = tokio::spawn({
        let processor = Arc::clone(&processor);
        let token = coordinator.token();
        async move { processor.run(inbound, token).await }
    });

    let token = coordinator.token();
    let reason = tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl-C")?;
            StopReason::Interrupted
        }
        () = session.wait_closed() => StopReason::LinkClosed,
        () = token.cancelled() => StopReason::OperatorQuit,
    };
    info!(?reason, "shutting down");

    // The queue closes once the receive loop exits, so the processor can
    // finish what is already queued before the token fires.
    let drained =
        reason == StopReason::LinkClosed && drain_processor(&mut processor_task, DRAIN_TIMEOUT).await;

    session.stop().await;
    if let Some(navigator) = &navigator {
        navigator.halt();
    }
    if !drained {
        handles.push(tokio::spawn(async move {
            match processor_task.await {
                Ok(report) => info!(?report, "processor finished"),
                Err(error) => warn!(%error, "processor task failed"),
            }
        }));
    }
    coordinator.graceful_shutdown(handles, None).await;

    info!(stats = ?session.stats(), "session closed");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    run(Cli::parse()).await
}
