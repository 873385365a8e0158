//! Mouse Keeper - keeps a workstation awake while its user is away.
//!
//! Simulates small, human-like pointer movements once the pointer has been
//! still for the configured idle timeout, and stops the moment real pointer
//! input is detected.
//!
//! On Unix, `SIGUSR1` toggles pause/resume and `SIGHUP` reloads the idle
//! timeout from the configuration file.

mod config;
mod keeper;
mod logging;
mod pointer;

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::keeper::{Keeper, KeeperEvent};
use crate::logging::JsonlLogger;
use crate::pointer::SystemPointer;

/// Application version.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Requests from the signal listener to the main loop.
#[derive(Debug, Clone, Copy)]
enum ControlCommand {
    TogglePause,
    Reload,
    Quit,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let config_path = std::env::args().nth(1).map(PathBuf::from);

    // Load configuration
    let config = Config::load(config_path.as_deref())?;
    config.validate()?;

    // Initialize tracing
    init_tracing(&config.logging.level)?;

    info!("Starting mouse-keeper v{}", VERSION);

    let pointer = SystemPointer::new(config.timing.move_duration())?;
    let keeper = Arc::new(Keeper::new(config.settings(), Arc::new(pointer))?);

    let mut journal = if config.logging.journal {
        JsonlLogger::open_session(config.logging.logs_dir(), VERSION)
    } else {
        None
    };

    let (cmd_tx, mut cmd_rx) = mpsc::channel::<ControlCommand>(10);
    tokio::spawn(listen_for_signals(cmd_tx));

    let mut events = keeper.subscribe();
    let shutdown = CancellationToken::new();
    let tasks = keeper.start(shutdown.clone());

    info!("Started paused, simulating after {:?} of inactivity", keeper.idle_timeout());

    let mut moves: u64 = 0;

    loop {
        tokio::select! {
            Some(cmd) = cmd_rx.recv() => {
                match cmd {
                    ControlCommand::TogglePause => {
                        // A resume still in its grace delay counts as running
                        if keeper.is_paused() && !keeper.resume_pending() {
                            let keeper = keeper.clone();
                            tokio::spawn(async move {
                                keeper.resume().await;
                            });
                        } else {
                            keeper.pause();
                        }
                    }
                    ControlCommand::Reload => {
                        match Config::load(config_path.as_deref()) {
                            Ok(reloaded) => {
                                if let Err(e) = keeper.set_idle_timeout(reloaded.keeper.idle_timeout()) {
                                    warn!("Ignoring reloaded idle timeout: {}", e);
                                }
                            }
                            Err(e) => warn!("Failed to reload configuration: {:#}", e),
                        }
                    }
                    ControlCommand::Quit => {
                        info!("Quit command received");
                        break;
                    }
                }
            }
            event = events.recv() => {
                match event {
                    Ok(event) => {
                        if matches!(event, KeeperEvent::Moved { .. }) {
                            moves += 1;
                        }
                        if let Some(journal) = journal.as_mut() {
                            if let Err(e) = journal.log_event(&event) {
                                warn!("Failed to write journal: {}", e);
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Event journal lagged, {} events skipped", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    // Cleanup
    info!("Shutting down...");
    shutdown.cancel();
    tasks.join().await;

    if let Some(journal) = journal.as_mut() {
        if let Err(e) = journal.log_session_end(moves) {
            error!("Failed to write journal: {}", e);
        }
    }

    info!("Performed {} simulated moves. Goodbye!", moves);
    Ok(())
}

/// Translate process signals into control commands.
async fn listen_for_signals(cmd_tx: mpsc::Sender<ControlCommand>) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let streams = (
            signal(SignalKind::user_defined1()),
            signal(SignalKind::hangup()),
            signal(SignalKind::terminate()),
        );
        let (mut toggle, mut reload, mut terminate) = match streams {
            (Ok(toggle), Ok(reload), Ok(terminate)) => (toggle, reload, terminate),
            _ => {
                warn!("Could not install signal handlers, only Ctrl-C will work");
                let _ = tokio::signal::ctrl_c().await;
                let _ = cmd_tx.send(ControlCommand::Quit).await;
                return;
            }
        };

        loop {
            let cmd = tokio::select! {
                _ = tokio::signal::ctrl_c() => ControlCommand::Quit,
                _ = terminate.recv() => ControlCommand::Quit,
                _ = toggle.recv() => ControlCommand::TogglePause,
                _ = reload.recv() => ControlCommand::Reload,
            };
            let quit = matches!(cmd, ControlCommand::Quit);
            if cmd_tx.send(cmd).await.is_err() || quit {
                return;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
        }
        let _ = cmd_tx.send(ControlCommand::Quit).await;
    }
}

/// Initialize tracing subscriber with the given log level.
fn init_tracing(level: &str) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(false))
        .with(filter)
        .init();

    Ok(())
}
