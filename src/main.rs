//! # Telemetry Receiver
//!
//! Receive calibration telemetry from a wireless transmitter and log
//! sessions to CSV.
//!
//! The radio is provided by the simulated transmitter, so the binary runs
//! anywhere. Commands are read line by line from stdin.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use telemetry_receiver::config::Config;
use telemetry_receiver::error::ReceiverError;
use telemetry_receiver::link::{ConnectionManager, ConnectionState, ReceiverHandle, SimulatedLink};
use telemetry_receiver::session::SessionOutcome;
use telemetry_receiver::telemetry::WindowSummary;

/// Config file used when none is given on the command line
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Period of the status line
const STATUS_INTERVAL: Duration = Duration::from_secs(5);

/// Name of the rolling log file inside the session log directory
const LOG_FILE_NAME: &str = "receiver.log";

const HELP: &str = "commands: connect | disconnect | start | stop | export | status | quit";

/// What the main loop does after a console command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

/// Main entry point for the telemetry receiver
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Load configuration (first argument, else `config/default.toml`, else defaults)
///    - Set up logging to stdout and a daily log file
///    - Spawn the connection manager and start scanning
///
/// 2. **Main Loop**
///    - Execute console commands from stdin
///    - Log a status line every 5 seconds
///    - Handle Ctrl+C for graceful shutdown
///
/// 3. **Graceful Shutdown**
///    - Stop and export an active session
///    - Release the link and wait for the manager
///
/// # Errors
///
/// Returns error if the configuration cannot be loaded or the log directory
/// cannot be created.
#[tokio::main]
async fn main() -> Result<()> {
    let (config, config_path) = load_config()?;
    let _log_guard = init_logging(&config.session.log_dir)?;

    info!("Telemetry Receiver v{} starting...", env!("CARGO_PKG_VERSION"));
    match &config_path {
        Some(path) => info!("Loaded configuration from {}", path.display()),
        None => info!("No configuration file found, using defaults"),
    }

    let link = SimulatedLink::new(config.simulator.clone(), &config.link);
    let (manager, handle) = ConnectionManager::new(link, &config);
    let manager_task = tokio::spawn(manager.run());

    handle.connect().await?;
    info!("{}", HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut status = interval(STATUS_INTERVAL);
    status.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => {
                    if run_command(line.trim(), &handle).await == Flow::Quit {
                        break;
                    }
                }
                Ok(None) => {
                    info!("stdin closed, press Ctrl+C to exit");
                    stdin_open = false;
                }
                Err(e) => {
                    warn!("Failed to read stdin: {}", e);
                    stdin_open = false;
                }
            },

            _ = status.tick() => log_status(&handle).await,

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    if handle.is_logging() {
        report_session(handle.stop_session().await);
    }
    handle.shutdown().await?;
    manager_task.await.context("connection manager panicked")?;

    info!("Telemetry Receiver stopped");
    Ok(())
}

/// Execute one console command.
async fn run_command(command: &str, handle: &ReceiverHandle) -> Flow {
    let result = match command {
        "" => Ok(()),
        "connect" => handle.connect().await,
        "disconnect" => handle.disconnect().await,
        "start" => handle.start_session().await.map(|()| info!("Session started")),
        "stop" => {
            report_session(handle.stop_session().await);
            Ok(())
        }
        "export" => {
            report_session(handle.export_last_session().await);
            Ok(())
        }
        "status" => {
            log_status(handle).await;
            Ok(())
        }
        "quit" | "exit" => return Flow::Quit,
        "help" => {
            info!("{}", HELP);
            Ok(())
        }
        other => {
            warn!("Unknown command '{}'; {}", other, HELP);
            Ok(())
        }
    };

    if let Err(e) = result {
        report_error(&e);
    }
    Flow::Continue
}

fn report_session(result: telemetry_receiver::error::Result<SessionOutcome>) {
    match result {
        Ok(SessionOutcome::Exported(path)) => info!("Session saved to {}", path.display()),
        Ok(SessionOutcome::NothingLogged) => info!("Session stopped, nothing was logged"),
        Err(e) => report_error(&e),
    }
}

fn report_error(e: &ReceiverError) {
    if e.is_user_facing() {
        error!("{}", e);
    } else {
        warn!("{}", e);
    }
}

async fn log_status(handle: &ReceiverHandle) {
    let state = handle.connection_state();
    let readings = handle.readings();

    match state {
        ConnectionState::Scanning => {
            info!("Scanning for transmitter ({}s)", handle.scan_seconds());
        }
        ConnectionState::Connected => {
            let window = match handle.window_summary().await {
                Ok(summary) => format_window(&summary),
                Err(_) => "--".to_string(),
            };
            info!(
                "Connected | baseline {} | reference {} | reading {} | value {} | window {}{}",
                format_volts(readings.baseline),
                format_volts(readings.reference),
                format_volts(readings.reading),
                format_volts(readings.value),
                window,
                if handle.is_logging() { " | logging" } else { "" }
            );
        }
        other => info!("Link {}", other),
    }

    if let Some(fault) = handle.fault() {
        error!("Receiver stopped retrying: {}", fault);
    }
}

fn format_window(summary: &WindowSummary) -> String {
    match summary.range {
        Some((min, max)) => format!("{} pts, {:.6}..{:.6} V", summary.points, min, max),
        None => "empty".to_string(),
    }
}

fn format_volts(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.6} V", v),
        None => "--".to_string(),
    }
}

/// Load config from the first CLI argument, the default path, or defaults.
fn load_config() -> Result<(Config, Option<PathBuf>)> {
    if let Some(path) = std::env::args().nth(1) {
        let config = Config::load(&path).with_context(|| format!("failed to load {}", path))?;
        return Ok((config, Some(PathBuf::from(path))));
    }

    let default = Path::new(DEFAULT_CONFIG_PATH);
    if default.exists() {
        let config = Config::load(default)
            .with_context(|| format!("failed to load {}", default.display()))?;
        return Ok((config, Some(default.to_path_buf())));
    }

    Ok((Config::default(), None))
}

/// Log to stdout and to a daily file under `log_dir`.
fn init_logging(log_dir: &str) -> Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("failed to create log directory {}", log_dir))?;

    let (file_writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(log_dir, LOG_FILE_NAME));

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with(fmt::layer())
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .init();

    Ok(guard)
}
