// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Forge Daemon (forged)
//!
//! Background process that owns the build pipeline: admission queue,
//! executors, artifact store, and the status hub. Clients talk to it over
//! a Unix socket using the length-prefixed JSON protocol.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod config;
mod lifecycle;
mod listener;
mod protocol;

use std::sync::Arc;
use std::time::Duration;

use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::Notify;
use tracing::{error, info};

use crate::config::Config;
use crate::lifecycle::{LifecycleError, StartupResult};
use crate::listener::Listener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Handle info flags before any config/lock acquisition
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("forged {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                println!("forged {}", env!("CARGO_PKG_VERSION"));
                println!("Forge Daemon - runs white-label app builds in the background");
                println!();
                println!("USAGE:");
                println!("    forged");
                println!();
                println!("The daemon listens on a Unix socket under the state directory");
                println!("($FORGE_STATE_DIR, else $XDG_STATE_HOME/forge) for build");
                println!("requests, status queries, and update subscriptions.");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help       Print help information");
                println!("    -v, --version    Print version information");
                return Ok(());
            }
            _ => {
                eprintln!("error: unexpected argument '{arg}'");
                eprintln!("Usage: forged [--help | --version]");
                std::process::exit(1);
            }
        }
    }

    let config = Config::load()?;

    // Write startup marker to log (before tracing setup, so a supervisor
    // tailing the log can find where this attempt begins)
    write_startup_marker(&config)?;
    let log_guard = setup_logging(&config)?;

    info!(state_dir = %config.state_dir.display(), "starting daemon");

    let StartupResult {
        daemon,
        listener: unix_listener,
        dispatcher,
    } = match lifecycle::startup(&config).await {
        Ok(r) => r,
        Err(LifecycleError::LockFailed(_)) => {
            let pid = std::fs::read_to_string(&config.lock_path)
                .unwrap_or_default()
                .trim()
                .to_string();
            eprintln!("forged is already running");
            if !pid.is_empty() {
                eprintln!("  pid: {pid}");
            }
            std::process::exit(1);
        }
        Err(e) => {
            // Write error synchronously (tracing is non-blocking and may not
            // flush before the process exits)
            write_startup_error(&config, &e);
            error!("failed to start daemon: {e}");
            drop(log_guard);
            return Err(e.into());
        }
    };

    let shutdown_notify = Arc::new(Notify::new());
    let handler = Listener::new(
        Arc::clone(&daemon.store),
        Arc::clone(&daemon.artifacts),
        daemon.hub.clone(),
        daemon.queue.clone(),
        Arc::clone(&shutdown_notify),
    );
    let mut serve = tokio::spawn(handler.serve(unix_listener));

    let checkpoint = lifecycle::spawn_checkpoint(
        Arc::clone(&daemon.store),
        daemon.config.checkpoint_interval,
    );
    let flush = lifecycle::spawn_flush(Arc::clone(&daemon.store));

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    info!(socket = %config.socket_path.display(), "daemon ready");

    // Signal ready for a waiting parent process
    println!("READY");

    let reason = tokio::select! {
        _ = &mut serve => "client request",
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    info!(reason, "shutting down");

    // Stop accepting connections, then tear the pipeline down
    shutdown_notify.notify_one();
    if !serve.is_finished() {
        let _ = tokio::time::timeout(Duration::from_secs(2), &mut serve).await;
    }
    checkpoint.abort();
    flush.abort();

    lifecycle::shutdown(&daemon);
    let _ = tokio::time::timeout(Duration::from_secs(2), dispatcher).await;
    Ok(())
}

/// Startup marker prefix written to the log before anything else.
/// Full format: "--- forged: starting (pid: 12345) ---"
const STARTUP_MARKER_PREFIX: &str = "--- forged: starting (pid: ";

/// Write startup marker to log file (appends to existing log)
fn write_startup_marker(config: &Config) -> Result<(), LifecycleError> {
    use std::io::Write;

    if let Some(parent) = config.log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_path)?;
    writeln!(file, "{}{})", STARTUP_MARKER_PREFIX, std::process::id())?;
    Ok(())
}

/// Write startup error synchronously so it is visible even if the process
/// exits before the non-blocking log worker flushes.
fn write_startup_error(config: &Config, error: &LifecycleError) {
    use std::io::Write;

    let Ok(mut file) = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_path)
    else {
        return;
    };
    let _ = writeln!(file, "ERROR failed to start daemon: {error}");
}

fn setup_logging(
    config: &Config,
) -> Result<tracing_appender::non_blocking::WorkerGuard, LifecycleError> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let parent = config
        .log_path
        .parent()
        .ok_or_else(|| std::io::Error::other("log path has no parent directory"))?;
    std::fs::create_dir_all(parent)?;
    let file_name = config
        .log_path
        .file_name()
        .ok_or_else(|| std::io::Error::other("log path has no file name"))?;

    let file_appender = tracing_appender::rolling::never(parent, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    Ok(guard)
}
