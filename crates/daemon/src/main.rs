// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Loom Daemon (loomd)
//!
//! Long-running orchestrator that drives labelled issues through the
//! curate → build → judge → doctor pipeline using ephemeral agent workers.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use loom_adapters::{DesktopNotifier, GitVcs, GithubTracker, TmuxSessionHost};
use loom_core::{LoomConfig, SystemClock};
use loom_daemon::{lifecycle, DaemonLoop, LoopExit};
use loom_engine::EngineContext;
use loom_storage::LoomPaths;
use tracing::{error, info};

/// Maximum log file size before rotation (10 MB).
const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Number of rotated log files to keep.
const MAX_ROTATED_LOGS: u32 = 3;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut force_mode = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--force" | "-f" => force_mode = true,
            "--version" | "-V" => {
                println!("loomd {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            other => {
                eprintln!("error: unexpected argument '{other}'");
                eprintln!("Usage: loomd [--force] [--help | --version]");
                std::process::exit(1);
            }
        }
    }

    // Anchor everything at the repository root
    let cwd = std::env::current_dir()?;
    let repo_root = match lifecycle::find_repo_root(&cwd) {
        Ok(root) => root,
        Err(_) => {
            eprintln!("Error: .loom directory not found");
            eprintln!("Run loomd from a Loom-enabled repository");
            std::process::exit(1);
        }
    };
    let paths = LoomPaths::new(&repo_root);

    rotate_log_if_needed(&paths.daemon_log());
    let _log_guard = setup_logging(&paths)?;

    // Single-daemon lock before any state writes
    let _lock = match lifecycle::acquire_pid_lock(&paths.pid_file()) {
        Ok(lock) => lock,
        Err(lifecycle::LifecycleError::LockFailed(_)) => {
            let pid = std::fs::read_to_string(paths.pid_file())
                .unwrap_or_default()
                .trim()
                .to_string();
            eprintln!("loomd is already running");
            if !pid.is_empty() {
                eprintln!("  pid: {pid}");
            }
            std::process::exit(1);
        }
        Err(e) => return Err(e.into()),
    };

    let config = LoomConfig::from_env();
    let ctx = EngineContext::new(
        GithubTracker::new(&repo_root),
        TmuxSessionHost::new(&config.tmux_socket),
        GitVcs::new(),
        SystemClock,
        paths,
        config,
    );

    info!(
        repo = %repo_root.display(),
        force_mode,
        poll_interval = ctx.config.poll_interval,
        max_shepherds = ctx.config.max_shepherds,
        "starting loom daemon"
    );

    let report = match lifecycle::startup(&ctx, force_mode).await {
        Ok(report) => report,
        Err(e) => {
            error!("failed to start daemon: {e}");
            return Err(e.into());
        }
    };
    info!(session_id = %report.session_id, "daemon ready");

    let mut daemon = DaemonLoop::new(
        ctx.clone(),
        DesktopNotifier::new(),
        report.session_id,
        force_mode,
    );

    let exit = tokio::select! {
        exit = daemon.run() => exit,
        _ = shutdown_signal() => {
            info!("received termination signal, shutting down");
            LoopExit::StopSignal
        }
    };

    match exit {
        LoopExit::StopSignal => {
            lifecycle::shutdown(&ctx)?;
            info!("daemon stopped");
        }
        LoopExit::SessionConflict => {
            // Another daemon owns the state file; exit without writes.
            info!("yielded to the other daemon instance");
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(_) => return std::future::pending().await,
    };
    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(s) => s,
        Err(_) => return std::future::pending().await,
    };
    tokio::select! {
        _ = sigterm.recv() => {}
        _ = sigint.recv() => {}
    }
}

fn print_help() {
    println!("loomd {}", env!("CARGO_PKG_VERSION"));
    println!("Loom Daemon - continuous issue-pipeline orchestration");
    println!();
    println!("USAGE:");
    println!("    loomd [--force]");
    println!();
    println!("OPTIONS:");
    println!("    -f, --force      Promote proposals without human approval");
    println!("    -h, --help       Print help information");
    println!("    -V, --version    Print version information");
    println!();
    println!("To stop the daemon gracefully:");
    println!("    touch .loom/stop-daemon");
    println!();
    println!("Configuration is read from LOOM_* environment variables;");
    println!("see the crate documentation for the full table of knobs.");
}

/// Rotate the daemon log file if it exceeds [`MAX_LOG_SIZE`].
///
/// Shifts `daemon.log` → `daemon.log.1` → ... deleting the oldest.
/// Best-effort: rotation failures never block startup.
fn rotate_log_if_needed(log_path: &std::path::Path) {
    let size = match std::fs::metadata(log_path) {
        Ok(m) => m.len(),
        Err(_) => return,
    };
    if size < MAX_LOG_SIZE {
        return;
    }

    let log_str = log_path.display().to_string();
    for i in (1..MAX_ROTATED_LOGS).rev() {
        let from = format!("{log_str}.{i}");
        let to = format!("{log_str}.{}", i + 1);
        let _ = std::fs::rename(&from, &to);
    }
    let _ = std::fs::rename(log_path, format!("{log_str}.1"));
}

fn setup_logging(
    paths: &LoomPaths,
) -> Result<tracing_appender::non_blocking::WorkerGuard, Box<dyn std::error::Error>> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let log_path = paths.daemon_log();
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let dir = log_path
        .parent()
        .ok_or("daemon log path has no parent directory")?;
    let file = log_path
        .file_name()
        .ok_or("daemon log path has no file name")?;
    let file_appender = tracing_appender::rolling::never(dir, file);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .with(fmt::layer().with_writer(std::io::stdout))
        .init();

    Ok(guard)
}
