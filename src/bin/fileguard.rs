//! # fileguard CLI - keep a file pinned to its backup
//!
//! Watches one file and restores it from a trusted backup whenever its
//! content changes.
//!
//! ## Usage
//! ```bash
//! # Protect a file; the backup defaults to <target>.guardbak
//! fileguard game/pakchunk0.pak
//!
//! # Use an explicit backup and exit after the first restore
//! fileguard settings.ini --backup /srv/pins/settings.ini --only-once
//!
//! # Force polling every 500 ms
//! fileguard settings.ini --watch-mode poll --poll 0.5
//! ```

use clap::{Parser, ValueEnum};
use colored::*;
use fileguard::{FileGuardBuilder, GuardError, Result, StopReason, WatchMode};
use std::path::PathBuf;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// fileguard - restore a file from its backup whenever it is tampered with
#[derive(Parser)]
#[command(name = "fileguard")]
#[command(version)]
#[command(about = "Monitor a single file for replacement or tampering and restore it from a backup")]
#[command(long_about = None)]
struct Cli {
    /// Target file to protect
    target: PathBuf,

    /// Path to backup file (defaults to <target>.guardbak)
    #[arg(short, long)]
    backup: Option<PathBuf>,

    /// Polling interval in seconds, used when event watching is unavailable
    #[arg(long, default_value_t = 0.2)]
    poll: f64,

    /// Protect only once: exit after the first restore
    #[arg(long)]
    only_once: bool,

    /// How to detect changes
    #[arg(long, value_enum, default_value = "auto")]
    watch_mode: WatchModeArg,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum WatchModeArg {
    Auto,
    Events,
    Poll,
}

impl From<WatchModeArg> for WatchMode {
    fn from(arg: WatchModeArg) -> Self {
        match arg {
            WatchModeArg::Auto => WatchMode::Auto,
            WatchModeArg::Events => WatchMode::Events,
            WatchModeArg::Poll => WatchMode::Poll,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    // Disable colors if needed
    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    }

    if let Err(e) = run(cli).await {
        eprintln!("{}: {}", "Error".red().bold(), e.user_message());
        std::process::exit(1);
    }
}

/// Timestamped, leveled log lines on stdout; `RUST_LOG` overrides the level
fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stdout)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let poll_interval = parse_poll_interval(cli.poll)?;

    let mut builder = FileGuardBuilder::new()
        .poll_interval(poll_interval)
        .only_once(cli.only_once)
        .watch_mode(cli.watch_mode.into());
    if let Some(backup) = cli.backup {
        builder = builder.backup_path(backup);
    }

    let guard = builder.build(&cli.target)?;

    let token = CancellationToken::new();
    tokio::spawn(cancel_on_signal(token.clone()));

    let summary = guard.run(token).await?;
    match summary.stop_reason {
        StopReason::OnlyOnce => info!("Guard finished after {} restore(s)", summary.restores),
        StopReason::Cancelled => info!(
            "Guard stopped after {} pass(es), {} restore(s)",
            summary.passes, summary.restores
        ),
    }

    Ok(())
}

fn parse_poll_interval(seconds: f64) -> Result<Duration> {
    match Duration::try_from_secs_f64(seconds) {
        Ok(interval) if !interval.is_zero() => Ok(interval),
        _ => Err(GuardError::config(format!(
            "--poll must be a positive number of seconds, got {}",
            seconds
        ))),
    }
}

/// Cancel `token` on SIGINT or SIGTERM
async fn cancel_on_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT, stopping"),
        _ = terminate => info!("Received SIGTERM, stopping"),
    }

    token.cancel();
}
