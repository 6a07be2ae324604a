//! A minimal worker for `server-manager`.
//!
//! Invoked as `replica-server <name> <min> <max>`. It idles until it receives
//! SIGINT or SIGTERM, then exits cleanly so the manager can reap it.

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use tokio::signal::unix::{signal, SignalKind};
use tokio::time::{self, Duration};

#[derive(Parser, Debug)]
#[command(name = "replica-server", version)]
#[command(about = "Worker process supervised by server-manager")]
struct Args {
    /// Server group this replica belongs to.
    name: String,
    /// Minimum replica count of the group.
    min: usize,
    /// Maximum replica count of the group.
    max: usize,

    /// Seconds between heartbeat log lines (0 disables them).
    #[arg(long, default_value_t = 0)]
    heartbeat_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let pid = std::process::id();

    info!(
        "[{}] replica up (PID {}, min {}, max {})",
        args.name, pid, args.min, args.max
    );

    let mut sigint = signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;
    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

    let period = Duration::from_secs(args.heartbeat_secs.max(1));
    let mut ticker = time::interval(period);

    loop {
        tokio::select! {
            _ = sigint.recv() => {
                info!("[{}] SIGINT received, shutting down (PID {})", args.name, pid);
                break;
            }
            _ = sigterm.recv() => {
                info!("[{}] SIGTERM received, shutting down (PID {})", args.name, pid);
                break;
            }
            _ = ticker.tick(), if args.heartbeat_secs > 0 => {
                info!("[{}] alive (PID {})", args.name, pid);
            }
        }
    }

    Ok(())
}
