use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};
use server_manager::args::Cli;
use server_manager::{Dispatcher, ManagerConfig};
use std::io::{self, Write};
use tokio::io::BufReader;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = ManagerConfig::load(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    cli.apply(&mut config);

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(config.log_level.as_str()))
        .init();
    info!("=== Server Manager Starting ===");

    let mut stdout = io::stdout();
    let mut stderr = io::stderr();
    writeln!(stdout, "[Server Manager]: Started manager, creating servers soon")?;

    let mut dispatcher = Dispatcher::local(config);

    // The seed group must come up, otherwise there is nothing to supervise.
    let report = match dispatcher.execute(cli.initial_command()).await {
        Ok(report) => report,
        Err(e) => {
            error!("Initial server could not be created: {}", e);
            return Err(e).context("Startup failed");
        }
    };
    for line in &report.lines {
        writeln!(stdout, "{}", line)?;
    }

    dispatcher
        .run(BufReader::new(tokio::io::stdin()), &mut stdout, &mut stderr)
        .await
        .context("Console I/O failed")?;

    info!("=== Server Manager Stopped ===");
    stdout.flush()?;
    // A pending blocking read on stdin would otherwise hold the runtime open.
    std::process::exit(0);
}
