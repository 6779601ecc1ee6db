use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use palace_archiver::cli::{self, Cli};
use palace_archiver::infrastructure::{init_logging_with_config, log_system_info};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;

    let log_dir = config.paths.log_dir(&config.logging);
    init_logging_with_config(&config.logging, &log_dir)?;
    log_system_info();

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("🛑 Ctrl-C received, finishing the current step and stopping");
                signal_token.cancel();
            }
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    cli::run(cli.command, config, shutdown).await
}
