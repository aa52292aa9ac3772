//! Touchkey driver CLI
//!
//! Configuration tooling and a simulator for the touchkey driver.

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
use cli::{Cli, Commands};

mod commands;

use touchkey_driver::DriverConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let path = cli.config.clone().unwrap_or_else(DriverConfig::default_path);

    match cli.command {
        Commands::Config {
            path: show_path,
            write_default,
        } => commands::configure::run(&path, show_path, write_default)?,
        Commands::Attrs => commands::attrs::run(),
        Commands::Simulate {
            presses,
            notify_ms,
            breathing,
            blinking,
        } => {
            let config = DriverConfig::load(&path)?;
            let options = commands::simulate::SimulateOptions {
                presses,
                notify_ms,
                breathing,
                blinking,
            };
            commands::simulate::run(config.to_device_config()?, options).await?;
        }
    }

    Ok(())
}
