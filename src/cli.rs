// CLI definitions using clap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "touchkeyd")]
#[command(author, version, about = "Capacitive touchkey driver and LED notification controller")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config file (default: ~/.config/touchkey/driver.toml)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the effective configuration as TOML
    #[command(visible_alias = "cfg")]
    Config {
        /// Print the config file path instead
        #[arg(long)]
        path: bool,
        /// Write the default configuration to the config path
        #[arg(long, conflicts_with = "path")]
        write_default: bool,
    },

    /// List control attributes and their access modes
    Attrs,

    /// Run the driver against the in-memory simulated device
    #[command(visible_alias = "sim")]
    Simulate {
        /// Key presses to replay
        #[arg(long, default_value_t = 4)]
        presses: u8,
        /// Notification session length in ms
        #[arg(long, default_value_t = 1500)]
        notify_ms: u32,
        /// Breathe the LED during the session
        #[arg(long, conflicts_with = "blinking")]
        breathing: bool,
        /// Blink the LED during the session
        #[arg(long)]
        blinking: bool,
    },
}
