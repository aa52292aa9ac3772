//! Command handlers for the CLI application.
//!
//! - `configure`: print, locate or initialise the config file
//! - `attrs`: control attribute listing
//! - `simulate`: drive a simulated device end to end

pub mod attrs;
pub mod configure;
pub mod simulate;

/// Result type for command handlers
pub type CommandResult = anyhow::Result<()>;
