use std::path::Path;

use touchkey_driver::DriverConfig;

use super::CommandResult;

pub fn run(path: &Path, show_path: bool, write_default: bool) -> CommandResult {
    if show_path {
        println!("{}", path.display());
        return Ok(());
    }
    if write_default {
        if path.exists() {
            anyhow::bail!("{} already exists", path.display());
        }
        DriverConfig::default().save(path)?;
        println!("Wrote default configuration to {}", path.display());
        return Ok(());
    }

    let config = DriverConfig::load(path)?;
    if !path.exists() {
        println!("# {} not found, showing defaults", path.display());
    }
    print!("{}", config.to_toml()?);
    Ok(())
}
