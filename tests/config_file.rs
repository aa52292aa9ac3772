//! Config file load/save against the real filesystem

use std::path::PathBuf;

use touchkey_driver::DriverConfig;
use touchkey_keyboard::{BacklightTimeout, KeyLayout};

fn scratch_path(name: &str) -> PathBuf {
    std::env::temp_dir()
        .join(format!("touchkeyd-test-{}", std::process::id()))
        .join(name)
}

#[test]
fn test_missing_file_yields_defaults() {
    let path = scratch_path("missing/driver.toml");
    let config = DriverConfig::load(&path).unwrap();
    assert_eq!(config, DriverConfig::default());
}

#[test]
fn test_save_then_load() {
    let path = scratch_path("saved/driver.toml");
    let mut config = DriverConfig::default();
    config.device.layout = KeyLayout::FourKeyAtt;
    config.led.backlight_timeout = -2;
    config.save(&path).unwrap();

    let loaded = DriverConfig::load(&path).unwrap();
    assert_eq!(loaded, config);
    let device = loaded.to_device_config().unwrap();
    assert_eq!(device.led.backlight_timeout, BacklightTimeout::AlwaysOff);

    std::fs::remove_file(&path).unwrap();
}

#[test]
fn test_invalid_file_is_rejected() {
    let path = scratch_path("invalid/driver.toml");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, "[led]\nbrightness_mv = 4000\n").unwrap();
    assert!(DriverConfig::load(&path).is_err());

    std::fs::write(&path, "[device\n").unwrap();
    assert!(DriverConfig::load(&path).is_err());

    std::fs::remove_file(&path).unwrap();
}
