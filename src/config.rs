//! Driver configuration
//!
//! Persisted as TOML. Every field has a serde default so a partial file
//! (or none at all) yields a working configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use touchkey_keyboard::led::{BACKLIGHT_ALWAYS_ON, NOTIFICATION_NEVER};
use touchkey_keyboard::{
    AutoUpdatePolicy, BacklightTimeout, BlinkingParams, BreathingParams, DeviceConfig,
    FirmwarePolicy, KeyLayout, NotificationDefaults, NotificationTimeout,
};
use touchkey_transport::{HardwareVariant, LedCommandEncoding, RetryPolicy};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DriverConfig {
    #[serde(default)]
    pub device: DeviceSection,
    #[serde(default)]
    pub bus: BusSection,
    #[serde(default)]
    pub led: LedSection,
    #[serde(default)]
    pub firmware: FirmwareSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSection {
    #[serde(default)]
    pub variant: HardwareVariant,
    #[serde(default)]
    pub layout: KeyLayout,
    /// Report Back as Menu and vice versa
    #[serde(default)]
    pub swap_back_menu: bool,
    #[serde(default)]
    pub autocal: bool,
    #[serde(default)]
    pub led_encoding: LedCommandEncoding,
}

impl Default for DeviceSection {
    fn default() -> Self {
        Self {
            variant: HardwareVariant::Generic,
            layout: KeyLayout::TwoKey,
            swap_back_menu: false,
            autocal: false,
            led_encoding: LedCommandEncoding::Legacy,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusSection {
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Wait between device power-on and first transfer
    #[serde(default = "default_power_settle_ms")]
    pub power_settle_ms: u64,
}

fn default_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    10
}

fn default_power_settle_ms() -> u64 {
    50
}

impl Default for BusSection {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            power_settle_ms: default_power_settle_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedSection {
    #[serde(default)]
    pub notifications_enabled: bool,
    /// ms, -1 always on, -2 always off
    #[serde(default = "default_backlight_timeout")]
    pub backlight_timeout: i32,
    /// ms, -1 or 0 for no timeout
    #[serde(default = "default_notification_timeout")]
    pub notification_timeout: i32,
    #[serde(default = "default_true")]
    pub fade_out: bool,
    #[serde(default = "default_brightness")]
    pub brightness_mv: u32,
    #[serde(default)]
    pub breathing: BreathingSection,
    #[serde(default)]
    pub blinking: BlinkingSection,
}

fn default_backlight_timeout() -> i32 {
    BACKLIGHT_ALWAYS_ON
}

fn default_notification_timeout() -> i32 {
    NOTIFICATION_NEVER
}

fn default_true() -> bool {
    true
}

fn default_brightness() -> u32 {
    3300
}

impl Default for LedSection {
    fn default() -> Self {
        Self {
            notifications_enabled: false,
            backlight_timeout: default_backlight_timeout(),
            notification_timeout: default_notification_timeout(),
            fade_out: true,
            brightness_mv: default_brightness(),
            breathing: BreathingSection::default(),
            blinking: BlinkingSection::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreathingSection {
    #[serde(default = "default_min_mv")]
    pub min_mv: u32,
    #[serde(default = "default_brightness")]
    pub max_mv: u32,
    #[serde(default = "default_step_mv")]
    pub step_mv: u32,
    #[serde(default = "default_step_interval_ms")]
    pub step_interval_ms: u32,
    #[serde(default = "default_pause_ms")]
    pub pause_ms: u32,
}

fn default_min_mv() -> u32 {
    2500
}

fn default_step_mv() -> u32 {
    50
}

fn default_step_interval_ms() -> u32 {
    100
}

fn default_pause_ms() -> u32 {
    700
}

impl Default for BreathingSection {
    fn default() -> Self {
        Self {
            min_mv: default_min_mv(),
            max_mv: default_brightness(),
            step_mv: default_step_mv(),
            step_interval_ms: default_step_interval_ms(),
            pause_ms: default_pause_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlinkingSection {
    #[serde(default = "default_blink_ms")]
    pub on_ms: u32,
    #[serde(default = "default_blink_ms")]
    pub off_ms: u32,
}

fn default_blink_ms() -> u32 {
    1000
}

impl Default for BlinkingSection {
    fn default() -> Self {
        Self {
            on_ms: default_blink_ms(),
            off_ms: default_blink_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FirmwareSection {
    #[serde(default = "default_attempts")]
    pub retries: u32,
    #[serde(default = "default_firmware_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default)]
    pub auto_update: AutoUpdatePolicy,
    /// Skip manual updates on modules older than this
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manual_min_module: Option<u8>,
}

fn default_firmware_retry_delay_ms() -> u64 {
    50
}

impl Default for FirmwareSection {
    fn default() -> Self {
        Self {
            retries: default_attempts(),
            retry_delay_ms: default_firmware_retry_delay_ms(),
            auto_update: AutoUpdatePolicy::Never,
            manual_min_module: None,
        }
    }
}

impl DriverConfig {
    /// Default config file path (~/.config/touchkey/driver.toml)
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("touchkey")
            .join("driver.toml")
    }

    /// Load config from a file, or return default if not found
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: DriverConfig =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    pub fn to_toml(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check LED defaults against the bounds the control surface enforces
    pub fn validate(&self) -> anyhow::Result<()> {
        self.to_device_config().map(|_| ())
    }

    pub fn to_device_config(&self) -> anyhow::Result<DeviceConfig> {
        anyhow::ensure!(self.bus.attempts > 0, "bus.attempts must be at least 1");

        let led = &self.led;
        let breathing = BreathingParams {
            min_mv: led.breathing.min_mv,
            max_mv: led.breathing.max_mv,
            step_mv: led.breathing.step_mv,
            step_interval_ms: led.breathing.step_interval_ms,
            pause_ms: led.breathing.pause_ms,
        };
        breathing.validate().context("led.breathing")?;
        let blinking = BlinkingParams {
            on_ms: led.blinking.on_ms,
            off_ms: led.blinking.off_ms,
        };
        blinking.validate().context("led.blinking")?;
        touchkey_keyboard::led::check_voltage("led.brightness_mv", led.brightness_mv)?;

        let defaults = NotificationDefaults {
            enabled: led.notifications_enabled,
            backlight_timeout: BacklightTimeout::from_raw(led.backlight_timeout)
                .context("led.backlight_timeout")?,
            notification_timeout: NotificationTimeout::from_raw(led.notification_timeout)
                .context("led.notification_timeout")?,
            fade_out: led.fade_out,
            brightness_mv: led.brightness_mv,
            breathing,
            blinking,
        };

        Ok(DeviceConfig {
            variant: self.device.variant,
            layout: self.device.layout,
            swap_back_menu: self.device.swap_back_menu,
            autocal: self.device.autocal,
            led_encoding: self.device.led_encoding,
            retry: RetryPolicy {
                attempts: self.bus.attempts,
                delay: Duration::from_millis(self.bus.retry_delay_ms),
            },
            power_settle: Duration::from_millis(self.bus.power_settle_ms),
            led: defaults,
            firmware: FirmwarePolicy {
                retries: self.firmware.retries,
                retry_delay: Duration::from_millis(self.firmware.retry_delay_ms),
                auto_update: self.firmware.auto_update,
                manual_min_module: self.firmware.manual_min_module,
            },
        })
    }
}
