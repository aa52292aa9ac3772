//! Named get/set control surface
//!
//! Each attribute maps to exactly one controller field or diagnostic read.
//! Values travel as text, the way a sysfs-style front end hands them over;
//! every write is parsed and range-checked before anything changes.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::decoder::KeyDecoder;
use crate::diagnostics::{Diagnostics, SENSOR_CHANNELS};
use crate::error::DriverError;
use crate::firmware::{FirmwareUpdater, UPDATE_TRIGGER};
use crate::identity::DeviceIdentity;
use crate::keymap::KeyCode;
use crate::led::{AnimationMode, BacklightTimeout, NotificationTimeout};
use crate::notification::NotificationController;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    /// Notification session: write 1 to start, 0 to stop
    Led,
    NotificationEnabled,
    /// Backlight timeout in ms, -1 always on, -2 always off
    LedTimeout,
    NotificationTimeout,
    BreathingEnabled,
    BreathingStepIncrement,
    BreathingStepInterval,
    BreathingMinVolt,
    BreathingMaxVolt,
    BreathingPause,
    BlinkingEnabled,
    BlinkingIntOn,
    BlinkingIntOff,
    LedFadeout,
    ForceDisable,
    /// LED supply voltage in mV
    Brightness,
    /// Key backlight: 1 on (as key activity), 2 off
    KeyBacklight,
    SwapBackMenu,
    RawData(u8),
    Idac(u8),
    Threshold,
    Sensitivity(KeyCode),
    TouchSensitivity,
    AutocalEnable,
    AutocalStatus,
    FirmVersionPhone,
    FirmVersionPanel,
    FirmUpdate,
    FirmUpdateStatus,
}

impl Attribute {
    pub fn all() -> Vec<Attribute> {
        let mut all = vec![
            Attribute::Led,
            Attribute::NotificationEnabled,
            Attribute::LedTimeout,
            Attribute::NotificationTimeout,
            Attribute::BreathingEnabled,
            Attribute::BreathingStepIncrement,
            Attribute::BreathingStepInterval,
            Attribute::BreathingMinVolt,
            Attribute::BreathingMaxVolt,
            Attribute::BreathingPause,
            Attribute::BlinkingEnabled,
            Attribute::BlinkingIntOn,
            Attribute::BlinkingIntOff,
            Attribute::LedFadeout,
            Attribute::ForceDisable,
            Attribute::Brightness,
            Attribute::KeyBacklight,
            Attribute::SwapBackMenu,
        ];
        all.extend((0..SENSOR_CHANNELS as u8).map(Attribute::RawData));
        all.extend((0..SENSOR_CHANNELS as u8).map(Attribute::Idac));
        all.push(Attribute::Threshold);
        all.extend(
            [KeyCode::Menu, KeyCode::Back, KeyCode::Home, KeyCode::Search]
                .into_iter()
                .map(Attribute::Sensitivity),
        );
        all.extend([
            Attribute::TouchSensitivity,
            Attribute::AutocalEnable,
            Attribute::AutocalStatus,
            Attribute::FirmVersionPhone,
            Attribute::FirmVersionPanel,
            Attribute::FirmUpdate,
            Attribute::FirmUpdateStatus,
        ]);
        all
    }

    pub fn name(&self) -> String {
        match self {
            Attribute::RawData(n) => format!("raw_data{}", n),
            Attribute::Idac(n) => format!("idac{}", n),
            Attribute::Sensitivity(key) => format!("sensitivity_{}", key.name()),
            other => other.fixed_name().to_string(),
        }
    }

    fn fixed_name(&self) -> &'static str {
        match self {
            Attribute::Led => "led",
            Attribute::NotificationEnabled => "notification_enabled",
            Attribute::LedTimeout => "led_timeout",
            Attribute::NotificationTimeout => "notification_timeout",
            Attribute::BreathingEnabled => "breathing_enabled",
            Attribute::BreathingStepIncrement => "breathing_step_increment",
            Attribute::BreathingStepInterval => "breathing_step_interval",
            Attribute::BreathingMinVolt => "breathing_min_volt",
            Attribute::BreathingMaxVolt => "breathing_max_volt",
            Attribute::BreathingPause => "breathing_pause",
            Attribute::BlinkingEnabled => "blinking_enabled",
            Attribute::BlinkingIntOn => "blinking_int_on",
            Attribute::BlinkingIntOff => "blinking_int_off",
            Attribute::LedFadeout => "led_fadeout",
            Attribute::ForceDisable => "force_disable",
            Attribute::Brightness => "brightness",
            Attribute::KeyBacklight => "key_backlight",
            Attribute::SwapBackMenu => "swap_back_menu",
            Attribute::Threshold => "threshold",
            Attribute::TouchSensitivity => "touch_sensitivity",
            Attribute::AutocalEnable => "autocal_enable",
            Attribute::AutocalStatus => "autocal_status",
            Attribute::FirmVersionPhone => "firm_version_phone",
            Attribute::FirmVersionPanel => "firm_version_panel",
            Attribute::FirmUpdate => "firm_update",
            Attribute::FirmUpdateStatus => "firm_update_status",
            Attribute::RawData(_) => "raw_data",
            Attribute::Idac(_) => "idac",
            Attribute::Sensitivity(_) => "sensitivity",
        }
    }

    pub fn access(&self) -> Access {
        match self {
            Attribute::KeyBacklight
            | Attribute::TouchSensitivity
            | Attribute::AutocalEnable
            | Attribute::FirmUpdate => Access::WriteOnly,
            Attribute::RawData(_)
            | Attribute::Idac(_)
            | Attribute::Threshold
            | Attribute::Sensitivity(_)
            | Attribute::AutocalStatus
            | Attribute::FirmVersionPhone
            | Attribute::FirmVersionPanel
            | Attribute::FirmUpdateStatus => Access::ReadOnly,
            _ => Access::ReadWrite,
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl FromStr for Attribute {
    type Err = DriverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Attribute::all()
            .into_iter()
            .find(|attr| attr.name() == s)
            .ok_or_else(|| DriverError::UnknownAttribute(s.to_string()))
    }
}

// ── Value parsing ──

fn parse_bool(value: &str) -> Result<bool, DriverError> {
    match value.trim() {
        "0" => Ok(false),
        "1" => Ok(true),
        other => Err(DriverError::InvalidParameter(format!(
            "expected 0 or 1, got {:?}",
            other
        ))),
    }
}

fn parse_num<T: FromStr>(value: &str) -> Result<T, DriverError> {
    let value = value.trim();
    value
        .parse()
        .map_err(|_| DriverError::InvalidParameter(format!("not a number: {:?}", value)))
}

fn flag(value: bool) -> String {
    let s = if value { "1" } else { "0" };
    s.to_string()
}

// ============================================================================
// ControlSurface
// ============================================================================

#[derive(Clone)]
pub struct ControlSurface {
    controller: NotificationController,
    decoder: Arc<KeyDecoder>,
    diagnostics: Arc<Diagnostics>,
    firmware: Arc<FirmwareUpdater>,
    identity: Arc<DeviceIdentity>,
}

impl ControlSurface {
    pub fn new(
        controller: NotificationController,
        decoder: Arc<KeyDecoder>,
        diagnostics: Arc<Diagnostics>,
        firmware: Arc<FirmwareUpdater>,
        identity: Arc<DeviceIdentity>,
    ) -> Self {
        Self {
            controller,
            decoder,
            diagnostics,
            firmware,
            identity,
        }
    }

    pub async fn read_named(&self, name: &str) -> Result<String, DriverError> {
        self.read(name.parse()?).await
    }

    pub async fn write_named(&self, name: &str, value: &str) -> Result<(), DriverError> {
        self.write(name.parse()?, value).await
    }

    pub async fn read(&self, attr: Attribute) -> Result<String, DriverError> {
        let st = self.controller.snapshot().await;
        let value = match attr {
            Attribute::Led => flag(st.led_on),
            Attribute::NotificationEnabled => flag(st.enabled),
            Attribute::LedTimeout => st.backlight_timeout.as_raw().to_string(),
            Attribute::NotificationTimeout => st.notification_timeout.as_raw().to_string(),
            Attribute::BreathingEnabled => {
                flag(matches!(st.animation_mode(), AnimationMode::Breathing(_)))
            }
            Attribute::BreathingStepIncrement => st.breathing().step_mv.to_string(),
            Attribute::BreathingStepInterval => st.breathing().step_interval_ms.to_string(),
            Attribute::BreathingMinVolt => st.breathing().min_mv.to_string(),
            Attribute::BreathingMaxVolt => st.breathing().max_mv.to_string(),
            Attribute::BreathingPause => st.breathing().pause_ms.to_string(),
            Attribute::BlinkingEnabled => {
                flag(matches!(st.animation_mode(), AnimationMode::Blinking(_)))
            }
            Attribute::BlinkingIntOn => st.blinking().on_ms.to_string(),
            Attribute::BlinkingIntOff => st.blinking().off_ms.to_string(),
            Attribute::LedFadeout => flag(st.fade_out),
            Attribute::ForceDisable => flag(self.controller.is_force_disabled()),
            Attribute::Brightness => st.brightness_mv.to_string(),
            Attribute::SwapBackMenu => flag(self.decoder.swap_back_menu()),
            Attribute::RawData(n) => self.diagnostics.raw_data(n as usize).await?.to_string(),
            Attribute::Idac(n) => self.diagnostics.idac(n as usize).await?.to_string(),
            Attribute::Threshold => self.diagnostics.threshold().await?.to_string(),
            Attribute::Sensitivity(key) => self.diagnostics.sensitivity(key).await?.to_string(),
            Attribute::AutocalStatus => flag(self.diagnostics.autocal_status().await?),
            Attribute::FirmVersionPhone => match self.firmware.bundled_version() {
                Some(v) => format!("0x{:02x}", v),
                None => return Err(DriverError::NotSupported("firmware update".into())),
            },
            Attribute::FirmVersionPanel => {
                format!("0x{:02x}", self.identity.firmware_version())
            }
            Attribute::FirmUpdateStatus => self.firmware.status().as_str().to_string(),
            Attribute::KeyBacklight
            | Attribute::TouchSensitivity
            | Attribute::AutocalEnable
            | Attribute::FirmUpdate => return Err(DriverError::WriteOnly(attr.fixed_name())),
        };
        Ok(value)
    }

    pub async fn write(&self, attr: Attribute, value: &str) -> Result<(), DriverError> {
        let c = &self.controller;
        match attr {
            Attribute::Led => {
                if parse_bool(value)? {
                    c.enable_notification().await;
                } else {
                    c.disable_notification().await;
                }
            }
            Attribute::NotificationEnabled => c.set_enabled(parse_bool(value)?).await,
            Attribute::LedTimeout => {
                c.set_backlight_timeout(BacklightTimeout::from_raw(parse_num(value)?)?)
                    .await
            }
            Attribute::NotificationTimeout => {
                c.set_notification_timeout(NotificationTimeout::from_raw(parse_num(value)?)?)
                    .await
            }
            Attribute::BreathingEnabled => c.set_breathing_enabled(parse_bool(value)?).await,
            Attribute::BreathingStepIncrement => {
                let v: u32 = parse_num(value)?;
                c.update_breathing(|p| p.with_step_mv(v)).await?;
            }
            Attribute::BreathingStepInterval => {
                let v: u32 = parse_num(value)?;
                c.update_breathing(|p| p.with_step_interval_ms(v)).await?;
            }
            Attribute::BreathingMinVolt => {
                let v: u32 = parse_num(value)?;
                c.update_breathing(|p| p.with_min_mv(v)).await?;
            }
            Attribute::BreathingMaxVolt => {
                let v: u32 = parse_num(value)?;
                c.update_breathing(|p| p.with_max_mv(v)).await?;
            }
            Attribute::BreathingPause => {
                let v: u32 = parse_num(value)?;
                c.update_breathing(|p| p.with_pause_ms(v)).await?;
            }
            Attribute::BlinkingEnabled => c.set_blinking_enabled(parse_bool(value)?).await,
            Attribute::BlinkingIntOn => {
                let v: u32 = parse_num(value)?;
                c.update_blinking(|p| p.with_on_ms(v)).await?;
            }
            Attribute::BlinkingIntOff => {
                let v: u32 = parse_num(value)?;
                c.update_blinking(|p| p.with_off_ms(v)).await?;
            }
            Attribute::LedFadeout => c.set_fade_out(parse_bool(value)?).await,
            Attribute::ForceDisable => c.set_force_disabled(parse_bool(value)?).await,
            Attribute::Brightness => c.set_brightness(parse_num(value)?).await?,
            Attribute::KeyBacklight => match parse_num::<u8>(value)? {
                1 => c.on_key_activity().await,
                2 => c.backlight_off().await,
                other => {
                    return Err(DriverError::InvalidParameter(format!(
                        "key backlight expects 1 or 2, got {}",
                        other
                    )))
                }
            },
            Attribute::SwapBackMenu => self.decoder.set_swap_back_menu(parse_bool(value)?),
            Attribute::TouchSensitivity => self.diagnostics.enter_sensitivity_mode().await?,
            Attribute::AutocalEnable => {
                self.diagnostics.autocalibrate().await?;
            }
            Attribute::FirmUpdate => {
                if value.trim() != UPDATE_TRIGGER {
                    return Err(DriverError::InvalidParameter(format!(
                        "firmware update expects {:?}",
                        UPDATE_TRIGGER
                    )));
                }
                // Completion is observed through firm_update_status
                drop(self.firmware.trigger()?);
            }
            Attribute::RawData(_)
            | Attribute::Idac(_)
            | Attribute::Threshold
            | Attribute::Sensitivity(_)
            | Attribute::AutocalStatus
            | Attribute::FirmVersionPhone
            | Attribute::FirmVersionPanel
            | Attribute::FirmUpdateStatus => return Err(DriverError::ReadOnly(attr.fixed_name())),
        }
        Ok(())
    }
}
