//! Hardware and OS collaborators the driver talks to
//!
//! Everything outside the touchkey controller itself is a trait here:
//! power rails, the LED voltage regulator, the wake-lock, the input sink,
//! the touchscreen guard and the firmware programmer. [`crate::sim`]
//! provides in-memory implementations.

use std::sync::Arc;

use async_trait::async_trait;
use touchkey_transport::Bus;

use crate::error::DriverError;
use crate::keymap::KeyCode;

/// Device and LED supply rails
pub trait PowerRails: Send + Sync {
    fn set_device_power(&self, on: bool);
    fn set_led_power(&self, on: bool);
}

/// Regulator feeding the key LEDs
pub trait LedRegulator: Send + Sync {
    fn set_voltage_mv(&self, mv: u32) -> Result<(), DriverError>;
    /// Current output, `None` if the regulator cannot report it
    fn voltage_mv(&self) -> Option<u32>;
}

/// Keeps the system awake during a notification session
pub trait WakeLock: Send + Sync {
    fn acquire(&self);
    fn release(&self);
    fn is_held(&self) -> bool;
}

/// Receives decoded key events in dispatch order
pub trait KeyEventSink: Send + Sync {
    fn report_key(&self, key: KeyCode, pressed: bool);
}

/// Reports whether the touchscreen is currently being touched
pub trait TouchGuard: Send + Sync {
    fn touch_active(&self) -> bool;
}

/// Programs the controller firmware image bundled with the driver
#[async_trait]
pub trait FirmwareFlasher: Send + Sync {
    async fn flash(&self) -> Result<(), DriverError>;
    fn bundled_version(&self) -> u8;
}

/// Collaborators handed to [`crate::TouchkeyDevice::attach`]
#[derive(Clone)]
pub struct Platform {
    pub bus: Arc<dyn Bus>,
    pub rails: Arc<dyn PowerRails>,
    pub regulator: Arc<dyn LedRegulator>,
    pub wake_lock: Arc<dyn WakeLock>,
    pub sink: Arc<dyn KeyEventSink>,
    pub touch_guard: Option<Arc<dyn TouchGuard>>,
    pub flasher: Option<Arc<dyn FirmwareFlasher>>,
}
