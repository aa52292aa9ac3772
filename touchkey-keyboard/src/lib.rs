//! Capacitive touchkey driver with LED notification control
//!
//! This crate sits on top of [`touchkey_transport`] and provides:
//!
//! - interrupt-driven key decoding ([`KeyDecoder`]),
//! - the LED notification controller with breathing/blinking animation
//!   and key backlight timeout ([`NotificationController`]),
//! - suspend/resume handling ([`PowerLifecycle`]),
//! - firmware update, diagnostics and a named control surface,
//! - [`TouchkeyDevice`], which wires all of it together at attach.

pub mod control;
pub mod decoder;
pub mod device;
pub mod diagnostics;
pub mod error;
pub mod firmware;
pub mod identity;
pub mod irq;
pub mod keymap;
pub mod led;
pub mod notification;
pub mod platform;
pub mod power;
pub mod scheduler;
pub mod sim;

pub use control::{Access, Attribute, ControlSurface};
pub use decoder::{DecodeOutcome, DecoderState, KeyDecoder, KeyEvent};
pub use device::{DeviceConfig, TouchkeyDevice};
pub use diagnostics::Diagnostics;
pub use error::DriverError;
pub use firmware::{AutoUpdatePolicy, FirmwarePolicy, FirmwareUpdater, ModuleRule, UpdateStatus};
pub use identity::DeviceIdentity;
pub use irq::{IrqGate, IrqLine};
pub use keymap::{KeyCode, KeyLayout, KeyMap};
pub use led::{
    AnimationCursor, AnimationMode, BacklightTimeout, BlinkingParams, BreathingParams,
    NotificationTimeout,
};
pub use notification::{
    ControllerHardware, NotificationController, NotificationDefaults, NotificationState,
};
pub use platform::{
    FirmwareFlasher, KeyEventSink, LedRegulator, Platform, PowerRails, TouchGuard, WakeLock,
};
pub use power::PowerLifecycle;
pub use scheduler::{TimerKind, TimerScheduler, TimerTicket};

// Re-export the bus layer for consumers that only depend on this crate
pub use touchkey_transport::{
    BusChannel, BusError, HardwareVariant, LedCommand, LedCommandEncoding, MockBus, RetryPolicy,
};
