//! Touchkey controller register protocol constants
//!
//! The controller exposes a single addressable register. Reads return a
//! frame whose first three bytes are always status, firmware version and
//! module version; longer reads expose diagnostic fields whose offsets
//! depend on the hardware variant (see [`crate::types::FrameLayout`]).

/// The one register every frame is read from and written to
pub const KEYCODE_REG: u8 = 0x00;

/// Bits of the status byte (frame byte 0)
pub mod status {
    /// Key index (1-based, 0 is reserved)
    pub const KEY_CODE_MASK: u8 = 0x07;
    /// Set on release, clear on press
    pub const PRESS_EVENT_BIT: u8 = 0x08;
    /// Autocalibration finished
    pub const AUTOCAL_BIT: u8 = 0x80;
}

/// Command bytes written to [`KEYCODE_REG`]
pub mod cmd {
    /// Legacy LED on
    pub const LED_ON: u8 = 0x01;
    /// Legacy LED off
    pub const LED_OFF: u8 = 0x02;
    /// LED on for modules with the extended command set
    pub const LED_ON_EXT: u8 = 0x10;
    /// LED off for modules with the extended command set
    pub const LED_OFF_EXT: u8 = 0x20;
    /// Switch the controller into touch sensitivity mode
    pub const TOUCH_SENSITIVITY: u8 = 0x40;
    /// Autocalibration request (frame byte 0)
    pub const AUTOCAL: u8 = 0x50;
    /// Autocalibration enable flag (frame byte 3)
    pub const AUTOCAL_ENABLE: u8 = 0x01;
}

/// Frame lengths for the different read operations
pub mod frame_len {
    pub const STATUS: usize = 3;
    pub const AUTOCAL_CMD: usize = 4;
    pub const AUTOCAL_STATUS: usize = 6;
    pub const IDAC: usize = 10;
    pub const RAW_DATA: usize = 26;
}

/// Timing constants
pub mod timing {
    /// Attempts per bus transfer
    pub const BUS_ATTEMPTS: u32 = 3;
    /// Delay between bus attempts (ms)
    pub const BUS_RETRY_DELAY_MS: u64 = 10;
    /// Settle time after switching a power rail on (ms)
    pub const POWER_SETTLE_MS: u64 = 50;
    /// Wait between autocal request and status read (ms)
    pub const AUTOCAL_SETTLE_MS: u64 = 100;
    /// Autocalibration tries
    pub const AUTOCAL_ATTEMPTS: u32 = 3;
    /// Delay before the first animation tick of a session (ms)
    pub const ANIMATION_START_MS: u64 = 10;
    /// Fade-out voltage step (mV)
    pub const FADE_STEP_MV: u32 = 50;
    /// Fade-out step interval (ms)
    pub const FADE_STEP_MS: u64 = 50;
}
