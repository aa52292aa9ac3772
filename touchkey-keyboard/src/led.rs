//! LED notification parameters, timeouts and the animation cursor

use std::ops::RangeInclusive;
use std::time::Duration;

use touchkey_transport::LedCommand;

use crate::error::DriverError;

/// Lowest LED supply voltage (mV)
pub const VOLTAGE_MIN_MV: u32 = 2500;
/// Highest LED supply voltage (mV)
pub const VOLTAGE_MAX_MV: u32 = 3300;

pub const VOLTAGE_RANGE_MV: RangeInclusive<u32> = VOLTAGE_MIN_MV..=VOLTAGE_MAX_MV;
pub const STEP_RANGE_MV: RangeInclusive<u32> = 10..=100;
pub const STEP_INTERVAL_RANGE_MS: RangeInclusive<u32> = 10..=100;
pub const PAUSE_RANGE_MS: RangeInclusive<u32> = 100..=5000;
pub const BLINK_RANGE_MS: RangeInclusive<u32> = 1..=10000;

/// Raw backlight timeout meaning "never switch off"
pub const BACKLIGHT_ALWAYS_ON: i32 = -1;
/// Raw backlight timeout meaning "never switch on"
pub const BACKLIGHT_ALWAYS_OFF: i32 = -2;
/// Raw notification timeout meaning "no timeout"
pub const NOTIFICATION_NEVER: i32 = -1;

fn check_range(name: &str, value: u32, range: &RangeInclusive<u32>) -> Result<(), DriverError> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err(DriverError::InvalidParameter(format!(
            "{} must be within {}..={}, got {}",
            name,
            range.start(),
            range.end(),
            value
        )))
    }
}

/// Validate a brightness voltage
pub fn check_voltage(name: &str, mv: u32) -> Result<(), DriverError> {
    check_range(name, mv, &VOLTAGE_RANGE_MV)
}

// ============================================================================
// Breathing / blinking parameters
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreathingParams {
    pub min_mv: u32,
    pub max_mv: u32,
    pub step_mv: u32,
    pub step_interval_ms: u32,
    pub pause_ms: u32,
}

impl Default for BreathingParams {
    fn default() -> Self {
        Self {
            min_mv: 2500,
            max_mv: 3300,
            step_mv: 50,
            step_interval_ms: 100,
            pause_ms: 700,
        }
    }
}

impl BreathingParams {
    pub fn validate(&self) -> Result<(), DriverError> {
        check_voltage("breathing min voltage", self.min_mv)?;
        check_voltage("breathing max voltage", self.max_mv)?;
        check_range("breathing step", self.step_mv, &STEP_RANGE_MV)?;
        check_range(
            "breathing step interval",
            self.step_interval_ms,
            &STEP_INTERVAL_RANGE_MS,
        )?;
        check_range("breathing pause", self.pause_ms, &PAUSE_RANGE_MS)?;
        if self.min_mv > self.max_mv {
            return Err(DriverError::InvalidParameter(format!(
                "breathing min voltage {} exceeds max voltage {}",
                self.min_mv, self.max_mv
            )));
        }
        Ok(())
    }

    fn validated(self) -> Result<Self, DriverError> {
        self.validate()?;
        Ok(self)
    }

    pub fn with_min_mv(self, min_mv: u32) -> Result<Self, DriverError> {
        Self { min_mv, ..self }.validated()
    }

    pub fn with_max_mv(self, max_mv: u32) -> Result<Self, DriverError> {
        Self { max_mv, ..self }.validated()
    }

    pub fn with_step_mv(self, step_mv: u32) -> Result<Self, DriverError> {
        Self { step_mv, ..self }.validated()
    }

    pub fn with_step_interval_ms(self, step_interval_ms: u32) -> Result<Self, DriverError> {
        Self {
            step_interval_ms,
            ..self
        }
        .validated()
    }

    pub fn with_pause_ms(self, pause_ms: u32) -> Result<Self, DriverError> {
        Self { pause_ms, ..self }.validated()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlinkingParams {
    pub on_ms: u32,
    pub off_ms: u32,
}

impl Default for BlinkingParams {
    fn default() -> Self {
        Self {
            on_ms: 1000,
            off_ms: 1000,
        }
    }
}

impl BlinkingParams {
    pub fn validate(&self) -> Result<(), DriverError> {
        check_range("blink on interval", self.on_ms, &BLINK_RANGE_MS)?;
        check_range("blink off interval", self.off_ms, &BLINK_RANGE_MS)
    }

    pub fn with_on_ms(self, on_ms: u32) -> Result<Self, DriverError> {
        let next = Self { on_ms, ..self };
        next.validate()?;
        Ok(next)
    }

    pub fn with_off_ms(self, off_ms: u32) -> Result<Self, DriverError> {
        let next = Self { off_ms, ..self };
        next.validate()?;
        Ok(next)
    }
}

/// Animation policy of a notification session. Breathing and blinking
/// exclude each other by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimationMode {
    Off,
    Breathing(BreathingParams),
    Blinking(BlinkingParams),
}

impl AnimationMode {
    pub fn validate(&self) -> Result<(), DriverError> {
        match self {
            AnimationMode::Off => Ok(()),
            AnimationMode::Breathing(p) => p.validate(),
            AnimationMode::Blinking(p) => p.validate(),
        }
    }

    pub fn is_off(&self) -> bool {
        matches!(self, AnimationMode::Off)
    }

    pub fn name(&self) -> &'static str {
        match self {
            AnimationMode::Off => "off",
            AnimationMode::Breathing(_) => "breathing",
            AnimationMode::Blinking(_) => "blinking",
        }
    }
}

// ============================================================================
// Timeouts
// ============================================================================

/// Key backlight policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BacklightTimeout {
    AlwaysOn,
    AlwaysOff,
    /// Switch off this long after the last key activity. Zero switches
    /// off immediately.
    After(Duration),
}

impl BacklightTimeout {
    pub fn from_raw(raw: i32) -> Result<Self, DriverError> {
        match raw {
            BACKLIGHT_ALWAYS_ON => Ok(BacklightTimeout::AlwaysOn),
            BACKLIGHT_ALWAYS_OFF => Ok(BacklightTimeout::AlwaysOff),
            ms if ms >= 0 => Ok(BacklightTimeout::After(Duration::from_millis(ms as u64))),
            other => Err(DriverError::InvalidParameter(format!(
                "backlight timeout must be >= 0, -1 or -2, got {}",
                other
            ))),
        }
    }

    pub fn as_raw(&self) -> i32 {
        match self {
            BacklightTimeout::AlwaysOn => BACKLIGHT_ALWAYS_ON,
            BacklightTimeout::AlwaysOff => BACKLIGHT_ALWAYS_OFF,
            BacklightTimeout::After(d) => d.as_millis().min(i32::MAX as u128) as i32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationTimeout {
    Never,
    After(Duration),
}

impl NotificationTimeout {
    /// `-1` and `0` both mean no timeout
    pub fn from_raw(raw: i32) -> Result<Self, DriverError> {
        match raw {
            NOTIFICATION_NEVER | 0 => Ok(NotificationTimeout::Never),
            ms if ms > 0 => Ok(NotificationTimeout::After(Duration::from_millis(ms as u64))),
            other => Err(DriverError::InvalidParameter(format!(
                "notification timeout must be > 0 or -1, got {}",
                other
            ))),
        }
    }

    pub fn as_raw(&self) -> i32 {
        match self {
            NotificationTimeout::Never => NOTIFICATION_NEVER,
            NotificationTimeout::After(d) => d.as_millis().min(i32::MAX as u128) as i32,
        }
    }
}

// ============================================================================
// Animation cursor
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreathingPhase {
    Rising,
    Falling,
    Pausing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlinkPhase {
    On,
    Off,
}

/// Progress of the running animation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnimationCursor {
    pub breathing_phase: BreathingPhase,
    pub voltage_mv: u32,
    pub blink_phase: BlinkPhase,
}

impl Default for AnimationCursor {
    fn default() -> Self {
        Self::reset(&BreathingParams::default())
    }
}

impl AnimationCursor {
    pub fn reset(params: &BreathingParams) -> Self {
        Self {
            breathing_phase: BreathingPhase::Rising,
            voltage_mv: params.min_mv,
            blink_phase: BlinkPhase::On,
        }
    }

    /// One breathing tick: the voltage to apply now and the delay until
    /// the next tick
    pub fn step_breathing(&mut self, params: &BreathingParams) -> (u32, Duration) {
        let interval = Duration::from_millis(params.step_interval_ms as u64);
        // Parameters may change mid-ramp
        let applied = self.voltage_mv.clamp(params.min_mv, params.max_mv);
        match self.breathing_phase {
            BreathingPhase::Rising => {
                let next = applied + params.step_mv;
                if next >= params.max_mv {
                    self.voltage_mv = params.max_mv;
                    self.breathing_phase = BreathingPhase::Falling;
                } else {
                    self.voltage_mv = next;
                }
                (applied, interval)
            }
            BreathingPhase::Falling => {
                let next = applied.saturating_sub(params.step_mv);
                if next <= params.min_mv {
                    self.voltage_mv = params.min_mv;
                    self.breathing_phase = BreathingPhase::Pausing;
                } else {
                    self.voltage_mv = next;
                }
                (applied, interval)
            }
            BreathingPhase::Pausing => {
                self.voltage_mv = params.min_mv;
                self.breathing_phase = BreathingPhase::Rising;
                (params.min_mv, Duration::from_millis(params.pause_ms as u64))
            }
        }
    }

    /// One blinking tick: the command to write now and how long it holds
    pub fn step_blinking(&mut self, params: &BlinkingParams) -> (LedCommand, Duration) {
        match self.blink_phase {
            BlinkPhase::On => {
                self.blink_phase = BlinkPhase::Off;
                (LedCommand::On, Duration::from_millis(params.on_ms as u64))
            }
            BlinkPhase::Off => {
                self.blink_phase = BlinkPhase::On;
                (LedCommand::Off, Duration::from_millis(params.off_ms as u64))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_min_below_floor_rejected() {
        let params = BreathingParams::default();
        assert!(matches!(
            params.with_min_mv(2000),
            Err(DriverError::InvalidParameter(_))
        ));
        assert_eq!(params.min_mv, 2500);
    }

    #[test]
    fn test_min_above_max_rejected() {
        let params = BreathingParams::default().with_max_mv(2800).unwrap();
        assert!(params.with_min_mv(2900).is_err());
        assert_eq!(params.with_min_mv(2800).unwrap().min_mv, 2800);
    }

    #[test]
    fn test_breathing_bounds() {
        let p = BreathingParams::default();
        assert!(p.with_step_mv(9).is_err());
        assert!(p.with_step_mv(100).is_ok());
        assert!(p.with_step_interval_ms(101).is_err());
        assert!(p.with_pause_ms(99).is_err());
        assert!(p.with_pause_ms(5000).is_ok());
        assert!(p.with_max_mv(3301).is_err());
    }

    #[test]
    fn test_blink_bounds() {
        let p = BlinkingParams::default();
        assert!(p.with_on_ms(0).is_err());
        assert!(p.with_off_ms(10001).is_err());
        assert_eq!(p.with_on_ms(1).unwrap().on_ms, 1);
    }

    #[test]
    fn test_backlight_timeout_raw() {
        assert_eq!(
            BacklightTimeout::from_raw(-1).unwrap(),
            BacklightTimeout::AlwaysOn
        );
        assert_eq!(
            BacklightTimeout::from_raw(-2).unwrap(),
            BacklightTimeout::AlwaysOff
        );
        assert_eq!(
            BacklightTimeout::from_raw(1500).unwrap(),
            BacklightTimeout::After(Duration::from_millis(1500))
        );
        assert_eq!(BacklightTimeout::from_raw(0).unwrap().as_raw(), 0);
        assert!(BacklightTimeout::from_raw(-3).is_err());
    }

    #[test]
    fn test_notification_timeout_raw() {
        assert_eq!(
            NotificationTimeout::from_raw(0).unwrap(),
            NotificationTimeout::Never
        );
        assert_eq!(NotificationTimeout::from_raw(250).unwrap().as_raw(), 250);
        assert!(NotificationTimeout::from_raw(-5).is_err());
    }

    #[test]
    fn test_breathing_ramp_shape() {
        let params = BreathingParams {
            min_mv: 2500,
            max_mv: 2600,
            step_mv: 50,
            step_interval_ms: 20,
            pause_ms: 300,
        };
        let mut cursor = AnimationCursor::reset(&params);
        let mut seen = Vec::new();
        for _ in 0..6 {
            seen.push(cursor.step_breathing(&params));
        }
        let ms = Duration::from_millis;
        assert_eq!(
            seen,
            vec![
                (2500, ms(20)),
                (2550, ms(20)),
                (2600, ms(20)),
                (2550, ms(20)),
                (2500, ms(300)),
                (2500, ms(20)),
            ]
        );
    }

    #[test]
    fn test_blink_alternates() {
        let params = BlinkingParams {
            on_ms: 100,
            off_ms: 400,
        };
        let mut cursor = AnimationCursor::default();
        assert_eq!(
            cursor.step_blinking(&params),
            (LedCommand::On, Duration::from_millis(100))
        );
        assert_eq!(
            cursor.step_blinking(&params),
            (LedCommand::Off, Duration::from_millis(400))
        );
        assert_eq!(cursor.step_blinking(&params).0, LedCommand::On);
    }
}
