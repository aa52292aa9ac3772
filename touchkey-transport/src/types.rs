//! Frame types and per-variant frame layouts

use serde::{Deserialize, Serialize};

use crate::error::BusError;
use crate::protocol::{cmd, frame_len, status};

/// Module version from which North American boards use the narrow
/// sensitivity layout
pub const NA_NARROW_SENSITIVITY_MODULE: u8 = 8;

// ============================================================================
// KeyFrame
// ============================================================================

/// Leading bytes of every frame read from the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyFrame {
    pub status_byte: u8,
    pub firmware_version: u8,
    pub module_version: u8,
}

impl KeyFrame {
    pub fn parse(bytes: &[u8]) -> Result<Self, BusError> {
        if bytes.len() < frame_len::STATUS {
            return Err(BusError::ShortFrame {
                expected: frame_len::STATUS,
                actual: bytes.len(),
            });
        }
        Ok(Self {
            status_byte: bytes[0],
            firmware_version: bytes[1],
            module_version: bytes[2],
        })
    }

    /// Raw key index, 0 means "no key"
    pub fn key_index(&self) -> u8 {
        self.status_byte & status::KEY_CODE_MASK
    }

    /// The press-event bit is active low
    pub fn is_press(&self) -> bool {
        self.status_byte & status::PRESS_EVENT_BIT == 0
    }

    pub fn autocal_done(&self) -> bool {
        self.status_byte & status::AUTOCAL_BIT != 0
    }
}

// ============================================================================
// LED commands
// ============================================================================

/// LED command understood by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LedCommand {
    On,
    Off,
}

impl LedCommand {
    /// Decode a command byte in either encoding
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            cmd::LED_ON | cmd::LED_ON_EXT => Some(LedCommand::On),
            cmd::LED_OFF | cmd::LED_OFF_EXT => Some(LedCommand::Off),
            _ => None,
        }
    }
}

/// Which command bytes the attached module expects
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedCommandEncoding {
    /// `0x01` / `0x02`
    #[default]
    Legacy,
    /// `0x10` / `0x20`
    Extended,
    /// Extended from `extended_from` onwards, legacy below
    ByModuleVersion { extended_from: u8 },
}

impl LedCommandEncoding {
    pub fn encode(&self, command: LedCommand, module_version: u8) -> u8 {
        let extended = match *self {
            LedCommandEncoding::Legacy => false,
            LedCommandEncoding::Extended => true,
            LedCommandEncoding::ByModuleVersion { extended_from } => {
                module_version >= extended_from
            }
        };
        match (command, extended) {
            (LedCommand::On, false) => cmd::LED_ON,
            (LedCommand::Off, false) => cmd::LED_OFF,
            (LedCommand::On, true) => cmd::LED_ON_EXT,
            (LedCommand::Off, true) => cmd::LED_OFF_EXT,
        }
    }
}

// ============================================================================
// Hardware variants and frame layouts
// ============================================================================

/// Board family, chosen by configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HardwareVariant {
    /// Two-key board
    #[default]
    Generic,
    Q1,
    M0,
    /// Four-key North American board
    NorthAmerica,
    /// Four-key board with the ATT key set
    NorthAmericaAtt,
}

/// Keys that have a sensitivity field in the diagnostic frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensitivityKey {
    Menu,
    Back,
    Home,
    Search,
}

/// Encoding of a diagnostic field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldWidth {
    U8,
    /// Two bytes, big-endian
    U16Be,
}

/// Where diagnostic fields live inside the frames of a given variant.
///
/// Resolved once from configuration and the identified module version;
/// callers never branch on the variant themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameLayout {
    Generic,
    Q1,
    M0,
    /// `narrow` is set for modules at or above [`NA_NARROW_SENSITIVITY_MODULE`]
    NorthAmerica { narrow: bool },
    NorthAmericaAtt,
}

impl FrameLayout {
    pub fn resolve(variant: HardwareVariant, module_version: u8) -> Self {
        match variant {
            HardwareVariant::Generic => FrameLayout::Generic,
            HardwareVariant::Q1 => FrameLayout::Q1,
            HardwareVariant::M0 => FrameLayout::M0,
            HardwareVariant::NorthAmerica => FrameLayout::NorthAmerica {
                narrow: module_version >= NA_NARROW_SENSITIVITY_MODULE,
            },
            HardwareVariant::NorthAmericaAtt => FrameLayout::NorthAmericaAtt,
        }
    }

    /// Offset of the raw-data word for `channel` (0..4) in a 26-byte frame
    pub fn raw_data_offset(&self, channel: usize) -> Option<usize> {
        let offsets: [usize; 4] = match self {
            FrameLayout::Generic => [10, 12, 14, 16],
            FrameLayout::Q1 => [14, 16, 14, 16],
            FrameLayout::M0 => [16, 14, 14, 16],
            FrameLayout::NorthAmerica { .. } | FrameLayout::NorthAmericaAtt => [18, 20, 22, 24],
        };
        offsets.get(channel).copied()
    }

    pub fn raw_data_len(&self) -> usize {
        frame_len::RAW_DATA
    }

    /// Offset of the idac byte for `channel` (0..4) in a 10-byte frame
    pub fn idac_offset(&self, channel: usize) -> Option<usize> {
        (channel < 4).then_some(6 + channel)
    }

    pub fn threshold_offset(&self) -> usize {
        4
    }

    pub fn idac_len(&self) -> usize {
        frame_len::IDAC
    }

    pub fn sensitivity_len(&self) -> usize {
        match self {
            FrameLayout::Generic => 10,
            FrameLayout::Q1 | FrameLayout::M0 => 14,
            FrameLayout::NorthAmerica { .. } | FrameLayout::NorthAmericaAtt => 18,
        }
    }

    /// Location of a key's sensitivity field, `None` if the board lacks the key
    pub fn sensitivity_field(&self, key: SensitivityKey) -> Option<(usize, FieldWidth)> {
        use SensitivityKey::*;
        match (self, key) {
            (FrameLayout::Generic, Menu) => Some((7, FieldWidth::U8)),
            (FrameLayout::Generic, Back) => Some((9, FieldWidth::U8)),
            (FrameLayout::Q1 | FrameLayout::M0, Menu) => Some((13, FieldWidth::U8)),
            (FrameLayout::Q1 | FrameLayout::M0, Back) => Some((11, FieldWidth::U8)),
            (FrameLayout::Generic | FrameLayout::Q1 | FrameLayout::M0, _) => None,
            (FrameLayout::NorthAmerica { narrow: false }, k) => {
                let offset = match k {
                    Search => 6,
                    Back => 8,
                    Home => 10,
                    Menu => 12,
                };
                Some((offset, FieldWidth::U16Be))
            }
            (FrameLayout::NorthAmerica { narrow: true }, k) => {
                let offset = match k {
                    Search => 11,
                    Back => 13,
                    Home => 15,
                    Menu => 17,
                };
                Some((offset, FieldWidth::U8))
            }
            (FrameLayout::NorthAmericaAtt, k) => {
                let offset = match k {
                    Menu => 10,
                    Home => 12,
                    Back => 14,
                    Search => 16,
                };
                Some((offset, FieldWidth::U16Be))
            }
        }
    }
}

/// Extract a field from a frame
pub fn read_field(frame: &[u8], offset: usize, width: FieldWidth) -> Result<u16, BusError> {
    let needed = match width {
        FieldWidth::U8 => offset + 1,
        FieldWidth::U16Be => offset + 2,
    };
    if frame.len() < needed {
        return Err(BusError::ShortFrame {
            expected: needed,
            actual: frame.len(),
        });
    }
    Ok(match width {
        FieldWidth::U8 => frame[offset] as u16,
        FieldWidth::U16Be => u16::from_be_bytes([frame[offset], frame[offset + 1]]),
    })
}
