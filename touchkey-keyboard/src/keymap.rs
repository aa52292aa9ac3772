//! Logical key identities and per-board key layouts

use serde::{Deserialize, Serialize};
use touchkey_transport::SensitivityKey;

/// Linux input event codes for the keys a touchkey board can carry
pub mod codes {
    pub const KEY_ENTER: u16 = 28;
    pub const KEY_HOME: u16 = 102;
    pub const KEY_END: u16 = 107;
    pub const KEY_MENU: u16 = 139;
    pub const KEY_BACK: u16 = 158;
    pub const KEY_SEARCH: u16 = 217;
}

/// Logical key identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCode {
    Menu,
    Back,
    Home,
    Search,
    Enter,
    End,
}

impl KeyCode {
    /// Input event code reported to the sink
    pub fn event_code(&self) -> u16 {
        match self {
            KeyCode::Menu => codes::KEY_MENU,
            KeyCode::Back => codes::KEY_BACK,
            KeyCode::Home => codes::KEY_HOME,
            KeyCode::Search => codes::KEY_SEARCH,
            KeyCode::Enter => codes::KEY_ENTER,
            KeyCode::End => codes::KEY_END,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            KeyCode::Menu => "menu",
            KeyCode::Back => "back",
            KeyCode::Home => "home",
            KeyCode::Search => "search",
            KeyCode::Enter => "enter",
            KeyCode::End => "end",
        }
    }

    /// Exchange back and menu, leave everything else alone
    pub fn swapped(self) -> Self {
        match self {
            KeyCode::Menu => KeyCode::Back,
            KeyCode::Back => KeyCode::Menu,
            other => other,
        }
    }

    /// Diagnostic sensitivity field for this key, if it has one
    pub fn sensitivity_key(&self) -> Option<SensitivityKey> {
        match self {
            KeyCode::Menu => Some(SensitivityKey::Menu),
            KeyCode::Back => Some(SensitivityKey::Back),
            KeyCode::Home => Some(SensitivityKey::Home),
            KeyCode::Search => Some(SensitivityKey::Search),
            KeyCode::Enter | KeyCode::End => None,
        }
    }
}

/// Key order reported by the controller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyLayout {
    /// Menu, Back
    #[default]
    TwoKey,
    /// Back, Menu (M0 board)
    TwoKeyReversed,
    /// Menu, Enter, Back, End
    FourKeyAtt,
    /// Search, Back, Home, Menu
    FourKeyNa,
}

impl KeyLayout {
    pub fn keys(&self) -> &'static [KeyCode] {
        match self {
            KeyLayout::TwoKey => &[KeyCode::Menu, KeyCode::Back],
            KeyLayout::TwoKeyReversed => &[KeyCode::Back, KeyCode::Menu],
            KeyLayout::FourKeyAtt => &[KeyCode::Menu, KeyCode::Enter, KeyCode::Back, KeyCode::End],
            KeyLayout::FourKeyNa => &[KeyCode::Search, KeyCode::Back, KeyCode::Home, KeyCode::Menu],
        }
    }
}

/// Decoded key index to key identity. Index 0 is reserved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyMap {
    keys: Vec<KeyCode>,
}

impl KeyMap {
    pub fn new(keys: Vec<KeyCode>) -> Self {
        Self { keys }
    }

    pub fn from_layout(layout: KeyLayout) -> Self {
        Self::new(layout.keys().to_vec())
    }

    /// Number of usable keys (valid indices are `1..=len`)
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn lookup(&self, index: u8) -> Option<KeyCode> {
        let index = index as usize;
        if index == 0 {
            return None;
        }
        self.keys.get(index - 1).copied()
    }

    pub fn keys(&self) -> &[KeyCode] {
        &self.keys
    }
}
