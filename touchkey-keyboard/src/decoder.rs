//! Interrupt-driven key decoding
//!
//! One interrupt is one status-frame read. The frame's status byte carries
//! a 1-based key index and an active-low press bit. Read failures and out
//! of range indices drop the interrupt without escalating; a lost key
//! event is preferable to stalling the interrupt path.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;
use touchkey_transport::protocol::frame_len;
use touchkey_transport::{BusChannel, BusError, KeyFrame};

use crate::keymap::{KeyCode, KeyMap};
use crate::platform::{KeyEventSink, TouchGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    Idle,
    Reading,
    Decoding,
    Dispatching,
}

/// A decoded key transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    /// Raw index from the status byte
    pub index: u8,
    /// Identity after the optional back/menu swap
    pub key: KeyCode,
    pub pressed: bool,
}

/// Result of handling one interrupt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeOutcome {
    Dispatched(KeyEvent),
    /// Press swallowed because the touchscreen is in use
    Suppressed(KeyEvent),
    /// Key index 0 or beyond the key map
    Dropped { status: u8 },
    ReadFailed(BusError),
}

impl DecodeOutcome {
    /// Whether a real key was touched (drives the key backlight)
    pub fn is_key_activity(&self) -> bool {
        matches!(
            self,
            DecodeOutcome::Dispatched(_) | DecodeOutcome::Suppressed(_)
        )
    }
}

pub struct KeyDecoder {
    channel: Arc<BusChannel>,
    keymap: KeyMap,
    sink: Arc<dyn KeyEventSink>,
    touch_guard: Option<Arc<dyn TouchGuard>>,
    swap_back_menu: AtomicBool,
    /// Held keys by index, with the identity they were reported as
    held: Mutex<BTreeMap<u8, KeyCode>>,
    state: Mutex<DecoderState>,
}

impl KeyDecoder {
    pub fn new(channel: Arc<BusChannel>, keymap: KeyMap, sink: Arc<dyn KeyEventSink>) -> Self {
        Self {
            channel,
            keymap,
            sink,
            touch_guard: None,
            swap_back_menu: AtomicBool::new(false),
            held: Mutex::new(BTreeMap::new()),
            state: Mutex::new(DecoderState::Idle),
        }
    }

    pub fn with_touch_guard(mut self, guard: Option<Arc<dyn TouchGuard>>) -> Self {
        self.touch_guard = guard;
        self
    }

    pub fn keymap(&self) -> &KeyMap {
        &self.keymap
    }

    pub fn state(&self) -> DecoderState {
        *self.state.lock()
    }

    pub fn swap_back_menu(&self) -> bool {
        self.swap_back_menu.load(Ordering::SeqCst)
    }

    pub fn set_swap_back_menu(&self, swap: bool) {
        self.swap_back_menu.store(swap, Ordering::SeqCst);
    }

    /// Indices currently held down, ascending
    pub fn held_keys(&self) -> Vec<u8> {
        self.held.lock().keys().copied().collect()
    }

    /// Read and decode one status frame, dispatching at most one event
    pub async fn handle_interrupt(&self) -> DecodeOutcome {
        self.set_state(DecoderState::Reading);
        let frame = match self
            .channel
            .read_frame(frame_len::STATUS)
            .await
            .and_then(|bytes| KeyFrame::parse(&bytes))
        {
            Ok(frame) => frame,
            Err(e) => {
                debug!("Touchkey status read failed, dropping interrupt: {}", e);
                self.set_state(DecoderState::Idle);
                return DecodeOutcome::ReadFailed(e);
            }
        };

        self.set_state(DecoderState::Decoding);
        let outcome = self.decode(frame);
        self.set_state(DecoderState::Idle);
        outcome
    }

    fn decode(&self, frame: KeyFrame) -> DecodeOutcome {
        let index = frame.key_index();
        let Some(key) = self.keymap.lookup(index) else {
            debug!(
                "Dropping key index {} (status 0x{:02x}, {} keys mapped)",
                index,
                frame.status_byte,
                self.keymap.len()
            );
            return DecodeOutcome::Dropped {
                status: frame.status_byte,
            };
        };
        let key = self.remap(key);
        let pressed = frame.is_press();
        let event = KeyEvent {
            index,
            key,
            pressed,
        };

        if pressed && self.touch_guard.as_ref().is_some_and(|g| g.touch_active()) {
            debug!("Suppressing {} press while the touchscreen is active", key.name());
            return DecodeOutcome::Suppressed(event);
        }

        self.set_state(DecoderState::Dispatching);
        {
            let mut held = self.held.lock();
            if pressed {
                held.insert(index, key);
            } else {
                held.remove(&index);
            }
        }
        debug!(
            "Key {} {}",
            key.name(),
            if pressed { "pressed" } else { "released" }
        );
        self.sink.report_key(key, pressed);
        DecodeOutcome::Dispatched(event)
    }

    /// Report a release for every held key, lowest index first
    pub fn release_all(&self) -> Vec<KeyEvent> {
        let held = std::mem::take(&mut *self.held.lock());
        held.into_iter()
            .map(|(index, key)| {
                debug!("Releasing held key {} (index {})", key.name(), index);
                self.sink.report_key(key, false);
                KeyEvent {
                    index,
                    key,
                    pressed: false,
                }
            })
            .collect()
    }

    fn remap(&self, key: KeyCode) -> KeyCode {
        if self.swap_back_menu() {
            key.swapped()
        } else {
            key
        }
    }

    fn set_state(&self, state: DecoderState) {
        *self.state.lock() = state;
    }
}
