//! Scripted in-memory bus
//!
//! `MockBus` plays back a queue of read results and records every
//! transaction. When the read queue is empty it answers with the identity
//! frame (no key, configured firmware/module version) padded to the
//! requested length.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::BusError;
use crate::protocol::{status, KEYCODE_REG};
use crate::types::LedCommand;
use crate::Bus;

/// One recorded bus transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusTransaction {
    Read { register: u8, len: usize },
    Write { register: u8, data: Vec<u8> },
}

struct MockState {
    present: bool,
    firmware_version: u8,
    module_version: u8,
    reads: VecDeque<Result<Vec<u8>, BusError>>,
    write_failures: VecDeque<BusError>,
    log: Vec<BusTransaction>,
}

pub struct MockBus {
    state: Mutex<MockState>,
}

impl Default for MockBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBus {
    pub fn new() -> Self {
        Self::with_identity(0x0a, 0x08)
    }

    pub fn with_identity(firmware_version: u8, module_version: u8) -> Self {
        Self {
            state: Mutex::new(MockState {
                present: true,
                firmware_version,
                module_version,
                reads: VecDeque::new(),
                write_failures: VecDeque::new(),
                log: Vec::new(),
            }),
        }
    }

    /// A bus with nothing attached; every transfer fails
    pub fn absent() -> Self {
        let bus = Self::new();
        bus.state.lock().present = false;
        bus
    }

    pub fn set_identity(&self, firmware_version: u8, module_version: u8) {
        let mut state = self.state.lock();
        state.firmware_version = firmware_version;
        state.module_version = module_version;
    }

    pub fn push_read(&self, frame: Vec<u8>) {
        self.state.lock().reads.push_back(Ok(frame));
    }

    pub fn push_read_error(&self, error: BusError) {
        self.state.lock().reads.push_back(Err(error));
    }

    /// Queue a status frame reporting `index` pressed or released
    pub fn push_key(&self, index: u8, pressed: bool) {
        let mut state = self.state.lock();
        let mut status_byte = index & status::KEY_CODE_MASK;
        if !pressed {
            status_byte |= status::PRESS_EVENT_BIT;
        }
        let frame = vec![status_byte, state.firmware_version, state.module_version];
        state.reads.push_back(Ok(frame));
    }

    /// Make the next `count` write attempts fail with `error`
    pub fn fail_next_writes(&self, count: usize, error: BusError) {
        let mut state = self.state.lock();
        for _ in 0..count {
            state.write_failures.push_back(error.clone());
        }
    }

    pub fn reads_remaining(&self) -> usize {
        self.state.lock().reads.len()
    }

    pub fn transactions(&self) -> Vec<BusTransaction> {
        self.state.lock().log.clone()
    }

    pub fn clear_log(&self) {
        self.state.lock().log.clear();
    }

    /// Payloads of every write attempt, in order
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.state
            .lock()
            .log
            .iter()
            .filter_map(|t| match t {
                BusTransaction::Write { data, .. } => Some(data.clone()),
                BusTransaction::Read { .. } => None,
            })
            .collect()
    }

    /// Single-byte writes to the key register decoded as LED commands
    pub fn led_commands(&self) -> Vec<LedCommand> {
        self.state
            .lock()
            .log
            .iter()
            .filter_map(|t| match t {
                BusTransaction::Write { register, data }
                    if *register == KEYCODE_REG && data.len() == 1 =>
                {
                    LedCommand::from_byte(data[0])
                }
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl Bus for MockBus {
    async fn read(&self, register: u8, len: usize) -> Result<Vec<u8>, BusError> {
        let mut state = self.state.lock();
        state.log.push(BusTransaction::Read { register, len });
        if !state.present {
            return Err(BusError::DeviceNotFound("no ack from touchkey".into()));
        }
        match state.reads.pop_front() {
            Some(result) => result,
            None => {
                let mut frame = vec![0u8; len];
                if len >= 3 {
                    frame[1] = state.firmware_version;
                    frame[2] = state.module_version;
                }
                Ok(frame)
            }
        }
    }

    async fn write(&self, register: u8, data: &[u8]) -> Result<(), BusError> {
        let mut state = self.state.lock();
        state.log.push(BusTransaction::Write {
            register,
            data: data.to_vec(),
        });
        if !state.present {
            return Err(BusError::DeviceNotFound("no ack from touchkey".into()));
        }
        match state.write_failures.pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}
