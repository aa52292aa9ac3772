//! In-memory platform for tests and the simulator
//!
//! Every double records what the driver asked of it so callers can assert
//! on the exact sequence of rail switches, regulator voltages, key events
//! and firmware attempts.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use touchkey_transport::MockBus;

use crate::error::DriverError;
use crate::keymap::KeyCode;
use crate::platform::{
    FirmwareFlasher, KeyEventSink, LedRegulator, Platform, PowerRails, TouchGuard, WakeLock,
};

// ── Key sink ──

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<(KeyCode, bool)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(KeyCode, bool)> {
        self.events.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl KeyEventSink for RecordingSink {
    fn report_key(&self, key: KeyCode, pressed: bool) {
        self.events.lock().push((key, pressed));
    }
}

// ── Power rails ──

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimRail {
    Device,
    Led,
}

#[derive(Default)]
pub struct SimRails {
    device: AtomicBool,
    led: AtomicBool,
    events: Mutex<Vec<(SimRail, bool)>>,
}

impl SimRails {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_on(&self, rail: SimRail) -> bool {
        match rail {
            SimRail::Device => self.device.load(Ordering::SeqCst),
            SimRail::Led => self.led.load(Ordering::SeqCst),
        }
    }

    pub fn events(&self) -> Vec<(SimRail, bool)> {
        self.events.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl PowerRails for SimRails {
    fn set_device_power(&self, on: bool) {
        self.device.store(on, Ordering::SeqCst);
        self.events.lock().push((SimRail::Device, on));
    }

    fn set_led_power(&self, on: bool) {
        self.led.store(on, Ordering::SeqCst);
        self.events.lock().push((SimRail::Led, on));
    }
}

// ── Regulator ──

pub struct SimRegulator {
    current: Mutex<Option<u32>>,
    history: Mutex<Vec<u32>>,
}

impl SimRegulator {
    pub fn new(initial_mv: Option<u32>) -> Self {
        Self {
            current: Mutex::new(initial_mv),
            history: Mutex::new(Vec::new()),
        }
    }

    /// Every voltage set since creation or the last [`clear`](Self::clear)
    pub fn history(&self) -> Vec<u32> {
        self.history.lock().clone()
    }

    pub fn clear(&self) {
        self.history.lock().clear();
    }
}

impl LedRegulator for SimRegulator {
    fn set_voltage_mv(&self, mv: u32) -> Result<(), DriverError> {
        *self.current.lock() = Some(mv);
        self.history.lock().push(mv);
        Ok(())
    }

    fn voltage_mv(&self) -> Option<u32> {
        *self.current.lock()
    }
}

// ── Wake-lock ──

#[derive(Default)]
pub struct SimWakeLock {
    held: AtomicBool,
    acquisitions: AtomicU32,
}

impl SimWakeLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquisitions(&self) -> u32 {
        self.acquisitions.load(Ordering::SeqCst)
    }
}

impl WakeLock for SimWakeLock {
    fn acquire(&self) {
        self.held.store(true, Ordering::SeqCst);
        self.acquisitions.fetch_add(1, Ordering::SeqCst);
    }

    fn release(&self) {
        self.held.store(false, Ordering::SeqCst);
    }

    fn is_held(&self) -> bool {
        self.held.load(Ordering::SeqCst)
    }
}

// ── Touchscreen guard ──

#[derive(Default)]
pub struct SimTouchGuard {
    active: AtomicBool,
}

impl SimTouchGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }
}

impl TouchGuard for SimTouchGuard {
    fn touch_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

// ── Firmware flasher ──

/// Plays back scripted flash results; succeeds once the script runs out
pub struct SimFlasher {
    version: u8,
    results: Mutex<VecDeque<Result<(), DriverError>>>,
    attempts: AtomicU32,
}

impl SimFlasher {
    pub fn new(version: u8) -> Self {
        Self {
            version,
            results: Mutex::new(VecDeque::new()),
            attempts: AtomicU32::new(0),
        }
    }

    pub fn fail_next(&self, count: usize) {
        let mut results = self.results.lock();
        for _ in 0..count {
            results.push_back(Err(DriverError::FirmwareUpdateFailed { attempts: 1 }));
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FirmwareFlasher for SimFlasher {
    async fn flash(&self) -> Result<(), DriverError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        // Programming the part takes a while
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        let next = self.results.lock().pop_front();
        next.unwrap_or(Ok(()))
    }

    fn bundled_version(&self) -> u8 {
        self.version
    }
}

// ── Bundle ──

/// Concrete handles to every simulated collaborator
#[derive(Clone)]
pub struct SimPlatform {
    pub bus: Arc<MockBus>,
    pub rails: Arc<SimRails>,
    pub regulator: Arc<SimRegulator>,
    pub wake_lock: Arc<SimWakeLock>,
    pub sink: Arc<RecordingSink>,
    pub touch_guard: Arc<SimTouchGuard>,
    pub flasher: Arc<SimFlasher>,
}

impl SimPlatform {
    pub fn new(bus: MockBus) -> Self {
        Self {
            bus: Arc::new(bus),
            rails: Arc::new(SimRails::new()),
            regulator: Arc::new(SimRegulator::new(None)),
            wake_lock: Arc::new(SimWakeLock::new()),
            sink: Arc::new(RecordingSink::new()),
            touch_guard: Arc::new(SimTouchGuard::new()),
            flasher: Arc::new(SimFlasher::new(0x0c)),
        }
    }

    /// Type-erased view handed to the driver
    pub fn platform(&self) -> Platform {
        Platform {
            bus: self.bus.clone(),
            rails: self.rails.clone(),
            regulator: self.regulator.clone(),
            wake_lock: self.wake_lock.clone(),
            sink: self.sink.clone(),
            touch_guard: Some(self.touch_guard.clone()),
            flasher: Some(self.flasher.clone()),
        }
    }
}
