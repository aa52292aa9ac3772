//! Firmware/module identification and the resolved frame layout

use std::sync::atomic::{AtomicU8, Ordering};

use parking_lot::Mutex;
use tracing::debug;
use touchkey_transport::protocol::frame_len;
use touchkey_transport::{BusChannel, FrameLayout, HardwareVariant, KeyFrame};

use crate::error::DriverError;

pub struct DeviceIdentity {
    variant: HardwareVariant,
    firmware_version: AtomicU8,
    module_version: AtomicU8,
    layout: Mutex<FrameLayout>,
}

impl DeviceIdentity {
    pub fn new(variant: HardwareVariant) -> Self {
        Self {
            variant,
            firmware_version: AtomicU8::new(0),
            module_version: AtomicU8::new(0),
            layout: Mutex::new(FrameLayout::resolve(variant, 0)),
        }
    }

    /// Read the status frame, record the versions and re-resolve the layout
    pub async fn identify(&self, channel: &BusChannel) -> Result<KeyFrame, DriverError> {
        let bytes = channel.read_frame(frame_len::STATUS).await?;
        let frame = KeyFrame::parse(&bytes)?;
        self.firmware_version
            .store(frame.firmware_version, Ordering::SeqCst);
        self.module_version
            .store(frame.module_version, Ordering::SeqCst);
        *self.layout.lock() = FrameLayout::resolve(self.variant, frame.module_version);
        debug!(
            "Touchkey firmware 0x{:02x}, module 0x{:02x}",
            frame.firmware_version, frame.module_version
        );
        Ok(frame)
    }

    pub fn variant(&self) -> HardwareVariant {
        self.variant
    }

    pub fn firmware_version(&self) -> u8 {
        self.firmware_version.load(Ordering::SeqCst)
    }

    pub fn module_version(&self) -> u8 {
        self.module_version.load(Ordering::SeqCst)
    }

    pub fn layout(&self) -> FrameLayout {
        *self.layout.lock()
    }
}
