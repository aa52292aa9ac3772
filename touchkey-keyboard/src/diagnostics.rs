//! Sensor diagnostics and autocalibration
//!
//! Read-only pass-through of the diagnostic frame fields. Field offsets
//! come from the layout resolved at identification.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};
use touchkey_transport::protocol::{cmd, frame_len, status, timing, KEYCODE_REG};
use touchkey_transport::{read_field, BusChannel, FieldWidth};

use crate::error::DriverError;
use crate::identity::DeviceIdentity;
use crate::keymap::KeyCode;

/// Number of raw-data / idac channels
pub const SENSOR_CHANNELS: usize = 4;

/// Run the autocalibration handshake. Returns whether the controller
/// reported calibration done.
pub async fn autocalibrate(channel: &BusChannel) -> Result<bool, DriverError> {
    for attempt in 1..=timing::AUTOCAL_ATTEMPTS {
        let mut request = channel.read_frame(frame_len::AUTOCAL_CMD).await?;
        request[0] = cmd::AUTOCAL;
        request[3] = cmd::AUTOCAL_ENABLE;
        channel.write(KEYCODE_REG, &request).await?;
        tokio::time::sleep(Duration::from_millis(timing::AUTOCAL_SETTLE_MS)).await;

        let reply = channel.read_frame(frame_len::AUTOCAL_STATUS).await?;
        if reply[5] & status::AUTOCAL_BIT != 0 {
            info!("Touchkey autocalibration enabled");
            return Ok(true);
        }
        debug!(
            "Autocalibration not confirmed (attempt {}/{})",
            attempt,
            timing::AUTOCAL_ATTEMPTS
        );
    }
    Ok(false)
}

pub struct Diagnostics {
    channel: Arc<BusChannel>,
    identity: Arc<DeviceIdentity>,
}

impl Diagnostics {
    pub fn new(channel: Arc<BusChannel>, identity: Arc<DeviceIdentity>) -> Self {
        Self { channel, identity }
    }

    pub async fn raw_data(&self, sensor: usize) -> Result<u16, DriverError> {
        let layout = self.identity.layout();
        let offset = layout.raw_data_offset(sensor).ok_or_else(|| {
            DriverError::InvalidParameter(format!("no raw data channel {}", sensor))
        })?;
        let frame = self.channel.read_frame(layout.raw_data_len()).await?;
        Ok(read_field(&frame, offset, FieldWidth::U16Be)?)
    }

    pub async fn idac(&self, sensor: usize) -> Result<u8, DriverError> {
        let layout = self.identity.layout();
        let offset = layout
            .idac_offset(sensor)
            .ok_or_else(|| DriverError::InvalidParameter(format!("no idac channel {}", sensor)))?;
        let frame = self.channel.read_frame(layout.idac_len()).await?;
        Ok(frame[offset])
    }

    pub async fn threshold(&self) -> Result<u8, DriverError> {
        let layout = self.identity.layout();
        let frame = self.channel.read_frame(layout.idac_len()).await?;
        Ok(frame[layout.threshold_offset()])
    }

    pub async fn sensitivity(&self, key: KeyCode) -> Result<u16, DriverError> {
        let layout = self.identity.layout();
        let (offset, width) = key
            .sensitivity_key()
            .and_then(|k| layout.sensitivity_field(k))
            .ok_or_else(|| {
                DriverError::NotSupported(format!("{} sensitivity on {:?}", key.name(), layout))
            })?;
        let frame = self.channel.read_frame(layout.sensitivity_len()).await?;
        Ok(read_field(&frame, offset, width)?)
    }

    pub async fn autocal_status(&self) -> Result<bool, DriverError> {
        let frame = self.channel.read_frame(frame_len::AUTOCAL_STATUS).await?;
        Ok(frame[5] & status::AUTOCAL_BIT != 0)
    }

    pub async fn autocalibrate(&self) -> Result<bool, DriverError> {
        autocalibrate(&self.channel).await
    }

    /// Put the controller into touch sensitivity mode
    pub async fn enter_sensitivity_mode(&self) -> Result<(), DriverError> {
        self.channel.write_command(cmd::TOUCH_SENSITIVITY).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use touchkey_transport::{BusTransaction, HardwareVariant, MockBus};

    async fn diagnostics(bus: &Arc<MockBus>, variant: HardwareVariant) -> Diagnostics {
        let channel = Arc::new(BusChannel::new(bus.clone()));
        channel.enable();
        let identity = Arc::new(DeviceIdentity::new(variant));
        identity.identify(&channel).await.unwrap();
        Diagnostics::new(channel, identity)
    }

    #[tokio::test(start_paused = true)]
    async fn test_raw_data_uses_variant_offsets() {
        let bus = Arc::new(MockBus::new());
        let diag = diagnostics(&bus, HardwareVariant::Generic).await;

        let mut frame = vec![0u8; 26];
        frame[12] = 0x01;
        frame[13] = 0x2c;
        bus.push_read(frame);
        assert_eq!(diag.raw_data(1).await.unwrap(), 300);
        assert!(matches!(
            diag.raw_data(4).await,
            Err(DriverError::InvalidParameter(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idac_and_threshold() {
        let bus = Arc::new(MockBus::new());
        let diag = diagnostics(&bus, HardwareVariant::Q1).await;
        bus.push_read(vec![0, 0, 0, 0, 0x21, 0, 0x11, 0x12, 0x13, 0x14]);
        bus.push_read(vec![0, 0, 0, 0, 0x21, 0, 0x11, 0x12, 0x13, 0x14]);
        assert_eq!(diag.idac(2).await.unwrap(), 0x13);
        assert_eq!(diag.threshold().await.unwrap(), 0x21);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sensitivity_missing_key_not_supported() {
        let bus = Arc::new(MockBus::new());
        let diag = diagnostics(&bus, HardwareVariant::Generic).await;
        assert!(matches!(
            diag.sensitivity(KeyCode::Home).await,
            Err(DriverError::NotSupported(_))
        ));

        let mut frame = vec![0u8; 10];
        frame[9] = 42;
        bus.push_read(frame);
        assert_eq!(diag.sensitivity(KeyCode::Back).await.unwrap(), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_autocalibrate_retries_until_confirmed() {
        let bus = Arc::new(MockBus::new());
        let diag = diagnostics(&bus, HardwareVariant::Generic).await;
        bus.clear_log();

        bus.push_read(vec![0, 0x0a, 0x08, 0]);
        bus.push_read(vec![0; 6]);
        bus.push_read(vec![0, 0x0a, 0x08, 0]);
        bus.push_read(vec![0, 0, 0, 0, 0, 0x80]);
        assert!(diag.autocalibrate().await.unwrap());

        let writes = bus.writes();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0], vec![0x50, 0x0a, 0x08, 0x01]);
        assert!(matches!(
            bus.transactions()[0],
            BusTransaction::Read { len: 4, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_autocalibrate_gives_up() {
        let bus = Arc::new(MockBus::new());
        let diag = diagnostics(&bus, HardwareVariant::Generic).await;
        assert!(!diag.autocalibrate().await.unwrap());
        assert_eq!(bus.writes().len(), 3);
    }
}
