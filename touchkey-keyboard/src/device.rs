//! Device aggregate: attach, interrupt entry, suspend/resume, detach

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, warn};
use touchkey_transport::protocol::timing;
use touchkey_transport::{
    BusChannel, HardwareVariant, LedCommand, LedCommandEncoding, RetryPolicy,
};

use crate::control::ControlSurface;
use crate::decoder::{KeyDecoder, KeyEvent};
use crate::diagnostics::{autocalibrate, Diagnostics};
use crate::error::DriverError;
use crate::firmware::{FirmwarePolicy, FirmwareUpdater};
use crate::identity::DeviceIdentity;
use crate::irq::{spawn_worker, IrqGate, IrqLine};
use crate::keymap::{KeyLayout, KeyMap};
use crate::led::BacklightTimeout;
use crate::notification::{ControllerHardware, NotificationController, NotificationDefaults};
use crate::platform::Platform;
use crate::power::PowerLifecycle;

/// Board and policy settings fixed at attach
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceConfig {
    pub variant: HardwareVariant,
    pub layout: KeyLayout,
    pub swap_back_menu: bool,
    /// Run autocalibration after attach, resume and firmware update
    pub autocal: bool,
    pub led_encoding: LedCommandEncoding,
    pub retry: RetryPolicy,
    pub power_settle: Duration,
    pub led: NotificationDefaults,
    pub firmware: FirmwarePolicy,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            variant: HardwareVariant::Generic,
            layout: KeyLayout::TwoKey,
            swap_back_menu: false,
            autocal: false,
            led_encoding: LedCommandEncoding::Legacy,
            retry: RetryPolicy::default(),
            power_settle: Duration::from_millis(timing::POWER_SETTLE_MS),
            led: NotificationDefaults::default(),
            firmware: FirmwarePolicy::default(),
        }
    }
}

pub struct TouchkeyDevice {
    channel: Arc<BusChannel>,
    identity: Arc<DeviceIdentity>,
    controller: NotificationController,
    decoder: Arc<KeyDecoder>,
    gate: Arc<IrqGate>,
    irq: IrqLine,
    worker: JoinHandle<()>,
    power: PowerLifecycle,
    firmware: Arc<FirmwareUpdater>,
    diagnostics: Arc<Diagnostics>,
}

impl TouchkeyDevice {
    pub async fn attach(platform: Platform, config: DeviceConfig) -> Result<Self, DriverError> {
        let channel = Arc::new(BusChannel::with_policy(platform.bus.clone(), config.retry));
        let identity = Arc::new(DeviceIdentity::new(config.variant));
        let gate = Arc::new(IrqGate::new());

        platform.rails.set_device_power(true);
        tokio::time::sleep(config.power_settle).await;
        channel.enable();
        if let Err(e) = identity.identify(&channel).await {
            warn!("Touchkey did not answer at attach: {}", e);
            channel.disable();
            platform.rails.set_device_power(false);
            return Err(DriverError::DeviceNotFound(e.to_string()));
        }

        let controller = NotificationController::new(
            ControllerHardware {
                channel: channel.clone(),
                identity: identity.clone(),
                rails: platform.rails.clone(),
                regulator: platform.regulator.clone(),
                wake_lock: platform.wake_lock.clone(),
            },
            config.led_encoding,
            config.power_settle,
            config.led,
        );
        let firmware = Arc::new(FirmwareUpdater::new(
            platform.flasher.clone(),
            config.firmware,
            channel.clone(),
            gate.clone(),
            identity.clone(),
            controller.clone(),
            config.autocal,
        ));
        firmware.auto_update().await?;

        platform.rails.set_led_power(true);
        if config.autocal {
            if let Err(e) = autocalibrate(&channel).await {
                warn!("Touchkey autocalibration failed: {}", e);
            }
        }

        let decoder = Arc::new(
            KeyDecoder::new(
                channel.clone(),
                KeyMap::from_layout(config.layout),
                platform.sink.clone(),
            )
            .with_touch_guard(platform.touch_guard.clone()),
        );
        decoder.set_swap_back_menu(config.swap_back_menu);

        let (irq, worker) = spawn_worker(gate.clone(), decoder.clone(), controller.clone());
        let power = PowerLifecycle::new(
            controller.clone(),
            decoder.clone(),
            gate.clone(),
            channel.clone(),
            identity.clone(),
            firmware.clone(),
            config.autocal,
        );
        let diagnostics = Arc::new(Diagnostics::new(channel.clone(), identity.clone()));

        if config.led.backlight_timeout != BacklightTimeout::AlwaysOn {
            let mut st = controller.lock_state().await;
            controller.write_led(&mut st, LedCommand::Off).await;
        }

        info!(
            "Touchkey attached: {:?}, firmware 0x{:02x}, module 0x{:02x}, {} keys",
            config.variant,
            identity.firmware_version(),
            identity.module_version(),
            decoder.keymap().len()
        );

        Ok(Self {
            channel,
            identity,
            controller,
            decoder,
            gate,
            irq,
            worker,
            power,
            firmware,
            diagnostics,
        })
    }

    /// Interrupt-context entry point
    pub fn irq_line(&self) -> IrqLine {
        self.irq.clone()
    }

    pub fn controller(&self) -> &NotificationController {
        &self.controller
    }

    pub fn decoder(&self) -> &Arc<KeyDecoder> {
        &self.decoder
    }

    pub fn channel(&self) -> &Arc<BusChannel> {
        &self.channel
    }

    pub fn identity(&self) -> &Arc<DeviceIdentity> {
        &self.identity
    }

    pub fn firmware(&self) -> &Arc<FirmwareUpdater> {
        &self.firmware
    }

    pub fn diagnostics(&self) -> &Arc<Diagnostics> {
        &self.diagnostics
    }

    pub fn irq_masked(&self) -> bool {
        self.gate.is_masked()
    }

    pub fn is_suspended(&self) -> bool {
        self.power.is_suspended()
    }

    pub fn control(&self) -> ControlSurface {
        ControlSurface::new(
            self.controller.clone(),
            self.decoder.clone(),
            self.diagnostics.clone(),
            self.firmware.clone(),
            self.identity.clone(),
        )
    }

    pub async fn suspend(&self) -> Vec<KeyEvent> {
        self.power.suspend().await
    }

    pub async fn resume(&self) {
        self.power.resume().await
    }

    /// Stop the worker and timers and power everything down
    pub async fn detach(self) {
        self.gate.mask().await;
        self.controller.shutdown().await;
        self.worker.abort();
        {
            let _st = self.controller.lock_state().await;
            self.controller.power_down();
        }
        info!("Touchkey detached");
    }
}
