//! Suspend/resume
//!
//! Suspend waits out any firmware update, then quiesces the interrupt path
//! before touching shared state; resume re-powers and re-identifies under
//! the controller lock and only then lets interrupts back in. A repeated
//! suspend or a resume without a suspend does nothing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};
use touchkey_transport::{BusChannel, LedCommand};

use crate::decoder::{KeyDecoder, KeyEvent};
use crate::diagnostics::autocalibrate;
use crate::firmware::FirmwareUpdater;
use crate::identity::DeviceIdentity;
use crate::irq::IrqGate;
use crate::led::BacklightTimeout;
use crate::notification::NotificationController;
use crate::scheduler::TimerKind;

pub struct PowerLifecycle {
    controller: NotificationController,
    decoder: Arc<KeyDecoder>,
    gate: Arc<IrqGate>,
    channel: Arc<BusChannel>,
    identity: Arc<DeviceIdentity>,
    firmware: Arc<FirmwareUpdater>,
    autocal: bool,
    suspended: AtomicBool,
}

impl PowerLifecycle {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        controller: NotificationController,
        decoder: Arc<KeyDecoder>,
        gate: Arc<IrqGate>,
        channel: Arc<BusChannel>,
        identity: Arc<DeviceIdentity>,
        firmware: Arc<FirmwareUpdater>,
        autocal: bool,
    ) -> Self {
        Self {
            controller,
            decoder,
            gate,
            channel,
            identity,
            firmware,
            autocal,
            suspended: AtomicBool::new(false),
        }
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::SeqCst)
    }

    /// Returns the synthetic releases that were reported
    pub async fn suspend(&self) -> Vec<KeyEvent> {
        if self.suspended.swap(true, Ordering::SeqCst) {
            debug!("Touchkey already suspended");
            return Vec::new();
        }
        let _flashing = self.firmware.exclusive().await;
        self.gate.mask().await;
        let released = self.decoder.release_all();

        let mut st = self.controller.lock_state().await;
        self.controller.timers().cancel(TimerKind::Backlight);
        self.controller.power_down();
        st.screen_on = false;
        info!(
            "Touchkey suspended ({} held key(s) released)",
            released.len()
        );
        released
    }

    pub async fn resume(&self) {
        if !self.suspended.swap(false, Ordering::SeqCst) {
            debug!("Touchkey resume without suspend ignored");
            return;
        }
        let mut st = self.controller.lock_state().await;
        self.controller.power_up().await;

        if let Err(e) = self.identity.identify(&self.channel).await {
            warn!("Touchkey identification after resume failed: {}", e);
        }
        if self.autocal {
            if let Err(e) = autocalibrate(&self.channel).await {
                warn!("Touchkey autocalibration after resume failed: {}", e);
            }
        }

        // The screen is back; a notification session does not survive it
        let was_notifying = st.led_on;
        if was_notifying {
            self.controller.abandon_session(&mut st);
        }

        let mut lit = false;
        if !self.controller.is_force_disabled() {
            if was_notifying || st.backlight_timeout != BacklightTimeout::AlwaysOff {
                self.controller.set_voltage(st.brightness_mv);
                self.controller.write_led(&mut st, LedCommand::On).await;
                lit = true;
            }
            self.controller.rearm_backlight(&st);
        }
        if !lit && st.needs_led_resync() {
            if let Some(command) = st.last_led_command() {
                self.controller.write_led(&mut st, command).await;
            }
        }

        st.screen_on = true;
        drop(st);
        self.gate.unmask();
        info!("Touchkey resumed");
    }
}
