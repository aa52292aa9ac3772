//! Controller firmware update
//!
//! Updates run on their own task with the interrupt masked. Each failed
//! programming attempt is retried after a fixed delay; when every attempt
//! fails the device is powered down and the status sticks at `Fail` until
//! someone triggers again.
//!
//! One update runs at a time, and suspend holds the same exclusion so rails
//! never change under a flash in progress. An update does not start while
//! the device is suspended.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::MutexGuard;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use touchkey_transport::BusChannel;

use crate::diagnostics::autocalibrate;
use crate::error::DriverError;
use crate::identity::DeviceIdentity;
use crate::irq::IrqGate;
use crate::notification::NotificationController;
use crate::platform::FirmwareFlasher;

/// Sentinel written to the update trigger
pub const UPDATE_TRIGGER: &str = "S";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStatus {
    /// No update since attach
    Idle,
    Downloading,
    Pass,
    Fail,
}

impl UpdateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateStatus::Downloading => "DOWNLOADING",
            UpdateStatus::Idle | UpdateStatus::Pass => "PASS",
            UpdateStatus::Fail => "FAIL",
        }
    }
}

/// Which module versions an automatic update applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleRule {
    Any,
    Exactly(u8),
    AtMost(u8),
}

impl ModuleRule {
    pub fn matches(&self, module_version: u8) -> bool {
        match *self {
            ModuleRule::Any => true,
            ModuleRule::Exactly(v) => module_version == v,
            ModuleRule::AtMost(v) => module_version <= v,
        }
    }
}

/// Update-at-attach policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoUpdatePolicy {
    #[default]
    Never,
    BelowVersion { firmware_below: u8, module: ModuleRule },
}

impl AutoUpdatePolicy {
    pub fn wants_update(&self, firmware_version: u8, module_version: u8) -> bool {
        match *self {
            AutoUpdatePolicy::Never => false,
            AutoUpdatePolicy::BelowVersion {
                firmware_below,
                module,
            } => firmware_version < firmware_below && module.matches(module_version),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwarePolicy {
    pub retries: u32,
    pub retry_delay: Duration,
    pub auto_update: AutoUpdatePolicy,
    /// Manual triggers on older modules are skipped and report `Pass`
    pub manual_min_module: Option<u8>,
}

impl Default for FirmwarePolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            retry_delay: Duration::from_millis(50),
            auto_update: AutoUpdatePolicy::Never,
            manual_min_module: None,
        }
    }
}

pub struct FirmwareUpdater {
    flasher: Option<Arc<dyn FirmwareFlasher>>,
    policy: FirmwarePolicy,
    status: Mutex<UpdateStatus>,
    flashing: tokio::sync::Mutex<()>,
    channel: Arc<BusChannel>,
    gate: Arc<IrqGate>,
    identity: Arc<DeviceIdentity>,
    controller: NotificationController,
    autocal: bool,
}

impl FirmwareUpdater {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        flasher: Option<Arc<dyn FirmwareFlasher>>,
        policy: FirmwarePolicy,
        channel: Arc<BusChannel>,
        gate: Arc<IrqGate>,
        identity: Arc<DeviceIdentity>,
        controller: NotificationController,
        autocal: bool,
    ) -> Self {
        Self {
            flasher,
            policy,
            status: Mutex::new(UpdateStatus::Idle),
            flashing: tokio::sync::Mutex::new(()),
            channel,
            gate,
            identity,
            controller,
            autocal,
        }
    }

    pub fn status(&self) -> UpdateStatus {
        *self.status.lock()
    }

    /// Version of the image the flasher would program
    pub fn bundled_version(&self) -> Option<u8> {
        self.flasher.as_ref().map(|f| f.bundled_version())
    }

    /// Wait for any update in flight and keep new ones out while held
    pub(crate) async fn exclusive(&self) -> MutexGuard<'_, ()> {
        self.flashing.lock().await
    }

    /// Start an update on a dedicated task
    pub fn trigger(self: &Arc<Self>) -> Result<JoinHandle<UpdateStatus>, DriverError> {
        if self.flasher.is_none() {
            return Err(DriverError::NotSupported("firmware update".into()));
        }
        {
            let mut status = self.status.lock();
            if *status == UpdateStatus::Downloading {
                return Err(DriverError::UpdateInProgress);
            }
            if let Some(min) = self.policy.manual_min_module {
                let module = self.identity.module_version();
                if module < min {
                    info!(
                        "Skipping firmware update for module 0x{:02x} (needs 0x{:02x})",
                        module, min
                    );
                    *status = UpdateStatus::Pass;
                    return Ok(tokio::spawn(async { UpdateStatus::Pass }));
                }
            }
            *status = UpdateStatus::Downloading;
        }
        let this = self.clone();
        Ok(tokio::spawn(async move { this.run().await }))
    }

    /// Attach-time update, if the policy asks for one
    pub(crate) async fn auto_update(&self) -> Result<(), DriverError> {
        let firmware = self.identity.firmware_version();
        let module = self.identity.module_version();
        if self.flasher.is_none() || !self.policy.auto_update.wants_update(firmware, module) {
            return Ok(());
        }
        info!(
            "Touchkey firmware 0x{:02x} is outdated, updating",
            firmware
        );
        *self.status.lock() = UpdateStatus::Downloading;
        match self.run().await {
            UpdateStatus::Fail => Err(DriverError::FirmwareUpdateFailed {
                attempts: self.policy.retries.max(1),
            }),
            _ => Ok(()),
        }
    }

    async fn run(&self) -> UpdateStatus {
        let Some(flasher) = self.flasher.clone() else {
            return self.finish(UpdateStatus::Fail);
        };
        let _flashing = self.flashing.lock().await;
        self.gate.mask().await;
        {
            let st = self.controller.lock_state().await;
            if !st.screen_on {
                drop(st);
                warn!("Firmware update refused: touchkey is suspended");
                self.gate.unmask();
                return self.finish(UpdateStatus::Fail);
            }
            self.controller.power_up().await;
            self.channel.disable();
        }

        let attempts = self.policy.retries.max(1);
        let mut flashed = false;
        for attempt in 1..=attempts {
            match flasher.flash().await {
                Ok(()) => {
                    flashed = true;
                    break;
                }
                Err(e) => {
                    warn!(
                        "Firmware update attempt {}/{} failed: {}",
                        attempt, attempts, e
                    );
                    if attempt < attempts {
                        tokio::time::sleep(self.policy.retry_delay).await;
                    }
                }
            }
        }
        if flashed {
            tokio::time::sleep(self.policy.retry_delay).await;
        }

        let st = self.controller.lock_state().await;
        let result = if !flashed {
            self.controller.power_down();
            warn!("Touchkey firmware update failed, device powered down");
            UpdateStatus::Fail
        } else if !st.screen_on {
            self.controller.power_down();
            info!("Touchkey firmware updated while suspending, left powered down");
            UpdateStatus::Pass
        } else {
            self.channel.enable();
            if let Err(e) = self.identity.identify(&self.channel).await {
                warn!("Identification after firmware update failed: {}", e);
            }
            if self.autocal {
                if let Err(e) = autocalibrate(&self.channel).await {
                    warn!("Autocalibration after firmware update failed: {}", e);
                }
            }
            info!(
                "Touchkey firmware updated to 0x{:02x}",
                self.identity.firmware_version()
            );
            UpdateStatus::Pass
        };
        drop(st);

        self.gate.unmask();
        self.finish(result)
    }

    fn finish(&self, result: UpdateStatus) -> UpdateStatus {
        *self.status.lock() = result;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_update_policy() {
        let policy = AutoUpdatePolicy::BelowVersion {
            firmware_below: 0x0c,
            module: ModuleRule::Exactly(0x08),
        };
        assert!(policy.wants_update(0x0a, 0x08));
        assert!(!policy.wants_update(0x0c, 0x08));
        assert!(!policy.wants_update(0x0a, 0x07));
        assert!(!AutoUpdatePolicy::Never.wants_update(0, 0));
        assert!(ModuleRule::AtMost(3).matches(3));
        assert!(!ModuleRule::AtMost(3).matches(4));
    }

    #[test]
    fn test_status_strings() {
        assert_eq!(UpdateStatus::Idle.as_str(), "PASS");
        assert_eq!(UpdateStatus::Downloading.as_str(), "DOWNLOADING");
        assert_eq!(UpdateStatus::Fail.as_str(), "FAIL");
    }
}
