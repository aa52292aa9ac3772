//! LED notification controller
//!
//! Owns [`NotificationState`] behind one controller-wide lock. Every
//! command, timer callback and power transition takes that lock, so they
//! observe a consistent snapshot and never interleave. The backlight
//! fade-out is the one long-running path: it re-takes the lock for each
//! step so key activity is never held up behind it.
//!
//! LED writes are best effort: a failed write is logged and flagged for
//! resynchronisation, and the state transition goes ahead anyway. The
//! force-disable flag lives outside the lock and is checked first in every
//! write path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};
use touchkey_transport::protocol::timing;
use touchkey_transport::{BusChannel, LedCommand, LedCommandEncoding};

use crate::error::DriverError;
use crate::identity::DeviceIdentity;
use crate::led::{
    check_voltage, AnimationCursor, AnimationMode, BacklightTimeout, BlinkingParams,
    BreathingParams, NotificationTimeout, VOLTAGE_MIN_MV,
};
use crate::platform::{LedRegulator, PowerRails, WakeLock};
use crate::scheduler::{TimerKind, TimerScheduler, TimerTicket};

/// Initial LED settings applied at attach
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationDefaults {
    pub enabled: bool,
    pub backlight_timeout: BacklightTimeout,
    pub notification_timeout: NotificationTimeout,
    pub fade_out: bool,
    pub brightness_mv: u32,
    pub breathing: BreathingParams,
    pub blinking: BlinkingParams,
}

impl Default for NotificationDefaults {
    fn default() -> Self {
        Self {
            enabled: false,
            backlight_timeout: BacklightTimeout::AlwaysOn,
            notification_timeout: NotificationTimeout::Never,
            fade_out: true,
            brightness_mv: 3300,
            breathing: BreathingParams::default(),
            blinking: BlinkingParams::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ModeKind {
    Off,
    Breathing,
    Blinking,
}

// ============================================================================
// NotificationState
// ============================================================================

/// Shared LED state. Mutated only through [`NotificationController`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationState {
    /// Master switch for notifications
    pub enabled: bool,
    /// A notification session is active
    pub led_on: bool,
    pub screen_on: bool,
    pub backlight_timeout: BacklightTimeout,
    pub notification_timeout: NotificationTimeout,
    pub fade_out: bool,
    pub brightness_mv: u32,
    mode: ModeKind,
    breathing: BreathingParams,
    blinking: BlinkingParams,
    cursor: AnimationCursor,
    last_led: Option<LedCommand>,
    led_resync: bool,
}

impl NotificationState {
    pub fn new(defaults: &NotificationDefaults) -> Self {
        Self {
            enabled: defaults.enabled,
            led_on: false,
            screen_on: true,
            backlight_timeout: defaults.backlight_timeout,
            notification_timeout: defaults.notification_timeout,
            fade_out: defaults.fade_out,
            brightness_mv: defaults.brightness_mv,
            mode: ModeKind::Off,
            breathing: defaults.breathing,
            blinking: defaults.blinking,
            cursor: AnimationCursor::reset(&defaults.breathing),
            last_led: None,
            led_resync: false,
        }
    }

    pub fn animation_mode(&self) -> AnimationMode {
        match self.mode {
            ModeKind::Off => AnimationMode::Off,
            ModeKind::Breathing => AnimationMode::Breathing(self.breathing),
            ModeKind::Blinking => AnimationMode::Blinking(self.blinking),
        }
    }

    pub fn breathing(&self) -> BreathingParams {
        self.breathing
    }

    pub fn blinking(&self) -> BlinkingParams {
        self.blinking
    }

    pub fn cursor(&self) -> AnimationCursor {
        self.cursor
    }

    /// Last LED command the controller asked for
    pub fn last_led_command(&self) -> Option<LedCommand> {
        self.last_led
    }

    /// The last LED write failed and the hardware may disagree
    pub fn needs_led_resync(&self) -> bool {
        self.led_resync
    }

    fn set_mode(&mut self, mode: AnimationMode) {
        match mode {
            AnimationMode::Off => self.mode = ModeKind::Off,
            AnimationMode::Breathing(params) => {
                self.breathing = params;
                self.mode = ModeKind::Breathing;
            }
            AnimationMode::Blinking(params) => {
                self.blinking = params;
                self.mode = ModeKind::Blinking;
            }
        }
    }
}

// ============================================================================
// NotificationController
// ============================================================================

/// Hardware the controller drives
#[derive(Clone)]
pub struct ControllerHardware {
    pub channel: Arc<BusChannel>,
    pub identity: Arc<DeviceIdentity>,
    pub rails: Arc<dyn PowerRails>,
    pub regulator: Arc<dyn LedRegulator>,
    pub wake_lock: Arc<dyn WakeLock>,
}

struct ControllerInner {
    state: Mutex<NotificationState>,
    force_disabled: AtomicBool,
    hw: ControllerHardware,
    encoding: LedCommandEncoding,
    power_settle: Duration,
    timers: TimerScheduler,
}

/// Cheap to clone; timer callbacks hold a weak reference
#[derive(Clone)]
pub struct NotificationController {
    inner: Arc<ControllerInner>,
}

impl NotificationController {
    pub fn new(
        hw: ControllerHardware,
        encoding: LedCommandEncoding,
        power_settle: Duration,
        defaults: NotificationDefaults,
    ) -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                state: Mutex::new(NotificationState::new(&defaults)),
                force_disabled: AtomicBool::new(false),
                hw,
                encoding,
                power_settle,
                timers: TimerScheduler::new(),
            }),
        }
    }

    pub async fn snapshot(&self) -> NotificationState {
        self.inner.state.lock().await.clone()
    }

    pub fn is_force_disabled(&self) -> bool {
        self.inner.force_disabled.load(Ordering::SeqCst)
    }

    pub fn timers(&self) -> &TimerScheduler {
        &self.inner.timers
    }

    // ── Notification sessions ──

    /// Start a notification session. Returns whether it was accepted.
    pub async fn enable_notification(&self) -> bool {
        let mut st = self.inner.state.lock().await;
        if !st.enabled {
            debug!("Notification ignored: notifications are disabled");
            return false;
        }
        if self.is_force_disabled() {
            debug!("Notification ignored: LED is force-disabled");
            return false;
        }

        if !self.inner.hw.wake_lock.is_held() {
            self.inner.hw.wake_lock.acquire();
        }
        if !st.screen_on {
            self.power_up().await;
        }
        self.set_voltage(st.brightness_mv);
        self.write_led(&mut st, LedCommand::On).await;
        st.led_on = true;
        self.start_animation(&mut st);

        match st.notification_timeout {
            NotificationTimeout::After(delay) => self.arm_timer(TimerKind::Notification, delay),
            NotificationTimeout::Never => self.inner.timers.cancel(TimerKind::Notification),
        }
        info!(
            "Notification session started (animation: {})",
            st.animation_mode().name()
        );
        true
    }

    /// End the active notification session. Returns whether one was active.
    pub async fn disable_notification(&self) -> bool {
        let mut st = self.inner.state.lock().await;
        if !st.led_on {
            return false;
        }
        self.end_session(&mut st).await;
        info!("Notification session stopped");
        true
    }

    async fn end_session(&self, st: &mut NotificationState) {
        self.inner.timers.cancel(TimerKind::Notification);
        self.inner.timers.cancel(TimerKind::Animation);
        self.write_led(st, LedCommand::Off).await;
        if !st.screen_on {
            self.power_down();
        }
        st.led_on = false;
        st.cursor = AnimationCursor::reset(&st.breathing);
        self.inner.hw.wake_lock.release();
    }

    // ── Animation ──

    /// Select the animation policy. Breathing and blinking replace each other.
    pub async fn set_animation_mode(&self, mode: AnimationMode) -> Result<(), DriverError> {
        mode.validate()?;
        let mut st = self.inner.state.lock().await;
        self.apply_mode(&mut st, mode).await;
        Ok(())
    }

    pub async fn set_breathing_enabled(&self, enabled: bool) {
        let mut st = self.inner.state.lock().await;
        if enabled {
            let mode = AnimationMode::Breathing(st.breathing);
            self.apply_mode(&mut st, mode).await;
        } else if st.mode == ModeKind::Breathing {
            self.apply_mode(&mut st, AnimationMode::Off).await;
        }
    }

    pub async fn set_blinking_enabled(&self, enabled: bool) {
        let mut st = self.inner.state.lock().await;
        if enabled {
            let mode = AnimationMode::Blinking(st.blinking);
            self.apply_mode(&mut st, mode).await;
        } else if st.mode == ModeKind::Blinking {
            self.apply_mode(&mut st, AnimationMode::Off).await;
        }
    }

    /// Change breathing parameters. A rejected update keeps the old values.
    pub async fn update_breathing<F>(&self, update: F) -> Result<BreathingParams, DriverError>
    where
        F: FnOnce(BreathingParams) -> Result<BreathingParams, DriverError>,
    {
        let mut st = self.inner.state.lock().await;
        let next = update(st.breathing)?;
        st.breathing = next;
        Ok(next)
    }

    pub async fn update_blinking<F>(&self, update: F) -> Result<BlinkingParams, DriverError>
    where
        F: FnOnce(BlinkingParams) -> Result<BlinkingParams, DriverError>,
    {
        let mut st = self.inner.state.lock().await;
        let next = update(st.blinking)?;
        st.blinking = next;
        Ok(next)
    }

    async fn apply_mode(&self, st: &mut NotificationState, mode: AnimationMode) {
        let previous = st.mode;
        st.set_mode(mode);
        debug!("Animation mode set to {}", mode.name());
        if !st.led_on {
            return;
        }
        self.start_animation(st);
        // Leaving an animation mid-blink must not strand the LED dark
        if st.mode == ModeKind::Off && previous != ModeKind::Off {
            self.set_voltage(st.brightness_mv);
            self.write_led(st, LedCommand::On).await;
        }
    }

    fn start_animation(&self, st: &mut NotificationState) {
        self.inner.timers.cancel(TimerKind::Animation);
        st.cursor = AnimationCursor::reset(&st.breathing);
        if st.mode != ModeKind::Off {
            self.arm_timer(
                TimerKind::Animation,
                Duration::from_millis(timing::ANIMATION_START_MS),
            );
        }
    }

    // ── Settings ──

    pub async fn set_enabled(&self, enabled: bool) {
        self.inner.state.lock().await.enabled = enabled;
    }

    /// Replace the backlight policy and restart its timer
    pub async fn set_backlight_timeout(&self, timeout: BacklightTimeout) {
        let mut st = self.inner.state.lock().await;
        st.backlight_timeout = timeout;
        self.inner.timers.cancel(TimerKind::Backlight);
        if let BacklightTimeout::After(delay) = timeout {
            self.arm_timer(TimerKind::Backlight, delay);
        }
    }

    /// Takes effect at the next session
    pub async fn set_notification_timeout(&self, timeout: NotificationTimeout) {
        self.inner.state.lock().await.notification_timeout = timeout;
    }

    pub async fn set_fade_out(&self, fade_out: bool) {
        self.inner.state.lock().await.fade_out = fade_out;
    }

    /// Set the LED supply voltage and pass it through to the regulator
    pub async fn set_brightness(&self, mv: u32) -> Result<(), DriverError> {
        check_voltage("brightness", mv)?;
        let mut st = self.inner.state.lock().await;
        self.inner.hw.regulator.set_voltage_mv(mv)?;
        st.brightness_mv = mv;
        Ok(())
    }

    /// Hard override: switch the LED off now and suppress every LED write
    /// until cleared
    pub async fn set_force_disabled(&self, disabled: bool) {
        if !disabled {
            self.inner.force_disabled.store(false, Ordering::SeqCst);
            info!("LED force-disable cleared");
            return;
        }
        self.inner.force_disabled.store(true, Ordering::SeqCst);
        let mut st = self.inner.state.lock().await;
        self.issue_led(&mut st, LedCommand::Off).await;
        info!("LED force-disabled");
    }

    // ── Key backlight ──

    /// Light the key backlight after key activity and restart its timeout
    pub async fn on_key_activity(&self) {
        if self.is_force_disabled() {
            return;
        }
        let mut st = self.inner.state.lock().await;
        if self.inner.timers.is_pending(TimerKind::Backlight)
            || st.backlight_timeout != BacklightTimeout::AlwaysOff
        {
            self.set_voltage(st.brightness_mv);
            self.write_led(&mut st, LedCommand::On).await;
        }
        if let BacklightTimeout::After(delay) = st.backlight_timeout {
            self.arm_timer(TimerKind::Backlight, delay);
        }
    }

    /// Switch the key backlight off now, unless a notification owns the LED
    pub async fn backlight_off(&self) {
        let mut st = self.inner.state.lock().await;
        if st.led_on {
            debug!("Backlight off ignored during a notification session");
            return;
        }
        self.inner.timers.cancel(TimerKind::Backlight);
        self.write_led(&mut st, LedCommand::Off).await;
    }

    // ── Timer callbacks ──

    pub async fn on_backlight_timeout(&self, ticket: TimerTicket) {
        let (fade_out, from_mv) = {
            let st = self.inner.state.lock().await;
            if !self.backlight_expiry_holds(ticket, &st) {
                return;
            }
            (st.fade_out, st.brightness_mv)
        };
        if fade_out && !self.fade_out(ticket, from_mv).await {
            debug!("Backlight fade-out interrupted");
            return;
        }
        let mut st = self.inner.state.lock().await;
        if !self.backlight_expiry_holds(ticket, &st) {
            return;
        }
        self.write_led(&mut st, LedCommand::Off).await;
        debug!("Key backlight timed out");
    }

    /// Key activity, a notification or a power change since `ticket` was
    /// armed cancels the switch-off
    fn backlight_expiry_holds(&self, ticket: TimerTicket, st: &NotificationState) -> bool {
        self.inner.timers.is_current(ticket)
            && !st.led_on
            && self.inner.hw.channel.is_enabled()
            && !self.is_force_disabled()
    }

    pub async fn on_notification_timeout(&self, ticket: TimerTicket) {
        let mut st = self.inner.state.lock().await;
        if !self.inner.timers.is_current(ticket) || !st.led_on {
            return;
        }
        if !self.inner.hw.channel.is_enabled() {
            debug!("Notification timeout ignored: touchkey is disabled");
            return;
        }
        self.end_session(&mut st).await;
        info!("Notification session timed out");
    }

    pub async fn on_animation_tick(&self, ticket: TimerTicket) {
        let mut st = self.inner.state.lock().await;
        if !self.inner.timers.is_current(ticket) || !st.led_on {
            return;
        }
        let delay = match st.animation_mode() {
            AnimationMode::Off => return,
            AnimationMode::Breathing(params) => {
                let (mv, delay) = st.cursor.step_breathing(&params);
                if !self.is_force_disabled() {
                    self.set_voltage(mv);
                }
                delay
            }
            AnimationMode::Blinking(params) => {
                let (command, delay) = st.cursor.step_blinking(&params);
                self.write_led(&mut st, command).await;
                delay
            }
        };
        self.arm_timer(TimerKind::Animation, delay);
    }

    fn arm_timer(&self, kind: TimerKind, delay: Duration) {
        let weak = Arc::downgrade(&self.inner);
        self.inner.timers.arm(kind, delay, move |ticket| async move {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let controller = NotificationController { inner };
            match ticket.kind {
                TimerKind::Backlight => controller.on_backlight_timeout(ticket).await,
                TimerKind::Notification => controller.on_notification_timeout(ticket).await,
                TimerKind::Animation => controller.on_animation_tick(ticket).await,
            }
        });
    }

    /// Ramp the regulator down to the floor. Returns false if the expiry
    /// was superseded part way.
    async fn fade_out(&self, ticket: TimerTicket, from_mv: u32) -> bool {
        let mut mv = from_mv;
        loop {
            {
                let st = self.inner.state.lock().await;
                if !self.backlight_expiry_holds(ticket, &st) {
                    return false;
                }
                self.set_voltage(mv);
            }
            tokio::time::sleep(Duration::from_millis(timing::FADE_STEP_MS)).await;
            if mv <= VOLTAGE_MIN_MV {
                return true;
            }
            mv = mv.saturating_sub(timing::FADE_STEP_MV).max(VOLTAGE_MIN_MV);
        }
    }

    // ── Hardware access (callers hold the state lock) ──

    pub(crate) async fn lock_state(&self) -> MutexGuard<'_, NotificationState> {
        self.inner.state.lock().await
    }

    /// LED write honouring force-disable
    pub(crate) async fn write_led(&self, st: &mut NotificationState, command: LedCommand) {
        if self.is_force_disabled() {
            debug!("LED {:?} suppressed: force-disabled", command);
            return;
        }
        self.issue_led(st, command).await;
    }

    async fn issue_led(&self, st: &mut NotificationState, command: LedCommand) {
        let byte = self
            .inner
            .encoding
            .encode(command, self.inner.hw.identity.module_version());
        st.last_led = Some(command);
        match self.inner.hw.channel.write_command(byte).await {
            Ok(()) => st.led_resync = false,
            Err(e) => {
                warn!("LED {:?} write failed: {}", command, e);
                st.led_resync = true;
            }
        }
    }

    pub(crate) fn set_voltage(&self, mv: u32) {
        if let Err(e) = self.inner.hw.regulator.set_voltage_mv(mv) {
            warn!("Failed to set LED voltage to {} mV: {}", mv, e);
        }
    }

    /// Device rail, settle, LED rail, then open the channel
    pub(crate) async fn power_up(&self) {
        self.inner.hw.rails.set_device_power(true);
        tokio::time::sleep(self.inner.power_settle).await;
        self.inner.hw.rails.set_led_power(true);
        self.inner.hw.channel.enable();
    }

    pub(crate) fn power_down(&self) {
        self.inner.hw.channel.disable();
        self.inner.hw.rails.set_led_power(false);
        self.inner.hw.rails.set_device_power(false);
    }

    /// Close an active session without touching the LED (resume path)
    pub(crate) fn abandon_session(&self, st: &mut NotificationState) {
        self.inner.timers.cancel(TimerKind::Notification);
        self.inner.timers.cancel(TimerKind::Animation);
        st.led_on = false;
        st.cursor = AnimationCursor::reset(&st.breathing);
        self.inner.hw.wake_lock.release();
    }

    /// Re-arm the backlight timer for a finite policy
    pub(crate) fn rearm_backlight(&self, st: &NotificationState) {
        if let BacklightTimeout::After(delay) = st.backlight_timeout {
            self.arm_timer(TimerKind::Backlight, delay);
        }
    }

    /// Stop all timers and drop the wake-lock (detach)
    pub(crate) async fn shutdown(&self) {
        let mut st = self.inner.state.lock().await;
        self.inner.timers.cancel_all();
        st.led_on = false;
        self.inner.hw.wake_lock.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimPlatform, SimRail};
    use touchkey_transport::{HardwareVariant, MockBus};

    struct Fixture {
        sim: SimPlatform,
        channel: Arc<BusChannel>,
        controller: NotificationController,
    }

    fn fixture(defaults: NotificationDefaults) -> Fixture {
        let sim = SimPlatform::new(MockBus::new());
        let channel = Arc::new(BusChannel::new(sim.bus.clone()));
        channel.enable();
        let controller = NotificationController::new(
            ControllerHardware {
                channel: channel.clone(),
                identity: Arc::new(DeviceIdentity::new(HardwareVariant::Generic)),
                rails: sim.rails.clone(),
                regulator: sim.regulator.clone(),
                wake_lock: sim.wake_lock.clone(),
            },
            LedCommandEncoding::Legacy,
            Duration::from_millis(timing::POWER_SETTLE_MS),
            defaults,
        );
        Fixture {
            sim,
            channel,
            controller,
        }
    }

    fn enabled() -> NotificationDefaults {
        NotificationDefaults {
            enabled: true,
            ..Default::default()
        }
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[tokio::test(start_paused = true)]
    async fn test_enable_requires_master_switch() {
        let f = fixture(NotificationDefaults::default());
        assert!(!f.controller.enable_notification().await);
        assert!(f.sim.bus.led_commands().is_empty());
        assert!(!f.sim.wake_lock.is_held());
    }

    #[tokio::test(start_paused = true)]
    async fn test_enable_then_disable() {
        let f = fixture(enabled());
        assert!(f.controller.enable_notification().await);
        let st = f.controller.snapshot().await;
        assert!(st.led_on);
        assert!(f.sim.wake_lock.is_held());

        assert!(f.controller.disable_notification().await);
        assert!(!f.controller.disable_notification().await);
        assert_eq!(
            f.sim.bus.led_commands(),
            vec![LedCommand::On, LedCommand::Off]
        );
        assert!(!f.sim.wake_lock.is_held());
        assert!(!f.controller.snapshot().await.led_on);
    }

    #[tokio::test(start_paused = true)]
    async fn test_enable_with_screen_off_repowers() {
        let f = fixture(enabled());
        f.controller.lock_state().await.screen_on = false;

        f.controller.enable_notification().await;
        assert_eq!(
            f.sim.rails.events(),
            vec![(SimRail::Device, true), (SimRail::Led, true)]
        );

        f.controller.disable_notification().await;
        assert!(!f.sim.rails.is_on(SimRail::Device));
        assert!(!f.sim.rails.is_on(SimRail::Led));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disable_before_timeout_prevents_late_off() {
        let f = fixture(NotificationDefaults {
            notification_timeout: NotificationTimeout::After(ms(100)),
            ..enabled()
        });
        f.controller.enable_notification().await;
        tokio::time::sleep(ms(50)).await;
        f.controller.disable_notification().await;
        tokio::time::sleep(ms(100)).await;

        assert_eq!(
            f.sim.bus.led_commands(),
            vec![LedCommand::On, LedCommand::Off]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_notification_timeout_ends_session() {
        let f = fixture(NotificationDefaults {
            notification_timeout: NotificationTimeout::After(ms(100)),
            ..enabled()
        });
        f.controller.enable_notification().await;
        tokio::time::sleep(ms(99)).await;
        assert!(f.controller.snapshot().await.led_on);

        tokio::time::sleep(ms(2)).await;
        assert!(!f.controller.snapshot().await.led_on);
        assert!(!f.sim.wake_lock.is_held());
        assert_eq!(
            f.sim.bus.led_commands(),
            vec![LedCommand::On, LedCommand::Off]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_disable_blocks_enable_until_cleared() {
        let f = fixture(enabled());
        f.controller.set_force_disabled(true).await;
        assert_eq!(f.sim.bus.led_commands(), vec![LedCommand::Off]);

        assert!(!f.controller.enable_notification().await);
        f.controller.on_key_activity().await;
        assert!(!f.sim.bus.led_commands().contains(&LedCommand::On));

        f.controller.set_force_disabled(false).await;
        assert!(f.controller.enable_notification().await);
        assert_eq!(
            f.sim.bus.led_commands(),
            vec![LedCommand::Off, LedCommand::On]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_disable_silences_blinking() {
        let f = fixture(enabled());
        f.controller
            .set_animation_mode(AnimationMode::Blinking(BlinkingParams {
                on_ms: 50,
                off_ms: 50,
            }))
            .await
            .unwrap();
        f.controller.enable_notification().await;
        f.controller.set_force_disabled(true).await;

        tokio::time::sleep(ms(300)).await;
        assert_eq!(
            f.sim.bus.led_commands(),
            vec![LedCommand::On, LedCommand::Off]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_disable_skips_backlight_expiry() {
        let f = fixture(NotificationDefaults {
            backlight_timeout: BacklightTimeout::After(ms(100)),
            ..Default::default()
        });
        f.controller.on_key_activity().await;
        f.controller.set_force_disabled(true).await;
        f.sim.regulator.clear();

        tokio::time::sleep(ms(1500)).await;
        assert!(f.sim.regulator.history().is_empty());
        assert_eq!(
            f.sim.bus.led_commands(),
            vec![LedCommand::On, LedCommand::Off]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_notification_timeout_ignored_while_disabled() {
        let f = fixture(NotificationDefaults {
            notification_timeout: NotificationTimeout::After(ms(100)),
            ..enabled()
        });
        f.controller.enable_notification().await;
        f.channel.disable();

        tokio::time::sleep(ms(150)).await;
        assert!(f.controller.snapshot().await.led_on);
        assert!(f.sim.wake_lock.is_held());
        assert_eq!(f.sim.bus.led_commands(), vec![LedCommand::On]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_breathing_and_blinking_exclusive() {
        let f = fixture(enabled());
        f.controller.set_breathing_enabled(true).await;
        f.controller.set_blinking_enabled(true).await;
        assert!(matches!(
            f.controller.snapshot().await.animation_mode(),
            AnimationMode::Blinking(_)
        ));

        f.controller.set_breathing_enabled(true).await;
        assert!(matches!(
            f.controller.snapshot().await.animation_mode(),
            AnimationMode::Breathing(_)
        ));

        // Disabling the inactive mode leaves the active one alone
        f.controller.set_blinking_enabled(false).await;
        assert!(matches!(
            f.controller.snapshot().await.animation_mode(),
            AnimationMode::Breathing(_)
        ));
        f.controller.set_breathing_enabled(false).await;
        assert_eq!(
            f.controller.snapshot().await.animation_mode(),
            AnimationMode::Off
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_breathing_update_keeps_previous() {
        let f = fixture(enabled());
        let err = f
            .controller
            .update_breathing(|p| p.with_min_mv(2000))
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::InvalidParameter(_)));
        assert_eq!(f.controller.snapshot().await.breathing().min_mv, 2500);

        f.controller
            .update_breathing(|p| p.with_min_mv(2700))
            .await
            .unwrap();
        assert_eq!(f.controller.snapshot().await.breathing().min_mv, 2700);
    }

    #[tokio::test(start_paused = true)]
    async fn test_breathing_ramps_regulator() {
        let f = fixture(enabled());
        f.controller
            .set_animation_mode(AnimationMode::Breathing(BreathingParams {
                min_mv: 2500,
                max_mv: 2600,
                step_mv: 50,
                step_interval_ms: 20,
                pause_ms: 300,
            }))
            .await
            .unwrap();
        f.controller.enable_notification().await;
        f.sim.regulator.clear();

        // First tick at 10 ms, then every 20 ms
        tokio::time::sleep(ms(75)).await;
        assert_eq!(f.sim.regulator.history(), vec![2500, 2550, 2600, 2550]);

        f.controller.disable_notification().await;
        tokio::time::sleep(ms(500)).await;
        assert_eq!(f.sim.regulator.history().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_blinking_toggles_led() {
        let f = fixture(enabled());
        f.controller
            .set_animation_mode(AnimationMode::Blinking(BlinkingParams {
                on_ms: 100,
                off_ms: 200,
            }))
            .await
            .unwrap();
        f.controller.enable_notification().await;

        // Ticks at 10 (on), 110 (off), 310 (on)
        tokio::time::sleep(ms(320)).await;
        assert_eq!(
            f.sim.bus.led_commands(),
            vec![
                LedCommand::On,
                LedCommand::On,
                LedCommand::Off,
                LedCommand::On
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_mode_off_during_session_restores_steady_light() {
        let f = fixture(enabled());
        f.controller
            .set_animation_mode(AnimationMode::Blinking(BlinkingParams {
                on_ms: 50,
                off_ms: 50,
            }))
            .await
            .unwrap();
        f.controller.enable_notification().await;
        tokio::time::sleep(ms(70)).await;
        assert_eq!(f.sim.bus.led_commands().last(), Some(&LedCommand::Off));

        f.controller.set_animation_mode(AnimationMode::Off).await.unwrap();
        let before = f.sim.bus.led_commands().len();
        tokio::time::sleep(ms(500)).await;
        let commands = f.sim.bus.led_commands();
        assert_eq!(commands.len(), before);
        assert_eq!(commands.last(), Some(&LedCommand::On));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backlight_timeout_fades_out() {
        let f = fixture(NotificationDefaults {
            backlight_timeout: BacklightTimeout::After(ms(1000)),
            brightness_mv: 2700,
            ..Default::default()
        });
        f.controller.on_key_activity().await;
        assert_eq!(f.sim.bus.led_commands(), vec![LedCommand::On]);
        f.sim.regulator.clear();

        tokio::time::sleep(ms(1500)).await;
        assert_eq!(
            f.sim.regulator.history(),
            vec![2700, 2650, 2600, 2550, 2500]
        );
        assert_eq!(
            f.sim.bus.led_commands(),
            vec![LedCommand::On, LedCommand::Off]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_key_activity_interrupts_fade() {
        let f = fixture(NotificationDefaults {
            backlight_timeout: BacklightTimeout::After(ms(100)),
            brightness_mv: 2700,
            ..Default::default()
        });
        f.controller.on_key_activity().await;
        // Fade steps at 100 and 150 ms
        tokio::time::sleep(ms(160)).await;
        f.sim.regulator.clear();

        f.controller.on_key_activity().await;
        tokio::time::sleep(ms(60)).await;
        assert_eq!(f.sim.regulator.history(), vec![2700]);
        assert_eq!(
            f.sim.bus.led_commands(),
            vec![LedCommand::On, LedCommand::On]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_backlight_timeout_yields_to_notification() {
        let f = fixture(NotificationDefaults {
            backlight_timeout: BacklightTimeout::After(ms(100)),
            fade_out: false,
            ..enabled()
        });
        f.controller.on_key_activity().await;
        f.controller.enable_notification().await;
        tokio::time::sleep(ms(200)).await;

        assert_eq!(
            f.sim.bus.led_commands(),
            vec![LedCommand::On, LedCommand::On]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_key_activity_rearms_backlight() {
        let f = fixture(NotificationDefaults {
            backlight_timeout: BacklightTimeout::After(ms(100)),
            fade_out: false,
            ..Default::default()
        });
        f.controller.on_key_activity().await;
        tokio::time::sleep(ms(80)).await;
        f.controller.on_key_activity().await;
        tokio::time::sleep(ms(80)).await;
        assert_eq!(
            f.sim.bus.led_commands(),
            vec![LedCommand::On, LedCommand::On]
        );

        tokio::time::sleep(ms(30)).await;
        assert_eq!(f.sim.bus.led_commands().last(), Some(&LedCommand::Off));
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_off_backlight_ignores_keys() {
        let f = fixture(NotificationDefaults {
            backlight_timeout: BacklightTimeout::AlwaysOff,
            ..Default::default()
        });
        f.controller.on_key_activity().await;
        assert!(f.sim.bus.led_commands().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_backlight_timeout_switches_off_immediately() {
        let f = fixture(NotificationDefaults {
            fade_out: false,
            ..Default::default()
        });
        f.controller.on_key_activity().await;
        f.controller
            .set_backlight_timeout(BacklightTimeout::After(Duration::ZERO))
            .await;
        tokio::time::sleep(ms(1)).await;
        assert_eq!(
            f.sim.bus.led_commands(),
            vec![LedCommand::On, LedCommand::Off]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_led_write_flags_resync() {
        let f = fixture(enabled());
        f.sim
            .bus
            .fail_next_writes(3, touchkey_transport::BusError::Io("nack".into()));
        assert!(f.controller.enable_notification().await);

        let st = f.controller.snapshot().await;
        assert!(st.led_on);
        assert!(st.needs_led_resync());
        assert_eq!(st.last_led_command(), Some(LedCommand::On));
    }

    #[tokio::test(start_paused = true)]
    async fn test_brightness_validated_and_written_through() {
        let f = fixture(enabled());
        assert!(f.controller.set_brightness(2400).await.is_err());
        f.controller.set_brightness(3000).await.unwrap();
        assert_eq!(f.sim.regulator.history(), vec![3000]);
        assert_eq!(f.controller.snapshot().await.brightness_mv, 3000);
    }
}
