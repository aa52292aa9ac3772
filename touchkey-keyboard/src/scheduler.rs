//! Cancelable, re-armable one-shot timers
//!
//! Each [`TimerKind`] owns one slot. Arming a slot replaces whatever was
//! pending there; cancelling is idempotent. Every arm hands out a
//! [`TimerTicket`]; a callback must check [`TimerScheduler::is_current`]
//! under the controller lock before acting, which turns a callback that
//! lost a race with cancel/re-arm into a no-op.
//!
//! Expiry never runs the callback on the sleeping task itself: the sleeper
//! spawns the callback as a fresh task, so a callback may re-arm or cancel
//! its own slot without aborting itself.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Key backlight timeout
    Backlight,
    /// Notification session timeout
    Notification,
    /// Breathing/blinking tick
    Animation,
}

impl TimerKind {
    pub const ALL: [TimerKind; 3] = [
        TimerKind::Backlight,
        TimerKind::Notification,
        TimerKind::Animation,
    ];

    fn slot(&self) -> usize {
        match self {
            TimerKind::Backlight => 0,
            TimerKind::Notification => 1,
            TimerKind::Animation => 2,
        }
    }
}

/// Identifies one arming of a timer slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerTicket {
    pub kind: TimerKind,
    generation: u64,
}

struct TimerSlot {
    generation: AtomicU64,
    sleeper: Mutex<Option<JoinHandle<()>>>,
}

impl TimerSlot {
    fn new() -> Self {
        Self {
            generation: AtomicU64::new(0),
            sleeper: Mutex::new(None),
        }
    }
}

pub struct TimerScheduler {
    slots: [TimerSlot; 3],
}

impl Default for TimerScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerScheduler {
    pub fn new() -> Self {
        Self {
            slots: [TimerSlot::new(), TimerSlot::new(), TimerSlot::new()],
        }
    }

    /// Run `callback` after `delay`, replacing any pending timer of `kind`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn arm<F, Fut>(&self, kind: TimerKind, delay: Duration, callback: F) -> TimerTicket
    where
        F: FnOnce(TimerTicket) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let slot = &self.slots[kind.slot()];
        let mut sleeper = slot.sleeper.lock();
        let generation = slot.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let ticket = TimerTicket { kind, generation };

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            tokio::spawn(callback(ticket));
        });
        if let Some(previous) = sleeper.replace(handle) {
            previous.abort();
        }
        debug!("Armed {:?} timer for {:?} (gen {})", kind, delay, generation);
        ticket
    }

    /// Cancel the pending timer of `kind`, if any
    pub fn cancel(&self, kind: TimerKind) {
        let slot = &self.slots[kind.slot()];
        let mut sleeper = slot.sleeper.lock();
        slot.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(handle) = sleeper.take() {
            handle.abort();
        }
    }

    pub fn cancel_all(&self) {
        for kind in TimerKind::ALL {
            self.cancel(kind);
        }
    }

    /// Whether `ticket` is still the latest arming of its slot
    pub fn is_current(&self, ticket: TimerTicket) -> bool {
        self.slots[ticket.kind.slot()]
            .generation
            .load(Ordering::SeqCst)
            == ticket.generation
    }

    /// Whether a timer of `kind` is armed and has not expired yet
    pub fn is_pending(&self, kind: TimerKind) -> bool {
        self.slots[kind.slot()]
            .sleeper
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for TimerScheduler {
    fn drop(&mut self) {
        for slot in &self.slots {
            if let Some(handle) = slot.sleeper.lock().take() {
                handle.abort();
            }
        }
    }
}
