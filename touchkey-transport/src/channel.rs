//! Enable-gated register channel with bounded retries
//!
//! `BusChannel` wraps a raw [`Bus`] and adds the two things every caller
//! needs: a fast `NotReady` failure while the device is powered down, and
//! a fixed number of attempts with a fixed delay for transient errors.
//! There is no backoff; callers run right behind the interrupt line and
//! need bounded latency.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::error::BusError;
use crate::protocol::{timing, KEYCODE_REG};
use crate::Bus;

/// Attempt count and inter-attempt delay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: timing::BUS_ATTEMPTS,
            delay: Duration::from_millis(timing::BUS_RETRY_DELAY_MS),
        }
    }
}

/// Transfer counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusStats {
    /// Calls that reached the bus
    pub transfers: u64,
    /// Failed attempts that were followed by another attempt
    pub retries: u64,
    /// Calls that returned an error after reaching the bus
    pub failures: u64,
}

// ============================================================================
// BusChannel
// ============================================================================

pub struct BusChannel {
    inner: Arc<dyn Bus>,
    enabled: AtomicBool,
    policy: RetryPolicy,
    transfers: AtomicU64,
    retries: AtomicU64,
    failures: AtomicU64,
}

impl BusChannel {
    /// Create a disabled channel with the default retry policy
    pub fn new(inner: Arc<dyn Bus>) -> Self {
        Self::with_policy(inner, RetryPolicy::default())
    }

    pub fn with_policy(inner: Arc<dyn Bus>, policy: RetryPolicy) -> Self {
        Self {
            inner,
            enabled: AtomicBool::new(false),
            policy,
            transfers: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::SeqCst);
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn stats(&self) -> BusStats {
        BusStats {
            transfers: self.transfers.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }

    /// Read exactly `len` bytes from `register`
    pub async fn read(&self, register: u8, len: usize) -> Result<Vec<u8>, BusError> {
        let inner = &self.inner;
        self.with_retries("read", register, || async move {
            let data = inner.read(register, len).await?;
            if data.len() < len {
                return Err(BusError::ShortFrame {
                    expected: len,
                    actual: data.len(),
                });
            }
            Ok(data)
        })
        .await
    }

    pub async fn write(&self, register: u8, data: &[u8]) -> Result<(), BusError> {
        let inner = &self.inner;
        self.with_retries("write", register, || async move {
            inner.write(register, data).await
        })
        .await
    }

    /// Read a frame from the key register
    pub async fn read_frame(&self, len: usize) -> Result<Vec<u8>, BusError> {
        self.read(KEYCODE_REG, len).await
    }

    /// Write a single command byte to the key register
    pub async fn write_command(&self, command: u8) -> Result<(), BusError> {
        self.write(KEYCODE_REG, &[command]).await
    }

    async fn with_retries<T, F, Fut>(
        &self,
        op: &'static str,
        register: u8,
        mut attempt_fn: F,
    ) -> Result<T, BusError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BusError>>,
    {
        if !self.is_enabled() {
            return Err(BusError::NotReady);
        }
        self.transfers.fetch_add(1, Ordering::Relaxed);

        let attempts = self.policy.attempts.max(1);
        let mut attempt = 1;
        loop {
            match attempt_fn().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < attempts => {
                    debug!(
                        "Bus {} 0x{:02X} failed (attempt {}/{}): {}",
                        op, register, attempt, attempts, e
                    );
                    self.retries.fetch_add(1, Ordering::Relaxed);
                    tokio::time::sleep(self.policy.delay).await;
                    // Suspend may have disabled us while we slept
                    if !self.is_enabled() {
                        self.failures.fetch_add(1, Ordering::Relaxed);
                        return Err(BusError::NotReady);
                    }
                    attempt += 1;
                }
                Err(e) => {
                    debug!(
                        "Bus {} 0x{:02X} giving up after {} attempt(s): {}",
                        op, register, attempt, e
                    );
                    self.failures.fetch_add(1, Ordering::Relaxed);
                    return Err(e);
                }
            }
        }
    }
}
