//! Register bus abstraction for capacitive touchkey controllers
//!
//! The controller sits on a two-wire bus and exposes one register. This
//! crate provides:
//!
//! - the raw [`Bus`] trait implemented by platform backends,
//! - [`BusChannel`], which adds the enable gate and bounded retries,
//! - frame types and per-variant layouts,
//! - [`mock::MockBus`], a scripted in-memory bus.
//!
//! ```text
//! [platform bus / MockBus]   ← implements Bus (raw transfers)
//!            |
//!       [BusChannel]         ← enable flag, retries, stats
//!            |
//!   [decoder / LED controller / diagnostics]
//! ```

pub mod channel;
pub mod error;
pub mod mock;
pub mod protocol;
pub mod types;

pub use channel::{BusChannel, BusStats, RetryPolicy};
pub use error::BusError;
pub use mock::{BusTransaction, MockBus};
pub use types::{
    read_field, FieldWidth, FrameLayout, HardwareVariant, KeyFrame, LedCommand,
    LedCommandEncoding, SensitivityKey,
};

use async_trait::async_trait;
use std::sync::Arc;

/// Raw register transfers
///
/// Implementations perform exactly one transfer per call; retrying is the
/// job of [`BusChannel`].
#[async_trait]
pub trait Bus: Send + Sync {
    /// Read `len` bytes starting at `register`
    async fn read(&self, register: u8, len: usize) -> Result<Vec<u8>, BusError>;

    /// Write `data` starting at `register`
    async fn write(&self, register: u8, data: &[u8]) -> Result<(), BusError>;
}

/// Type alias for a shared bus
pub type BoxedBus = Arc<dyn Bus>;
