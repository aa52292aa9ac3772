//! Bus error types

use thiserror::Error;

/// Errors that can occur during bus operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    /// Channel is disabled (device powered down or suspended)
    #[error("Bus channel not ready")]
    NotReady,

    /// Transfer failed on the wire (NACK, arbitration loss, ...)
    #[error("Bus I/O error: {0}")]
    Io(String),

    #[error("Bus transfer timeout")]
    Timeout,

    /// Fewer bytes came back than were requested
    #[error("Short frame: expected {expected} bytes, got {actual}")]
    ShortFrame { expected: usize, actual: usize },

    /// Frame arrived intact but its contents are out of range
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Device not found: {0}")]
    DeviceNotFound(String),
}

impl BusError {
    /// Whether retrying the same transfer can succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BusError::Io(_) | BusError::Timeout | BusError::ShortFrame { .. }
        )
    }
}
