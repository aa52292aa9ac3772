//! Driver error types

use thiserror::Error;
use touchkey_transport::BusError;

/// Errors from driver operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// Bus layer error
    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    /// Invalid parameter value
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Feature not supported by this board
    #[error("Feature not supported: {0}")]
    NotSupported(String),

    /// Device returned a value outside its valid range
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Firmware update failed after {attempts} attempt(s)")]
    FirmwareUpdateFailed { attempts: u32 },

    #[error("Firmware update already in progress")]
    UpdateInProgress,

    /// Device did not answer at attach
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Voltage regulator rejected a request
    #[error("Regulator error: {0}")]
    Regulator(String),

    #[error("Unknown attribute: {0}")]
    UnknownAttribute(String),

    #[error("Attribute is read-only: {0}")]
    ReadOnly(&'static str),

    #[error("Attribute is write-only: {0}")]
    WriteOnly(&'static str),
}
