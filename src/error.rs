//! Error types for the sensor-scan-ble crate.

use thiserror::Error;

use crate::ble::classifier::SensorKind;

/// The main error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Bluetooth-related error from the underlying BLE library.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Bluetooth is not available or is disabled on this system.
    #[error("Bluetooth not available or disabled")]
    BluetoothUnavailable,

    /// The application lacks the permissions required to scan.
    #[error("Bluetooth scan permission denied")]
    PermissionDenied,

    /// The platform scanner refused to start or failed mid-scan.
    #[error("Scan failed: {reason}")]
    ScanFailed {
        /// Description of why the scan failed.
        reason: String,
    },

    /// The payload is too short for the sensor layout it was routed to.
    #[error("Cannot decode {kind} payload: {len} bytes (need at least {required})")]
    DecodeFailure {
        /// The sensor kind the payload was decoded as.
        kind: SensorKind,
        /// Length of the payload that was received.
        len: usize,
        /// Minimum length required by the sensor layout.
        required: usize,
    },

    /// Invalid data was received in an advertisement.
    #[error("Invalid data received: {context}")]
    InvalidData {
        /// Description of what was invalid about the data.
        context: String,
    },

    /// An invalid parameter was provided.
    #[error("Invalid parameter: {name} = {value}")]
    InvalidParameter {
        /// The name of the parameter.
        name: String,
        /// The invalid value that was provided.
        value: String,
    },
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
