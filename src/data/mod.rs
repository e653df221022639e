//! Data structures for sensor data.
//!
//! This module contains the decoded sensor readings and the device records
//! the registry keeps for each peripheral.

pub mod device;
pub mod readings;

pub use device::{DeviceRecord, UNKNOWN_DEVICE_ID};
pub use readings::{decode, SensorReading, LUX_SCALE};
