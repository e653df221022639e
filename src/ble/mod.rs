//! BLE communication module.
//!
//! This module provides the platform-facing side of the engine: raw
//! advertisement events, payload classification, and the scanner and
//! permission seams with their btleplug implementations.

pub mod advertising;
pub mod classifier;
pub mod permission;
pub mod scanner;

pub use advertising::RawAdvertisement;
pub use classifier::{classify, SensorKind};
pub use permission::{AdapterPermission, AlwaysGranted, PermissionCheck};
pub use scanner::{BtleplugScanner, PlatformScanner, ScanEvent, ScanEventStream};
