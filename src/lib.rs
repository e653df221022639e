// Allow derivable impls for clarity
#![allow(clippy::derivable_impls)]

//! # sensor-scan-ble
//!
//! A cross-platform Rust library that scans for Bluetooth Low Energy
//! sensor beacons and decodes their advertisements.
//!
//! Beacons advertise their measurements in manufacturer-specific data.
//! The library classifies each payload by length, decodes it into a typed
//! reading, and keeps the latest record per device in a registry that any
//! number of consumers can observe.
//!
//! ## Features
//!
//! - **Sensor Discovery**: Scan for nearby beacons with an automatic timeout
//! - **Payload Decoding**: SHT40, accelerometer, soil, lux and speed/distance layouts
//! - **Device Registry**: One record per address, in first-seen order
//! - **Live Updates**: Every subscriber receives the full device list on each change
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sensor_scan_ble::{DeviceManager, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let manager = DeviceManager::new().await?;
//!     manager.start_scanning().await;
//!
//!     let mut devices = manager.observe_devices();
//!     while let Some(snapshot) = devices.recv().await {
//!         for device in snapshot.iter() {
//!             println!("{}", device);
//!         }
//!         if !manager.is_scanning() {
//!             break;
//!         }
//!     }
//!
//!     manager.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Platform Notes
//!
//! ### macOS
//! Requires Bluetooth permission. Add `NSBluetoothAlwaysUsageDescription`
//! to your Info.plist for bundled apps.
//!
//! ### Linux
//! Requires BlueZ. User may need to be in the `bluetooth` group.
//!
//! ### Windows
//! Requires Windows 10 or later with Bluetooth LE support.
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization/deserialization for data types

// Public modules
pub mod ble;
pub mod config;
pub mod data;
pub mod device_manager;
pub mod error;
pub mod ingest;
pub mod registry;
pub mod session;
pub mod utils;

// Re-exports for convenience
pub use config::{ScanConfig, ScanMode, ScanSettings, DEFAULT_SCAN_TIMEOUT};
pub use device_manager::{CallbackHandle, DeviceManager};
pub use error::{Error, Result};
pub use ingest::{DropReason, IngestOutcome, IngestPipeline};
pub use registry::{DeviceRegistry, DeviceSnapshot, DeviceSubscription};
pub use session::{ScanSession, ScanState};
pub use utils::celsius_to_fahrenheit;

// Re-export commonly used types from submodules
pub use ble::{
    classify, AdapterPermission, AlwaysGranted, BtleplugScanner, PermissionCheck,
    PlatformScanner, RawAdvertisement, ScanEvent, ScanEventStream, SensorKind,
};
pub use data::{decode, DeviceRecord, SensorReading};
