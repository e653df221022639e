//! Device manager for discovering sensor beacons.
//!
//! This module ties the scan session, ingest pipeline and device registry
//! together behind one handle, and owns their teardown.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

use crate::ble::classifier::SensorKind;
use crate::ble::permission::PermissionCheck;
use crate::ble::scanner::{BtleplugScanner, PlatformScanner};
use crate::config::ScanConfig;
use crate::data::device::DeviceRecord;
use crate::error::Result;
use crate::ingest::IngestPipeline;
use crate::registry::{DeviceRegistry, DeviceSnapshot, DeviceSubscription};
use crate::session::{ScanSession, ScanState};

/// Callback handle for unregistering callbacks.
pub struct CallbackHandle {
    id: u64,
    unregister_fn: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl CallbackHandle {
    /// Create a new callback handle.
    pub(crate) fn new(id: u64, unregister_fn: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            id,
            unregister_fn: Some(Box::new(unregister_fn)),
        }
    }

    /// Unregister this callback.
    pub fn unregister(mut self) {
        if let Some(f) = self.unregister_fn.take() {
            f();
        }
    }

    /// Get the callback ID.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for CallbackHandle {
    fn drop(&mut self) {
        if let Some(f) = self.unregister_fn.take() {
            f();
        }
    }
}

/// Central manager for scanning and tracking sensor beacons.
pub struct DeviceManager {
    /// Latest record per device.
    registry: Arc<DeviceRegistry>,
    /// Scan lifecycle.
    session: ScanSession,
    /// Callback ID counter.
    callback_counter: AtomicU64,
}

impl DeviceManager {
    /// Create a DeviceManager on the first Bluetooth adapter with the
    /// default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if Bluetooth is not available.
    pub async fn new() -> Result<Self> {
        Self::with_config(ScanConfig::default()).await
    }

    /// Create a DeviceManager on the first Bluetooth adapter.
    ///
    /// # Errors
    ///
    /// Returns an error if Bluetooth is not available or the configuration
    /// is invalid.
    pub async fn with_config(config: ScanConfig) -> Result<Self> {
        let scanner = BtleplugScanner::new().await?;
        let permission = Arc::new(scanner.permission());
        Self::with_backend(Arc::new(scanner), permission, config)
    }

    /// Create a DeviceManager on a custom scanner and permission check.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn with_backend(
        scanner: Arc<dyn PlatformScanner>,
        permission: Arc<dyn PermissionCheck>,
        config: ScanConfig,
    ) -> Result<Self> {
        config.validate()?;

        let registry = Arc::new(DeviceRegistry::new(config.snapshot_capacity));
        let pipeline = IngestPipeline::new(registry.clone());
        let session = ScanSession::new(scanner, permission, pipeline, config);

        Ok(Self {
            registry,
            session,
            callback_counter: AtomicU64::new(0),
        })
    }

    /// Start scanning for sensors.
    ///
    /// Returns [`ScanState::Idle`] if access was not granted or the platform
    /// refused to scan.
    pub async fn start_scanning(&self) -> ScanState {
        self.session.start().await
    }

    /// Stop scanning for sensors.
    pub async fn stop_scanning(&self) {
        self.session.stop().await;
    }

    /// Remove every known device.
    pub fn clear(&self) {
        self.session.clear();
    }

    /// Clean shutdown: stop scanning, then forget every device.
    pub async fn shutdown(&self) {
        info!("Shutting down device manager");

        self.session.stop().await;
        self.registry.clear();
    }

    /// Observe the device list.
    ///
    /// The subscription yields the current list immediately and a fresh
    /// list after every change.
    pub fn observe_devices(&self) -> DeviceSubscription {
        self.registry.subscribe()
    }

    /// Register a callback invoked with the device list after every change.
    pub fn on_devices_changed<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(DeviceSnapshot) + Send + Sync + 'static,
    {
        let callback_id = self.callback_counter.fetch_add(1, Ordering::SeqCst);
        let mut subscription = self.registry.subscribe();

        let handle = tokio::spawn(async move {
            while let Some(devices) = subscription.recv().await {
                callback(devices);
            }
        });

        CallbackHandle::new(callback_id, move || {
            handle.abort();
        })
    }

    /// Get all known devices in first-seen order.
    pub fn devices(&self) -> DeviceSnapshot {
        self.registry.snapshot()
    }

    /// Get a specific device by address.
    pub fn device(&self, address: &str) -> Option<DeviceRecord> {
        self.registry.get(address)
    }

    /// Get devices of one sensor kind.
    pub fn devices_of_kind(&self, kind: SensorKind) -> Vec<DeviceRecord> {
        self.registry
            .snapshot()
            .iter()
            .filter(|d| d.sensor_kind == kind)
            .cloned()
            .collect()
    }

    /// Get the nearest device by signal strength.
    pub fn nearest_device(&self) -> Option<DeviceRecord> {
        self.registry
            .snapshot()
            .iter()
            .filter(|d| d.has_rssi())
            .max_by_key(|d| d.rssi)
            .cloned()
    }

    /// Get devices sorted by signal strength (strongest first).
    pub fn devices_by_signal(&self) -> Vec<DeviceRecord> {
        let mut devices = self.registry.snapshot().to_vec();
        devices.sort_by_key(|d| std::cmp::Reverse(d.rssi));
        devices
    }

    /// Get the number of known devices.
    pub fn device_count(&self) -> usize {
        self.registry.len()
    }

    /// Get the scan state.
    pub fn scan_state(&self) -> ScanState {
        self.session.state()
    }

    /// Check if scanning is active.
    pub fn is_scanning(&self) -> bool {
        self.session.is_scanning()
    }

    /// Subscribe to scan state changes.
    pub fn subscribe_scan_state(&self) -> watch::Receiver<ScanState> {
        self.session.subscribe_state()
    }

    /// Get the active configuration.
    pub fn config(&self) -> &ScanConfig {
        self.session.config()
    }
}

impl Drop for DeviceManager {
    fn drop(&mut self) {
        // Cannot await here; the session task stops the platform scan and
        // clears the registry on its own once signalled.
        self.session.teardown();
    }
}
