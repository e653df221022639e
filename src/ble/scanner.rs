//! BLE scanning functionality.
//!
//! [`PlatformScanner`] is the seam between the scan session and the
//! platform Bluetooth stack. [`BtleplugScanner`] implements it on top of
//! btleplug; tests drive the session with in-memory scanners instead.

use async_trait::async_trait;
use btleplug::api::{
    BDAddr, Central, CentralEvent, CentralState, Manager as _, Peripheral as _, ScanFilter,
};
use btleplug::platform::{Adapter, Manager, PeripheralId};
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use tracing::{debug, info, trace, warn};

use crate::ble::advertising::RawAdvertisement;
use crate::ble::permission::AdapterPermission;
use crate::config::ScanSettings;
use crate::error::{Error, Result};

/// Event delivered by a platform scanner while a scan is running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    /// An advertisement was received.
    Advertisement(RawAdvertisement),
    /// The platform aborted the scan, for example because the radio was
    /// switched off.
    Failed {
        /// Description of the failure.
        reason: String,
    },
}

/// Stream of events for one scan session.
///
/// The stream ends when the platform stops delivering events.
pub type ScanEventStream = BoxStream<'static, ScanEvent>;

/// Platform facility that discovers nearby advertisements.
#[async_trait]
pub trait PlatformScanner: Send + Sync {
    /// Start scanning and return the stream of events for this session.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform refuses to start the scan, for
    /// example because scanning is not authorized.
    async fn start(&self, settings: &ScanSettings) -> Result<ScanEventStream>;

    /// Stop scanning.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform fails to stop the scan.
    async fn stop(&self) -> Result<()>;
}

/// Platform scanner backed by a btleplug adapter.
pub struct BtleplugScanner {
    /// The BLE adapter to use for scanning.
    adapter: Adapter,
}

impl BtleplugScanner {
    /// Create a scanner on the first available Bluetooth adapter.
    ///
    /// # Errors
    ///
    /// Returns an error if Bluetooth is not available.
    pub async fn new() -> Result<Self> {
        let manager = Manager::new()
            .await
            .map_err(|_e| Error::BluetoothUnavailable)?;

        let adapters = manager.adapters().await.map_err(Error::Bluetooth)?;

        let adapter = adapters
            .into_iter()
            .next()
            .ok_or(Error::BluetoothUnavailable)?;

        info!(
            "Using Bluetooth adapter: {:?}",
            adapter.adapter_info().await.ok()
        );

        Ok(Self::with_adapter(adapter))
    }

    /// Create a scanner with a specific adapter.
    pub fn with_adapter(adapter: Adapter) -> Self {
        Self { adapter }
    }

    /// Get the underlying adapter.
    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    /// Permission check bound to the same adapter.
    pub fn permission(&self) -> AdapterPermission {
        AdapterPermission::new(self.adapter.clone())
    }

    /// Translate a central event into a scan event.
    async fn translate(adapter: &Adapter, event: CentralEvent) -> Option<ScanEvent> {
        match event {
            CentralEvent::DeviceDiscovered(id)
            | CentralEvent::DeviceUpdated(id)
            | CentralEvent::ManufacturerDataAdvertisement { id, .. }
            | CentralEvent::ServiceDataAdvertisement { id, .. } => {
                Self::read_advertisement(adapter, &id)
                    .await
                    .map(ScanEvent::Advertisement)
            }
            CentralEvent::StateUpdate(CentralState::PoweredOff) => {
                warn!("Bluetooth adapter powered off during scan");
                Some(ScanEvent::Failed {
                    reason: "Bluetooth adapter powered off".to_string(),
                })
            }
            other => {
                trace!("Ignoring central event: {:?}", other);
                None
            }
        }
    }

    /// Read the current advertisement of a peripheral.
    async fn read_advertisement(adapter: &Adapter, id: &PeripheralId) -> Option<RawAdvertisement> {
        let peripheral = match adapter.peripheral(id).await {
            Ok(p) => p,
            Err(e) => {
                trace!("Failed to get peripheral: {}", e);
                return None;
            }
        };

        let properties = match peripheral.properties().await {
            Ok(Some(p)) => p,
            _ => return None,
        };

        // btleplug reports manufacturer data as a map; order by company id
        // so the "first" entry is stable across events.
        let mut manufacturer_data: Vec<(u16, Bytes)> = properties
            .manufacturer_data
            .into_iter()
            .map(|(company_id, data)| (company_id, Bytes::from(data)))
            .collect();
        manufacturer_data.sort_by_key(|(company_id, _)| *company_id);

        // btleplug does not expose the raw advertising PDU; service data is
        // the closest unparsed block it keeps.
        let mut service_data: Vec<_> = properties.service_data.into_iter().collect();
        service_data.sort_by_key(|(uuid, _)| *uuid);
        let raw_data = service_data
            .into_iter()
            .map(|(_, data)| data)
            .find(|data| !data.is_empty())
            .map(Bytes::from);

        // macOS hides the MAC address; the peripheral id is stable instead.
        let address = if properties.address == BDAddr::default() {
            format!("{:?}", id)
        } else {
            properties.address.to_string()
        };

        Some(RawAdvertisement {
            address,
            name: properties.local_name.unwrap_or_default(),
            rssi: properties.rssi,
            manufacturer_data,
            raw_data,
        })
    }
}

/// Map a btleplug failure to start scanning.
fn scan_error(error: btleplug::Error) -> Error {
    match error {
        btleplug::Error::PermissionDenied => Error::PermissionDenied,
        other => Error::ScanFailed {
            reason: other.to_string(),
        },
    }
}

#[async_trait]
impl PlatformScanner for BtleplugScanner {
    async fn start(&self, settings: &ScanSettings) -> Result<ScanEventStream> {
        info!("Starting BLE scan");

        let events = self.adapter.events().await.map_err(Error::Bluetooth)?;

        let filter = ScanFilter {
            services: settings.services.clone(),
        };
        // btleplug has no duty-cycle control; the mode is advisory.
        debug!("Scan filter: {:?}, mode: {:?}", filter, settings.mode);

        self.adapter
            .start_scan(filter)
            .await
            .map_err(scan_error)?;

        let adapter = self.adapter.clone();
        let stream = events
            .filter_map(move |event| {
                let adapter = adapter.clone();
                async move { Self::translate(&adapter, event).await }
            })
            .boxed();

        Ok(stream)
    }

    async fn stop(&self) -> Result<()> {
        info!("Stopping BLE scan");
        self.adapter.stop_scan().await.map_err(Error::Bluetooth)
    }
}
