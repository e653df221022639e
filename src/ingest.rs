//! Advertisement ingest pipeline.
//!
//! Turns raw advertisements into device records: drop unidentifiable
//! events, extract the payload, classify, decode, and upsert. Nothing that
//! goes wrong with a single advertisement escapes this module; a payload
//! that cannot be decoded still produces a record, just without a reading.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::ble::advertising::{device_id, RawAdvertisement};
use crate::ble::classifier::classify;
use crate::data::device::DeviceRecord;
use crate::data::readings::decode;
use crate::registry::{DeviceRegistry, Upsert};
use crate::utils::hex_bytes;

/// Why an advertisement was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// The advertisement carried no peripheral address.
    MissingAddress,
    /// The advertisement carried no local name.
    MissingName,
}

/// What the pipeline did with an advertisement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// A new device was added to the registry.
    Inserted,
    /// An existing device record was replaced.
    Updated,
    /// The advertisement was discarded.
    Dropped(DropReason),
}

impl From<Upsert> for IngestOutcome {
    fn from(upsert: Upsert) -> Self {
        match upsert {
            Upsert::Inserted => Self::Inserted,
            Upsert::Updated => Self::Updated,
        }
    }
}

/// Pipeline writing decoded advertisements into a registry.
#[derive(Clone)]
pub struct IngestPipeline {
    registry: Arc<DeviceRegistry>,
}

impl IngestPipeline {
    /// Create a pipeline writing into `registry`.
    pub fn new(registry: Arc<DeviceRegistry>) -> Self {
        Self { registry }
    }

    /// Get the registry this pipeline writes into.
    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    /// Process one advertisement.
    pub fn ingest(&self, advertisement: RawAdvertisement) -> IngestOutcome {
        match Self::build_record(advertisement) {
            Ok(record) => self.registry.upsert(record).into(),
            Err(reason) => {
                trace!("Dropping advertisement: {:?}", reason);
                IngestOutcome::Dropped(reason)
            }
        }
    }

    /// Build the device record for an advertisement.
    fn build_record(advertisement: RawAdvertisement) -> Result<DeviceRecord, DropReason> {
        if advertisement.address.is_empty() {
            return Err(DropReason::MissingAddress);
        }
        if advertisement.name.is_empty() {
            return Err(DropReason::MissingName);
        }

        let payload = advertisement.payload();
        let sensor_kind = classify(payload);

        let reading = match payload {
            Some(bytes) if sensor_kind.is_known() => {
                trace!(
                    "{} {} payload: {}",
                    advertisement.address,
                    sensor_kind,
                    hex_bytes(bytes)
                );
                decode(sensor_kind, bytes)
                    .map_err(|e| debug!("{}: {}", advertisement.address, e))
                    .ok()
            }
            _ => None,
        };

        Ok(DeviceRecord {
            device_id: device_id(payload),
            sensor_kind,
            reading,
            rssi: advertisement.rssi.unwrap_or(DeviceRecord::UNKNOWN_RSSI),
            last_seen: Utc::now(),
            address: advertisement.address,
            name: advertisement.name,
        })
    }
}
