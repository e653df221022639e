//! Device records kept by the registry.

use chrono::{DateTime, Utc};

use crate::ble::classifier::SensorKind;
use crate::data::readings::SensorReading;

/// Sub-id reported for devices that advertise no payload.
pub const UNKNOWN_DEVICE_ID: &str = "Unknown ID";

/// Last observed state of one peripheral.
///
/// Records are replaced wholesale on every accepted advertisement, so a
/// reader holding a record never sees fields from two different
/// advertisements.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceRecord {
    /// Stable peripheral identifier, unique within the registry.
    pub address: String,
    /// Advertised local name.
    pub name: String,
    /// Signal strength in dBm.
    pub rssi: i16,
    /// Device sub-id taken from byte 0 of the payload.
    pub device_id: String,
    /// Sensor type inferred from the payload.
    pub sensor_kind: SensorKind,
    /// Decoded reading, absent if the payload could not be decoded.
    pub reading: Option<SensorReading>,
    /// When the advertisement was received.
    pub last_seen: DateTime<Utc>,
}

impl DeviceRecord {
    /// Signal strength recorded when the platform omits it.
    pub const UNKNOWN_RSSI: i16 = i16::MIN;

    /// Check if the platform reported a signal strength for this device.
    pub fn has_rssi(&self) -> bool {
        self.rssi != Self::UNKNOWN_RSSI
    }

    /// Check if a reading was decoded for this device.
    pub fn has_reading(&self) -> bool {
        self.reading.is_some()
    }

    /// Time elapsed since the device was last seen.
    pub fn age(&self) -> chrono::Duration {
        Utc::now().signed_duration_since(self.last_seen)
    }
}

impl std::fmt::Display for DeviceRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}] id={} {}",
            self.name, self.address, self.device_id, self.sensor_kind
        )?;
        if self.has_rssi() {
            write!(f, " {} dBm", self.rssi)?;
        }
        match &self.reading {
            Some(reading) => write!(f, ": {}", reading),
            None => write!(f, ": no reading"),
        }
    }
}
