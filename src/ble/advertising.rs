//! Raw advertisement events and payload extraction.
//!
//! An advertisement can carry several manufacturer-specific entries and,
//! depending on the platform, a raw data block. The sensor payload is the
//! first non-empty manufacturer entry, falling back to the raw block.

use bytes::Bytes;

use crate::data::device::UNKNOWN_DEVICE_ID;

/// A single advertisement as delivered by the platform scanner.
///
/// Events are ephemeral: the ingest pipeline consumes them and keeps only
/// the derived [`DeviceRecord`](crate::DeviceRecord).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawAdvertisement {
    /// Peripheral identifier.
    pub address: String,
    /// Advertised local name (empty if none was advertised).
    pub name: String,
    /// Signal strength in dBm.
    pub rssi: Option<i16>,
    /// Manufacturer-specific entries as `(company id, data)`, in the order
    /// the platform reported them.
    pub manufacturer_data: Vec<(u16, Bytes)>,
    /// Raw advertisement block used when no manufacturer data is present.
    pub raw_data: Option<Bytes>,
}

impl RawAdvertisement {
    /// Create an advertisement with no payload.
    pub fn new(address: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    /// Set the signal strength.
    pub fn with_rssi(mut self, rssi: i16) -> Self {
        self.rssi = Some(rssi);
        self
    }

    /// Append a manufacturer-specific entry.
    pub fn with_manufacturer_data(mut self, company_id: u16, data: impl Into<Bytes>) -> Self {
        self.manufacturer_data.push((company_id, data.into()));
        self
    }

    /// Set the raw advertisement block.
    pub fn with_raw_data(mut self, data: impl Into<Bytes>) -> Self {
        self.raw_data = Some(data.into());
        self
    }

    /// Check that both the address and the name are present.
    pub fn is_identifiable(&self) -> bool {
        !self.address.is_empty() && !self.name.is_empty()
    }

    /// Extract the sensor payload.
    ///
    /// Only the first manufacturer entry is considered. If it is missing or
    /// empty the raw block is used, and if that is missing or empty too the
    /// advertisement has no payload.
    pub fn payload(&self) -> Option<&[u8]> {
        self.manufacturer_data
            .first()
            .map(|(_, data)| &data[..])
            .filter(|data| !data.is_empty())
            .or_else(|| self.raw_data.as_deref().filter(|data| !data.is_empty()))
    }
}

/// Derive the device sub-id from byte 0 of a payload.
pub fn device_id(payload: Option<&[u8]>) -> String {
    match payload.and_then(|p| p.first()) {
        Some(id) => id.to_string(),
        None => UNKNOWN_DEVICE_ID.to_string(),
    }
}
