//! Sensor classification from advertisement payloads.
//!
//! The sensor beacons do not carry a type tag, so the layout is inferred
//! from the payload length alone. Thresholds are checked from the longest
//! layout down, which resolves the overlapping minimum lengths: an
//! 11-byte payload is always a soil sensor, even if a shorter layout
//! would also fit.

/// Sensor type inferred from an advertisement payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SensorKind {
    /// SHT40 temperature and humidity sensor.
    Sht40,
    /// Triaxial accelerometer.
    Accelerometer,
    /// NPK soil probe with moisture, temperature, conductivity and pH.
    SoilSensor,
    /// Wheel speed and distance sensor.
    SpeedDistance,
    /// Ambient light sensor.
    Lux,
    /// Payload did not match any known layout.
    #[default]
    Unknown,
}

impl SensorKind {
    /// All kinds that carry a decodable layout, longest first.
    pub const DECODABLE: [SensorKind; 5] = [
        Self::SoilSensor,
        Self::Accelerometer,
        Self::SpeedDistance,
        Self::Sht40,
        Self::Lux,
    ];

    /// Minimum payload length the classifier requires for this kind.
    ///
    /// `Unknown` has no layout and reports 0.
    pub fn classification_threshold(&self) -> usize {
        match self {
            Self::SoilSensor => 11,
            Self::Accelerometer => 7,
            Self::SpeedDistance => 6,
            Self::Sht40 => 5,
            Self::Lux => 3,
            Self::Unknown => 0,
        }
    }

    /// Check if a reading can be decoded for this kind.
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }

    /// Get the display name of the sensor kind.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sht40 => "SHT40",
            Self::Accelerometer => "Accelerometer",
            Self::SoilSensor => "Soil Sensor",
            Self::SpeedDistance => "Speed/Distance",
            Self::Lux => "Lux",
            Self::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for SensorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Classify a payload by its length.
///
/// Absent and empty payloads classify as [`SensorKind::Unknown`].
///
/// # Example
///
/// ```
/// use sensor_scan_ble::{classify, SensorKind};
///
/// assert_eq!(classify(Some(&[5, 22, 5, 67, 3][..])), SensorKind::Sht40);
/// assert_eq!(classify(None), SensorKind::Unknown);
/// ```
pub fn classify(payload: Option<&[u8]>) -> SensorKind {
    let len = payload.map_or(0, <[u8]>::len);

    SensorKind::DECODABLE
        .into_iter()
        .find(|kind| len >= kind.classification_threshold())
        .unwrap_or(SensorKind::Unknown)
}
