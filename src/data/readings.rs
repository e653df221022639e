//! Sensor readings decoded from advertisement payloads.
//!
//! Every sensor encodes its physical quantities as byte pairs: the first
//! byte is the integer part and the second byte is the fractional part,
//! written as base-10 digits. The pair `(22, 5)` therefore means `22.5`,
//! and `(22, 50)` means `22.50`. Byte 0 of every payload is the device
//! sub-id and never contributes to a quantity.
//!
//! | Kind            | Layout (byte offsets)                                  |
//! |-----------------|--------------------------------------------------------|
//! | SHT40           | 1-2 temperature, 3-4 humidity                          |
//! | Accelerometer   | 1-2 x, 3-4 y, 5-6 z                                    |
//! | Soil sensor     | 1 N, 2 P, 3 K, 4 moisture (raw), 5-6 temp, 7-8 EC, 9-10 pH |
//! | Lux             | 1-2 value, scaled by [`LUX_SCALE`]                     |
//! | Speed/distance  | 1-2 speed, 3-4 distance                                |

use crate::ble::classifier::SensorKind;
use crate::error::{Error, Result};
use crate::utils::celsius_to_fahrenheit;

/// Fixed factor applied to the raw lux pair to obtain illuminance.
pub const LUX_SCALE: f64 = 60.0;

/// A decoded sensor reading.
///
/// Readings are immutable once built; a newer advertisement produces a
/// new reading rather than mutating the old one.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SensorReading {
    /// SHT40 temperature (°C) and relative humidity (%).
    Sht40 {
        /// Temperature in degrees Celsius.
        temperature: f64,
        /// Relative humidity in percent.
        humidity: f64,
    },
    /// Acceleration on three axes.
    Accelerometer {
        /// X axis.
        x: f64,
        /// Y axis.
        y: f64,
        /// Z axis.
        z: f64,
    },
    /// Soil profile from an NPK probe.
    Soil {
        /// Nitrogen concentration.
        nitrogen: u8,
        /// Phosphorus concentration.
        phosphorus: u8,
        /// Potassium concentration.
        potassium: u8,
        /// Moisture in percent.
        moisture: u8,
        /// Soil temperature in degrees Celsius.
        temperature: f64,
        /// Electrical conductivity.
        conductivity: f64,
        /// Soil pH.
        ph: f64,
    },
    /// Ambient illuminance.
    Lux {
        /// Illuminance in lux.
        illuminance: f64,
    },
    /// Speed and travelled distance.
    SpeedDistance {
        /// Current speed.
        speed: f64,
        /// Distance travelled.
        distance: f64,
    },
}

impl SensorReading {
    /// Get the sensor kind this reading belongs to.
    pub fn kind(&self) -> SensorKind {
        match self {
            Self::Sht40 { .. } => SensorKind::Sht40,
            Self::Accelerometer { .. } => SensorKind::Accelerometer,
            Self::Soil { .. } => SensorKind::SoilSensor,
            Self::Lux { .. } => SensorKind::Lux,
            Self::SpeedDistance { .. } => SensorKind::SpeedDistance,
        }
    }

    /// Get the temperature in Fahrenheit for readings that carry one.
    pub fn temperature_fahrenheit(&self) -> Option<f64> {
        match self {
            Self::Sht40 { temperature, .. } | Self::Soil { temperature, .. } => {
                Some(celsius_to_fahrenheit(*temperature))
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for SensorReading {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sht40 {
                temperature,
                humidity,
            } => write!(f, "{}°C, {}% RH", temperature, humidity),
            Self::Accelerometer { x, y, z } => write!(f, "x={} y={} z={}", x, y, z),
            Self::Soil {
                nitrogen,
                phosphorus,
                potassium,
                moisture,
                temperature,
                conductivity,
                ph,
            } => write!(
                f,
                "N={} P={} K={} moisture={}% {}°C EC={} pH={}",
                nitrogen, phosphorus, potassium, moisture, temperature, conductivity, ph
            ),
            Self::Lux { illuminance } => write!(f, "{} lx", illuminance),
            Self::SpeedDistance { speed, distance } => {
                write!(f, "speed={} distance={}", speed, distance)
            }
        }
    }
}

/// Minimum payload length the decoder needs for a kind.
///
/// This is checked again at decode time because payloads may reach the
/// decoder without having been classified.
pub fn required_len(kind: SensorKind) -> Option<usize> {
    match kind {
        SensorKind::Sht40 => Some(5),
        SensorKind::Accelerometer => Some(7),
        SensorKind::SoilSensor => Some(11),
        SensorKind::Lux => Some(3),
        SensorKind::SpeedDistance => Some(5),
        SensorKind::Unknown => None,
    }
}

/// Decode a payload according to the layout of `kind`.
///
/// # Errors
///
/// Returns [`Error::DecodeFailure`] if the payload is shorter than the
/// layout requires (or the kind is `Unknown`), and [`Error::InvalidData`]
/// if a byte pair does not form a valid decimal.
///
/// # Example
///
/// ```
/// use sensor_scan_ble::{decode, SensorKind, SensorReading};
///
/// let reading = decode(SensorKind::Sht40, &[5, 22, 5, 67, 3]).unwrap();
/// assert_eq!(
///     reading,
///     SensorReading::Sht40 { temperature: 22.5, humidity: 67.3 }
/// );
/// ```
pub fn decode(kind: SensorKind, payload: &[u8]) -> Result<SensorReading> {
    let failure = |required| Error::DecodeFailure {
        kind,
        len: payload.len(),
        required,
    };

    let Some(required) = required_len(kind) else {
        return Err(failure(0));
    };
    if payload.len() < required {
        return Err(failure(required));
    }

    let reading = match kind {
        SensorKind::Sht40 => SensorReading::Sht40 {
            temperature: pair_at(payload, 1)?,
            humidity: pair_at(payload, 3)?,
        },
        SensorKind::Accelerometer => SensorReading::Accelerometer {
            x: pair_at(payload, 1)?,
            y: pair_at(payload, 3)?,
            z: pair_at(payload, 5)?,
        },
        SensorKind::SoilSensor => SensorReading::Soil {
            nitrogen: payload[1],
            phosphorus: payload[2],
            potassium: payload[3],
            moisture: payload[4],
            temperature: pair_at(payload, 5)?,
            conductivity: pair_at(payload, 7)?,
            ph: pair_at(payload, 9)?,
        },
        SensorKind::Lux => SensorReading::Lux {
            illuminance: pair_at(payload, 1)? * LUX_SCALE,
        },
        SensorKind::SpeedDistance => SensorReading::SpeedDistance {
            speed: pair_at(payload, 1)?,
            distance: pair_at(payload, 3)?,
        },
        SensorKind::Unknown => return Err(failure(0)),
    };

    Ok(reading)
}

/// Decode a single `(integer, fraction)` byte pair.
///
/// # Example
///
/// ```
/// use sensor_scan_ble::data::readings::decode_pair;
///
/// assert_eq!(decode_pair(22, 5).unwrap(), 22.5);
/// assert_eq!(decode_pair(0, 75).unwrap(), 0.75);
/// ```
pub fn decode_pair(integer: u8, fraction: u8) -> Result<f64> {
    let text = format!("{}.{}", integer, fraction);
    text.parse::<f64>().map_err(|e| Error::InvalidData {
        context: format!("byte pair ({}, {}) is not a decimal: {}", integer, fraction, e),
    })
}

fn pair_at(payload: &[u8], offset: usize) -> Result<f64> {
    match payload.get(offset..offset + 2) {
        Some(&[integer, fraction]) => decode_pair(integer, fraction),
        _ => Err(Error::InvalidData {
            context: format!(
                "byte pair at offset {} out of range for {} byte payload",
                offset,
                payload.len()
            ),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_decode_pair() {
        assert_eq!(decode_pair(22, 5).unwrap(), 22.5);
        assert_eq!(decode_pair(67, 3).unwrap(), 67.3);
        assert_eq!(decode_pair(22, 50).unwrap(), 22.5);
        assert_eq!(decode_pair(0, 0).unwrap(), 0.0);
        assert_eq!(decode_pair(255, 255).unwrap(), 255.255);
    }

    #[test]
    fn test_decode_pair_is_decimal_not_binary() {
        // 0x80 as a binary fraction would be 0.5
        assert_eq!(decode_pair(1, 128).unwrap(), 1.128);
    }

    #[test]
    fn test_decode_sht40() {
        let reading = decode(SensorKind::Sht40, &[5, 22, 5, 67, 3]).unwrap();
        assert_eq!(
            reading,
            SensorReading::Sht40 {
                temperature: 22.5,
                humidity: 67.3,
            }
        );
        assert_eq!(reading.to_string(), "22.5°C, 67.3% RH");
    }

    #[test]
    fn test_decode_accelerometer() {
        let reading = decode(SensorKind::Accelerometer, &[2, 0, 12, 1, 5, 9, 81]).unwrap();
        assert_eq!(
            reading,
            SensorReading::Accelerometer {
                x: 0.12,
                y: 1.5,
                z: 9.81,
            }
        );
    }

    #[test]
    fn test_decode_soil() {
        let payload = [7, 40, 25, 60, 35, 21, 4, 1, 2, 6, 5];
        let reading = decode(SensorKind::SoilSensor, &payload).unwrap();
        assert_eq!(
            reading,
            SensorReading::Soil {
                nitrogen: 40,
                phosphorus: 25,
                potassium: 60,
                moisture: 35,
                temperature: 21.4,
                conductivity: 1.2,
                ph: 6.5,
            }
        );
    }

    #[test]
    fn test_decode_lux_applies_scale() {
        let reading = decode(SensorKind::Lux, &[1, 10, 5]).unwrap();
        match reading {
            SensorReading::Lux { illuminance } => assert!((illuminance - 630.0).abs() < 1e-9),
            other => panic!("unexpected reading: {:?}", other),
        }
    }

    #[test]
    fn test_decode_speed_distance() {
        let reading = decode(SensorKind::SpeedDistance, &[3, 12, 4, 150, 25, 0]).unwrap();
        assert_eq!(
            reading,
            SensorReading::SpeedDistance {
                speed: 12.4,
                distance: 150.25,
            }
        );
    }

    #[test]
    fn test_decode_too_short() {
        for kind in SensorKind::DECODABLE {
            let required = required_len(kind).unwrap();
            let payload = vec![1u8; required - 1];
            match decode(kind, &payload) {
                Err(Error::DecodeFailure {
                    kind: k,
                    len,
                    required: r,
                }) => {
                    assert_eq!(k, kind);
                    assert_eq!(len, required - 1);
                    assert_eq!(r, required);
                }
                other => panic!("{}: expected decode failure, got {:?}", kind, other),
            }
        }
    }

    #[test]
    fn test_decode_unknown_fails() {
        assert!(decode(SensorKind::Unknown, &[1, 2, 3, 4, 5]).is_err());
        assert!(decode(SensorKind::Unknown, &[]).is_err());
    }

    #[test]
    fn test_reading_kind() {
        let reading = SensorReading::Lux { illuminance: 1.0 };
        assert_eq!(reading.kind(), SensorKind::Lux);
    }

    #[test]
    fn test_temperature_fahrenheit() {
        let reading = SensorReading::Sht40 {
            temperature: 100.0,
            humidity: 50.0,
        };
        assert!((reading.temperature_fahrenheit().unwrap() - 212.0).abs() < 0.001);
        assert_eq!(
            SensorReading::Lux { illuminance: 1.0 }.temperature_fahrenheit(),
            None
        );
    }
}
