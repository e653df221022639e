//! Utility functions for the sensor-scan-ble crate.

/// Convert Celsius to Fahrenheit.
///
/// # Example
///
/// ```
/// use sensor_scan_ble::celsius_to_fahrenheit;
///
/// assert!((celsius_to_fahrenheit(22.5) - 72.5).abs() < 0.001);
/// ```
#[inline]
pub fn celsius_to_fahrenheit(celsius: f64) -> f64 {
    celsius * 9.0 / 5.0 + 32.0
}

/// Format bytes as space-separated uppercase hex, for logging payloads.
///
/// # Example
///
/// ```
/// use sensor_scan_ble::utils::hex_bytes;
///
/// assert_eq!(hex_bytes(&[0x05, 0x16, 0xFF]), "05 16 FF");
/// ```
pub fn hex_bytes(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
